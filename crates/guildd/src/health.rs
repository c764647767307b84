//! Structured health reporting for worker process lifecycle events.

use std::sync::Arc;

use guild_config::Config;
use guild_workers::LoadSummary;

use crate::bootstrap::BootstrapError;
use crate::handoff::HandoffError;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked before configuration loading begins.
    fn bootstrap_starting(&self);

    /// Invoked after bootstrap completes successfully.
    fn bootstrap_succeeded(&self, config: &Config);

    /// Invoked when bootstrap fails.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Invoked once the worker store has been materialised.
    fn workers_loaded(&self, summary: LoadSummary);

    /// Invoked when a restart signal starts a handoff.
    fn handoff_started(&self, listeners: usize);

    /// Invoked when the successor acknowledged readiness.
    fn handoff_completed(&self, successor: u32);

    /// Invoked when the handoff was abandoned and this process keeps serving.
    fn handoff_aborted(&self, error: &HandoffError);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        (**self).bootstrap_succeeded(config);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }

    fn workers_loaded(&self, summary: LoadSummary) {
        (**self).workers_loaded(summary);
    }

    fn handoff_started(&self, listeners: usize) {
        (**self).handoff_started(listeners);
    }

    fn handoff_completed(&self, successor: u32) {
        (**self).handoff_completed(successor);
    }

    fn handoff_aborted(&self, error: &HandoffError) {
        (**self).handoff_aborted(error);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            "starting worker process bootstrap"
        );
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            admin = %config.admin_socket(),
            listeners = config.listen().len(),
            log_filter = %config.log_filter(),
            log_format = ?config.log_format(),
            "worker process bootstrap completed"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            error = %error,
            "worker process bootstrap failed"
        );
    }

    fn workers_loaded(&self, summary: LoadSummary) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "workers_loaded",
            loaded = summary.loaded,
            skipped = summary.skipped,
            "workers materialised"
        );
    }

    fn handoff_started(&self, listeners: usize) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "handoff_started",
            listeners,
            "handing listeners to a successor"
        );
    }

    fn handoff_completed(&self, successor: u32) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "handoff_completed",
            successor,
            "successor ready; draining"
        );
    }

    fn handoff_aborted(&self, error: &HandoffError) {
        tracing::warn!(
            target: HEALTH_TARGET,
            event = "handoff_aborted",
            error = %error,
            "handoff abandoned; continuing to serve"
        );
    }
}
