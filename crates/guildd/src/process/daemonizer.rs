//! Detaches a cold-started worker process from its terminal.
//!
//! Only cold starts detach. A successor is already a child of a detached
//! predecessor and keeps the stdio pipes its predecessor handed it.

use std::ffi::OsStr;

use daemonize_me::Daemon;
use thiserror::Error;
use tracing::info;

use guild_config::RuntimePaths;

use super::PROCESS_TARGET;

/// Files created by the detached process are private to its user.
const DETACHED_UMASK: u16 = 0o077;

/// Seam over the detach step so tests stay in the foreground.
pub trait Daemonizer: Send + Sync {
    /// Forks into the background; only the detached child returns.
    fn daemonize(&self, paths: &RuntimePaths) -> Result<(), DaemonizeError>;
}

/// Failure to detach.
#[derive(Debug, Error)]
pub enum DaemonizeError {
    /// The fork, session, or stdio redirection step failed.
    #[error("failed to detach worker process: {0}")]
    System(#[from] daemonize_me::DaemonError),
}

/// Detaches through `daemonize-me`, working from the runtime directory.
#[derive(Debug, Default)]
pub struct SystemDaemonizer;

impl SystemDaemonizer {
    /// Builds the production detach backend.
    pub const fn new() -> Self {
        Self
    }
}

impl Daemonizer for SystemDaemonizer {
    fn daemonize(&self, paths: &RuntimePaths) -> Result<(), DaemonizeError> {
        let runtime_dir = paths.runtime_dir();
        info!(
            target: PROCESS_TARGET,
            runtime = %runtime_dir.display(),
            "detaching worker process"
        );
        Daemon::new()
            .name(OsStr::new(env!("CARGO_PKG_NAME")))
            .work_dir(runtime_dir)
            .umask(DETACHED_UMASK)
            .start()?;
        info!(target: PROCESS_TARGET, pid = std::process::id(), "detached");
        Ok(())
    }
}
