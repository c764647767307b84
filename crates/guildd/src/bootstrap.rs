//! Worker process bootstrap orchestration.

use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use thiserror::Error;

use guild_config::{Config, SocketPreparationError};
use guild_workers::{WorkerError, Workers};

use crate::drivers::{Gateway, builtin_professions};
use crate::health::HealthReporter;
use crate::telemetry::{self, TelemetryError, TelemetryHandle};

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the worker process configuration.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that delegates to [`Config::load`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load()
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// Socket preparation failed.
    #[error("failed to prepare socket: {source}")]
    Socket {
        /// Filesystem error reported while preparing a socket directory.
        #[source]
        source: SocketPreparationError,
    },
    /// The built-in catalog could not be assembled.
    #[error("failed to build profession catalog: {source}")]
    Catalog {
        /// Registration error.
        #[source]
        source: WorkerError,
    },
}

/// Result of a successful bootstrap: configuration, telemetry, and an empty
/// registry over the built-in catalog.
pub struct WorkerProcess {
    config: Config,
    telemetry: TelemetryHandle,
    gateway: Arc<Gateway>,
    workers: Arc<Workers>,
}

impl WorkerProcess {
    /// Accessor for the resolved configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Accessor for the telemetry handle, primarily useful for testing.
    #[must_use]
    pub fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }

    /// Routing state published by built-in workers.
    #[must_use]
    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    /// The worker registry.
    #[must_use]
    pub fn workers(&self) -> &Arc<Workers> {
        &self.workers
    }
}

/// Bootstraps the worker process using the supplied collaborators.
///
/// # Errors
///
/// Returns a [`BootstrapError`] when configuration, telemetry, socket
/// directories, or the catalog cannot be prepared. Every failure is also
/// reported through `reporter`.
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    reporter: &dyn HealthReporter,
) -> Result<WorkerProcess, BootstrapError> {
    reporter.bootstrap_starting();
    let result = bootstrap_inner(loader);
    match &result {
        Ok(process) => reporter.bootstrap_succeeded(process.config()),
        Err(error) => reporter.bootstrap_failed(error),
    }
    result
}

fn bootstrap_inner(loader: &dyn ConfigLoader) -> Result<WorkerProcess, BootstrapError> {
    let config = loader
        .load()
        .map_err(|source| BootstrapError::Configuration { source })?;
    let telemetry =
        telemetry::initialise(&config).map_err(|source| BootstrapError::Telemetry { source })?;

    for endpoint in std::iter::once(config.admin_socket()).chain(config.listen()) {
        endpoint
            .prepare_filesystem()
            .map_err(|source| BootstrapError::Socket { source })?;
    }

    let gateway = Arc::new(Gateway::new());
    let professions =
        builtin_professions(&gateway).map_err(|source| BootstrapError::Catalog { source })?;
    let workers = Arc::new(Workers::new(Arc::new(professions)));
    Ok(WorkerProcess {
        config,
        telemetry,
        gateway,
        workers,
    })
}
