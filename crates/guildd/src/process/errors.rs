//! Defines the unified error surface for worker process launch and
//! supervision.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTimeError;

use nix::errno::Errno;
use thiserror::Error;

use ortho_config::OrthoError;

use guild_config::{RuntimePathsError, SocketPreparationError};
use guild_extenders::ExtenderError;
use guild_workers::WorkerError;

use crate::bootstrap::BootstrapError;
use crate::handoff::HandoffError;
use crate::traffic::TrafficError;
use crate::transport::ListenerError;

use super::daemonizer::DaemonizeError;
use super::signals::SignalError;

/// Errors surfaced while launching or supervising the worker process.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Config {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Preparing the socket filesystem failed.
    #[error("failed to prepare socket: {source}")]
    Socket {
        /// Underlying filesystem error.
        #[source]
        source: SocketPreparationError,
    },
    /// The runtime directory could not be created.
    #[error("failed to prepare runtime directory '{path}': {source}")]
    RuntimeDirectory {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The admin socket path lacked a parent directory.
    #[error("socket path '{path}' has no parent directory")]
    MissingSocketParent {
        /// Configured socket path.
        path: String,
    },
    /// Lock file creation failed.
    #[error("failed to open lock file '{path}': {source}")]
    LockCreate {
        /// Lock file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// A running worker process already holds the lock.
    #[error("worker process already running with pid {pid}")]
    AlreadyRunning {
        /// PID recorded in the existing PID file.
        pid: u32,
    },
    /// Removing a stale runtime artefact failed.
    #[error("failed to remove stale file '{path}': {source}")]
    Cleanup {
        /// Path of the artefact that could not be removed.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Writing the PID file failed.
    #[error("failed to write pid file '{path}': {source}")]
    PidWrite {
        /// PID file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Writing the health snapshot failed.
    #[error("failed to write health snapshot '{path}': {source}")]
    HealthWrite {
        /// Health file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Serialising the health snapshot failed.
    #[error("failed to serialise health snapshot: {source}")]
    HealthSerialise {
        /// Underlying serialisation error.
        #[from]
        source: serde_json::Error,
    },
    /// Obtaining the current timestamp failed.
    #[error("failed to read system time: {source}")]
    Clock {
        /// Underlying system time error.
        #[source]
        source: SystemTimeError,
    },
    /// Checking whether an existing PID is alive failed.
    #[error("failed to check existing process {pid}: {source}")]
    CheckProcess {
        /// PID that could not be checked.
        pid: u32,
        /// Underlying OS error.
        source: Errno,
    },
    /// Health updates were attempted before writing the PID file.
    #[error("pid must be written before updating health state")]
    MissingPid,
    /// Daemonisation failed.
    #[error("failed to daemonise: {source}")]
    Daemonize {
        /// Underlying daemonisation error.
        #[source]
        source: DaemonizeError,
    },
    /// Waiting for a control signal failed.
    #[error("failed to await control signal: {source}")]
    Signal {
        /// Underlying signal error.
        #[source]
        source: SignalError,
    },
    /// Bootstrapping the worker process failed.
    #[error("bootstrap failed: {source}")]
    Bootstrap {
        /// Underlying bootstrap error.
        #[source]
        source: BootstrapError,
    },
    /// Socket listener startup failed.
    #[error("socket listener failed: {source}")]
    Listener {
        /// Underlying listener error.
        #[source]
        source: ListenerError,
    },
    /// Inherited traffic descriptors could not be read.
    #[error("failed to read inherited traffic: {source}")]
    Traffic {
        /// Underlying descriptor error.
        #[source]
        source: TrafficError,
    },
    /// The worker store could not be read or written.
    #[error("worker store failed: {source}")]
    Store {
        /// Underlying registry error.
        #[source]
        source: WorkerError,
    },
    /// The successor launcher could not be prepared.
    #[error("failed to prepare handoff: {source}")]
    Handoff {
        /// Underlying handoff error.
        #[source]
        source: HandoffError,
    },
    /// The extender index could not be configured.
    #[error("failed to configure extenders: {source}")]
    Extenders {
        /// Underlying extender error.
        #[source]
        source: ExtenderError,
    },
    /// The acknowledgement pipe could not be split from stdout.
    #[error("failed to prepare the acknowledgement channel: {source}")]
    AckChannel {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Acknowledging readiness to the predecessor failed.
    #[error("failed to acknowledge predecessor: {source}")]
    Acknowledge {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

impl From<Arc<OrthoError>> for LaunchError {
    fn from(source: Arc<OrthoError>) -> Self {
        Self::Config { source }
    }
}

impl From<SocketPreparationError> for LaunchError {
    fn from(source: SocketPreparationError) -> Self {
        Self::Socket { source }
    }
}

impl From<RuntimePathsError> for LaunchError {
    fn from(source: RuntimePathsError) -> Self {
        match source {
            RuntimePathsError::MissingSocketParent { path } => Self::MissingSocketParent { path },
            RuntimePathsError::RuntimeDirectory { path, source } => {
                Self::RuntimeDirectory { path, source }
            }
        }
    }
}

impl From<DaemonizeError> for LaunchError {
    fn from(source: DaemonizeError) -> Self {
        Self::Daemonize { source }
    }
}

impl From<SignalError> for LaunchError {
    fn from(source: SignalError) -> Self {
        Self::Signal { source }
    }
}

impl From<BootstrapError> for LaunchError {
    fn from(source: BootstrapError) -> Self {
        Self::Bootstrap { source }
    }
}

impl From<ListenerError> for LaunchError {
    fn from(source: ListenerError) -> Self {
        Self::Listener { source }
    }
}

impl From<TrafficError> for LaunchError {
    fn from(source: TrafficError) -> Self {
        Self::Traffic { source }
    }
}

impl From<WorkerError> for LaunchError {
    fn from(source: WorkerError) -> Self {
        Self::Store { source }
    }
}

impl From<HandoffError> for LaunchError {
    fn from(source: HandoffError) -> Self {
        Self::Handoff { source }
    }
}

impl From<ExtenderError> for LaunchError {
    fn from(source: ExtenderError) -> Self {
        Self::Extenders { source }
    }
}
