//! Error types for worker process lifecycle commands.

use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::time::SystemTime;

use guild_config::RuntimePathsError;
use thiserror::Error;

/// Errors raised while executing lifecycle commands.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(
        "admin socket {endpoint} is already in use; stop the running guildd or change --admin-socket"
    )]
    SocketInUse { endpoint: String },
    #[error("failed to check admin socket {endpoint}: {source}")]
    SocketProbe {
        endpoint: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to spawn guildd binary '{binary:?}': {source}")]
    LaunchDaemon {
        binary: OsString,
        #[source]
        source: io::Error,
    },
    #[error("guildd exited before reporting ready (status: {exit_status:?})")]
    StartupFailed { exit_status: Option<i32> },
    #[error("guildd reported 'stopping' before reaching ready; check health snapshot at {path:?}")]
    StartupAborted { path: PathBuf },
    #[error("timed out waiting for ready snapshot in {timeout_ms} ms at {health_path:?}")]
    StartupTimeout {
        health_path: PathBuf,
        timeout_ms: u128,
    },
    #[error("failed to monitor guildd launch: {source}")]
    MonitorChild {
        #[source]
        source: io::Error,
    },
    #[error("failed to read health snapshot {path:?}: {source}")]
    ReadHealth {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse health snapshot {path:?}: {source}")]
    ParseHealth {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    /// The pid record is missing or unreadable; no process is guessed.
    #[error("no guildd process recorded at {path:?}: {detail}")]
    PidUnavailable { path: PathBuf, detail: String },
    #[error("failed to signal guildd pid {pid}: {source}")]
    SignalFailed {
        pid: u32,
        #[source]
        source: io::Error,
    },
    #[error("system clock reports {time:?}, before the Unix epoch")]
    InvalidSystemClock { time: SystemTime },
    #[error("failed to open runtime directory {path:?}: {source}")]
    OpenRuntimeDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write lifecycle output: {0}")]
    Io(#[source] io::Error),
    #[cfg(not(unix))]
    #[error("platform does not support process signalling")]
    UnsupportedPlatform,
    #[error(transparent)]
    Paths(#[from] RuntimePathsError),
}
