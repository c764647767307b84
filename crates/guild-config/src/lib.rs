//! Shared configuration for the guild runtime.
//!
//! `guildd` and the `guild` CLI both load [`Config`] through `ortho_config`,
//! layering defaults, configuration files, `GUILD_*` environment variables,
//! and command-line flags. The admin socket doubles as the anchor of the
//! runtime directory, so both binaries derive identical [`RuntimePaths`].

mod defaults;
mod logging;
mod runtime;
mod socket;

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};
use url::Url;

pub use defaults::{
    APPLICATION_DIR, DEFAULT_ADMIN_PORT, DEFAULT_HANDOFF_TIMEOUT_SECS,
    DEFAULT_HELPER_TIMEOUT_SECS, DEFAULT_LOG_FILTER, DEFAULT_SERVICE_PORT, default_admin_socket,
    default_extender_repository, default_handoff_timeout_secs, default_helper_timeout_secs,
    default_listen, default_log_filter, default_log_filter_string, default_log_format,
    default_worker_store,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use runtime::{RuntimePaths, RuntimePathsError};
pub use socket::{
    SocketEndpoint, SocketParseError, SocketPreparationError, TCP_NETWORK, UNIX_NETWORK,
};

/// Runtime configuration shared by `guildd`, `guild-helper`, and `guild`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "GUILD")]
pub struct Config {
    /// Endpoint of the JSONL admin surface. Unix socket parents also host
    /// the lock, pid, and health files.
    #[ortho_config(default = default_admin_socket())]
    pub admin_socket: SocketEndpoint,
    /// Service listeners bound on a cold start and inherited on restart.
    #[ortho_config(default = default_listen(), merge_strategy = "append")]
    pub listen: Vec<SocketEndpoint>,
    /// `tracing` filter directive.
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    /// Output format of log events.
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
    /// Seconds to wait for a successor to acknowledge readiness.
    #[ortho_config(default = DEFAULT_HANDOFF_TIMEOUT_SECS)]
    pub handoff_timeout_secs: u64,
    /// Seconds to wait for a plugin introspection helper to exit.
    #[ortho_config(default = DEFAULT_HELPER_TIMEOUT_SECS)]
    pub helper_timeout_secs: u64,
    /// Root directory of installed plugin bundles.
    #[ortho_config(default = default_extender_repository())]
    pub extender_repository: Utf8PathBuf,
    /// Remote index consulted when installing plugin bundles.
    pub extender_index: Option<Url>,
    /// JSON file holding persisted worker records and variables.
    #[ortho_config(default = default_worker_store())]
    pub worker_store: Utf8PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            admin_socket: default_admin_socket(),
            listen: default_listen(),
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            handoff_timeout_secs: DEFAULT_HANDOFF_TIMEOUT_SECS,
            helper_timeout_secs: DEFAULT_HELPER_TIMEOUT_SECS,
            extender_repository: default_extender_repository(),
            extender_index: None,
            worker_store: default_worker_store(),
        }
    }
}

impl Config {
    /// Endpoint of the admin surface.
    #[must_use]
    pub const fn admin_socket(&self) -> &SocketEndpoint {
        &self.admin_socket
    }

    /// Service listeners configured for a cold start.
    #[must_use]
    pub fn listen(&self) -> &[SocketEndpoint] {
        &self.listen
    }

    /// Configured log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Configured log format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Bound on waiting for a successor during socket handoff.
    #[must_use]
    pub const fn handoff_timeout(&self) -> Duration {
        Duration::from_secs(self.handoff_timeout_secs)
    }

    /// Bound on a plugin introspection helper run.
    #[must_use]
    pub const fn helper_timeout(&self) -> Duration {
        Duration::from_secs(self.helper_timeout_secs)
    }

    /// Root directory of installed plugin bundles.
    #[must_use]
    pub fn extender_repository(&self) -> &Utf8Path {
        &self.extender_repository
    }

    /// Remote index for bundle installs, when configured.
    #[must_use]
    pub const fn extender_index(&self) -> Option<&Url> {
        self.extender_index.as_ref()
    }

    /// Path of the persisted worker store.
    #[must_use]
    pub fn worker_store(&self) -> &Utf8Path {
        &self.worker_store
    }
}
