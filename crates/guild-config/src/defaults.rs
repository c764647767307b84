use camino::Utf8PathBuf;
use std::env;

#[cfg(unix)]
use libc::geteuid;

use crate::socket::SocketEndpoint;

/// Directory name used beneath the platform runtime and data directories.
pub const APPLICATION_DIR: &str = "guild";

/// Default TCP port of the admin surface when Unix sockets are unavailable.
pub const DEFAULT_ADMIN_PORT: u16 = 9780;

/// Default TCP port of the service listener.
pub const DEFAULT_SERVICE_PORT: u16 = 8099;

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default bound, in seconds, on waiting for a successor during restart.
pub const DEFAULT_HANDOFF_TIMEOUT_SECS: u64 = 10;

/// Default bound, in seconds, on a plugin introspection helper run.
pub const DEFAULT_HELPER_TIMEOUT_SECS: u64 = 5;

/// Default log filter expression used by the binaries.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the binaries.
#[must_use]
pub const fn default_log_format() -> crate::logging::LogFormat {
    crate::logging::LogFormat::Json
}

/// Default handoff timeout in seconds.
#[must_use]
pub const fn default_handoff_timeout_secs() -> u64 {
    DEFAULT_HANDOFF_TIMEOUT_SECS
}

/// Default helper timeout in seconds.
#[must_use]
pub const fn default_helper_timeout_secs() -> u64 {
    DEFAULT_HELPER_TIMEOUT_SECS
}

/// Service listeners bound on a cold start.
#[must_use]
pub fn default_listen() -> Vec<SocketEndpoint> {
    vec![SocketEndpoint::tcp("127.0.0.1", DEFAULT_SERVICE_PORT)]
}

/// Computes the default admin socket endpoint.
#[must_use]
pub fn default_admin_socket() -> SocketEndpoint {
    default_admin_socket_inner()
}

/// Root of the local plugin bundle repository.
#[must_use]
pub fn default_extender_repository() -> Utf8PathBuf {
    data_base_directory().join("extenders")
}

/// Location of the persisted worker store.
#[must_use]
pub fn default_worker_store() -> Utf8PathBuf {
    data_base_directory().join("workers.json")
}

#[cfg(unix)]
fn default_admin_socket_inner() -> SocketEndpoint {
    let (mut base, apply_namespace) = match runtime_base_directory() {
        Some(dir) => (dir, false),
        None => (fallback_base_directory(), true),
    };

    base.push(APPLICATION_DIR);
    if apply_namespace {
        base.push(user_namespace());
    }

    SocketEndpoint::unix(base.join("guildd.sock"))
}

#[cfg(not(unix))]
fn default_admin_socket_inner() -> SocketEndpoint {
    SocketEndpoint::tcp("127.0.0.1", DEFAULT_ADMIN_PORT)
}

#[cfg(unix)]
fn runtime_base_directory() -> Option<Utf8PathBuf> {
    dirs::runtime_dir().and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
}

fn data_base_directory() -> Utf8PathBuf {
    #[cfg(unix)]
    {
        if let Some(dir) =
            dirs::data_dir().and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
        {
            return dir.join(APPLICATION_DIR);
        }
    }
    fallback_base_directory().join(APPLICATION_DIR)
}

fn fallback_base_directory() -> Utf8PathBuf {
    let candidate = env::temp_dir();
    Utf8PathBuf::from_path_buf(candidate).unwrap_or_else(|_| Utf8PathBuf::from("/tmp"))
}

#[cfg(unix)]
pub(crate) fn user_namespace() -> String {
    // SAFETY: `geteuid` has no preconditions and cannot fail.
    let uid = unsafe { geteuid() };
    format!("uid-{uid}")
}
