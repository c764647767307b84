//! Spawning of the `guildd` worker process.

use std::env;
use std::ffi::{OsStr, OsString};
use std::process::{Child, Command, Stdio};

use super::error::LifecycleError;

/// Environment variable overriding the `guildd` binary.
pub(crate) const DAEMON_BIN_ENV_VAR: &str = "GUILDD_BIN";

/// Variables that would keep `guildd` attached or make it expect a
/// predecessor; `guild start` always asks for a detached cold start.
const SCRUBBED_ENV_VARS: &[&str] = &["GUILD_FOREGROUND", "GUILD_HANDOFF"];

/// Program used to launch the worker process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonBinary {
    program: OsString,
    leading: Vec<OsString>,
}

impl DaemonBinary {
    /// Resolves the binary from an override, `GUILDD_BIN`, a sibling of the
    /// running executable, or `guildd` on the search path.
    pub(crate) fn resolve(binary_override: Option<&OsStr>) -> Self {
        let program = binary_override
            .map(OsString::from)
            .or_else(|| env::var_os(DAEMON_BIN_ENV_VAR))
            .or_else(sibling_binary)
            .unwrap_or_else(|| OsString::from("guildd"));
        Self {
            program,
            leading: Vec::new(),
        }
    }

    /// Runs `program` with `leading` arguments ahead of the forwarded
    /// configuration flags.
    #[cfg(test)]
    pub(crate) fn with_leading<I, S>(program: impl Into<OsString>, leading: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            program: program.into(),
            leading: leading.into_iter().map(Into::into).collect(),
        }
    }

    pub(crate) fn program(&self) -> &OsStr {
        &self.program
    }
}

fn sibling_binary() -> Option<OsString> {
    let current = env::current_exe().ok()?;
    let candidate = current.with_file_name("guildd");
    candidate.is_file().then(|| candidate.into_os_string())
}

/// Spawns `guildd`, forwarding the configuration flags after `argv[0]`.
pub(super) fn spawn_daemon(
    config_arguments: &[OsString],
    binary: &DaemonBinary,
) -> Result<Child, LifecycleError> {
    let mut command = Command::new(binary.program());
    command.args(&binary.leading);
    command.args(config_arguments.iter().skip(1));
    for name in SCRUBBED_ENV_VARS {
        command.env_remove(name);
    }
    command
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());
    command
        .spawn()
        .map_err(|source| LifecycleError::LaunchDaemon {
            binary: binary.program.clone(),
            source,
        })
}
