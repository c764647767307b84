//! Start, stop, restart, and status flows.

use std::io::Write;
use std::process::ExitCode;
use std::time::{Duration, SystemTime};

use guild_config::RuntimePaths;

use super::error::LifecycleError;
use super::monitoring::{open_runtime_dir, read_health, read_pid, wait_for_ready};
use super::signals::{ControlSignal, signal_daemon};
use super::socket::{ensure_socket_available, socket_is_reachable};
use super::spawning::spawn_daemon;
use super::types::{LifecycleCommand, LifecycleContext, LifecycleOutput};

const STARTUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Production lifecycle controller.
#[derive(Debug, Default)]
pub struct SystemLifecycle;

impl SystemLifecycle {
    pub fn handle<W: Write, E: Write>(
        &mut self,
        command: LifecycleCommand,
        context: LifecycleContext<'_>,
        output: &mut LifecycleOutput<W, E>,
    ) -> Result<ExitCode, LifecycleError> {
        match command {
            LifecycleCommand::Start => Self::start(context, output),
            LifecycleCommand::Stop => Self::signal(context, output, ControlSignal::Stop),
            LifecycleCommand::Restart => Self::signal(context, output, ControlSignal::Restart),
            LifecycleCommand::Status => Self::status(context, output),
        }
    }

    fn start<W: Write, E: Write>(
        context: LifecycleContext<'_>,
        output: &mut LifecycleOutput<W, E>,
    ) -> Result<ExitCode, LifecycleError> {
        let admin = context.config.admin_socket();
        ensure_socket_available(admin)?;
        let paths = RuntimePaths::from_config(context.config)?;
        let mut child = spawn_daemon(context.config_arguments, context.daemon_binary)?;
        let started_at = SystemTime::now();
        let snapshot = wait_for_ready(&paths, &mut child, started_at, STARTUP_TIMEOUT)?;
        output.stdout_line(format_args!(
            "guildd ready (pid {}) on {admin}",
            snapshot.pid
        ))?;
        output.stderr_line(format_args!(
            "runtime artefacts in {}",
            paths.runtime_dir().display()
        ))?;
        Ok(ExitCode::SUCCESS)
    }

    /// Delivers `signal` to the recorded pid and returns immediately.
    fn signal<W: Write, E: Write>(
        context: LifecycleContext<'_>,
        output: &mut LifecycleOutput<W, E>,
        signal: ControlSignal,
    ) -> Result<ExitCode, LifecycleError> {
        let paths = RuntimePaths::from_config_readonly(context.config)?;
        let pid = read_pid(&paths)?;
        signal_daemon(pid, signal)?;
        output.stdout_line(format_args!("sent {signal} to guildd pid {pid}"))?;
        Ok(ExitCode::SUCCESS)
    }

    fn status<W: Write, E: Write>(
        context: LifecycleContext<'_>,
        output: &mut LifecycleOutput<W, E>,
    ) -> Result<ExitCode, LifecycleError> {
        let admin = context.config.admin_socket();
        let paths = RuntimePaths::from_config_readonly(context.config)?;
        if !paths.runtime_dir().is_dir() {
            output.stdout_line(format_args!(
                "guildd is not running; use 'guild start' to launch it."
            ))?;
            return Ok(ExitCode::SUCCESS);
        }
        let dir = open_runtime_dir(&paths)?;
        let snapshot = read_health(&dir, paths.health_path())?;
        let pid = read_pid(&paths).ok();
        match (snapshot, pid) {
            (Some(snapshot), pid) => {
                output.stdout_line(format_args!(
                    "guildd status: {} (pid {}) via {admin}",
                    snapshot.status,
                    pid.unwrap_or(snapshot.pid)
                ))?;
            }
            (None, Some(pid)) => {
                output.stdout_line(format_args!(
                    "guildd recorded pid {pid} but health snapshot is missing; check {}",
                    paths.health_path().display()
                ))?;
            }
            (None, None) if socket_is_reachable(admin)? => {
                output.stdout_line(format_args!(
                    "admin socket {admin} is listening but runtime files are missing; inspect {}",
                    paths.runtime_dir().display()
                ))?;
            }
            (None, None) => {
                output.stdout_line(format_args!(
                    "guildd is not running; use 'guild start' to launch it."
                ))?;
            }
        }
        Ok(ExitCode::SUCCESS)
    }
}

#[cfg(test)]
#[path = "controller_tests.rs"]
mod tests;
