//! Operator CLI for the guild worker process.
//!
//! `guild` starts `guildd` and waits for it to report ready, delivers stop
//! and restart signals to the process recorded in the runtime directory,
//! prints its health, and forwards single JSONL requests to the admin
//! socket. Configuration is loaded through `ortho_config` from the flags that
//! precede the command, so the CLI and the worker process agree on paths.

use std::ffi::OsString;
use std::io::{self, BufRead, BufReader, Write};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use guild_config::Config;
use serde::Deserialize;
use thiserror::Error;

mod cli;
mod config;
mod lifecycle;
mod transport;

pub(crate) use cli::{Cli, CliCommand};
use config::split_config_arguments;
pub(crate) use config::{ConfigLoader, OrthoConfigLoader};
use lifecycle::{
    DaemonBinary, LifecycleCommand, LifecycleContext, LifecycleError, LifecycleOutput,
    SystemLifecycle,
};
use transport::connect_endpoint;

struct CliRunner<'a, W: Write, E: Write, L: ConfigLoader> {
    stdout: &'a mut W,
    stderr: &'a mut E,
    loader: &'a L,
    daemon_binary: DaemonBinary,
}

impl<'a, W, E, L> CliRunner<'a, W, E, L>
where
    W: Write,
    E: Write,
    L: ConfigLoader,
{
    fn new(stdout: &'a mut W, stderr: &'a mut E, loader: &'a L) -> Self {
        Self {
            stdout,
            stderr,
            loader,
            daemon_binary: DaemonBinary::resolve(None),
        }
    }

    #[cfg(test)]
    fn with_daemon_binary(mut self, binary: Option<&std::ffi::OsStr>) -> Self {
        self.daemon_binary = DaemonBinary::resolve(binary);
        self
    }

    fn run<I>(&mut self, args: I) -> ExitCode
    where
        I: IntoIterator<Item = OsString>,
    {
        let args: Vec<OsString> = args.into_iter().collect();
        let split = split_config_arguments(&args);

        let result = Cli::try_parse_from(&split.command_arguments)
            .map_err(AppError::CliUsage)
            .and_then(|cli| {
                self.loader
                    .load(&split.config_arguments)
                    .map(|config| (cli, config))
            })
            .and_then(|(cli, config)| self.execute(&cli, &config, &split.config_arguments));

        match result {
            Ok(exit_code) => exit_code,
            Err(AppError::CliUsage(error)) if !error.use_stderr() => {
                let _ = write!(self.stdout, "{error}");
                ExitCode::SUCCESS
            }
            Err(error) => {
                let _ = writeln!(self.stderr, "{error}");
                ExitCode::FAILURE
            }
        }
    }

    fn execute(
        &mut self,
        cli: &Cli,
        config: &Config,
        config_arguments: &[OsString],
    ) -> Result<ExitCode, AppError> {
        let command = match &cli.command {
            CliCommand::Admin { request } => {
                return send_admin_request(config, request, &mut *self.stdout);
            }
            CliCommand::Start => LifecycleCommand::Start,
            CliCommand::Stop => LifecycleCommand::Stop,
            CliCommand::Restart => LifecycleCommand::Restart,
            CliCommand::Status => LifecycleCommand::Status,
        };
        let context = LifecycleContext {
            config,
            config_arguments,
            daemon_binary: &self.daemon_binary,
        };
        let mut output = LifecycleOutput::new(&mut *self.stdout, &mut *self.stderr);
        let mut lifecycle = SystemLifecycle;
        lifecycle
            .handle(command, context, &mut output)
            .map_err(AppError::from)
    }
}

/// Runs the CLI using the provided arguments and IO handles.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    CliRunner::new(stdout, stderr, &OrthoConfigLoader).run(args)
}

/// Reply envelope of the admin surface.
#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum AdminReply {
    Ok {},
    Error {},
}

/// Writes `request` as one line to the admin socket and copies the reply
/// line to `stdout`. Error replies exit with failure.
fn send_admin_request<W: Write>(
    config: &Config,
    request: &str,
    stdout: &mut W,
) -> Result<ExitCode, AppError> {
    let line = request.trim();
    serde_json::from_str::<serde_json::Value>(line).map_err(AppError::InvalidRequest)?;

    let endpoint = config.admin_socket();
    let mut connection = connect_endpoint(endpoint).map_err(|source| AppError::Connect {
        endpoint: endpoint.to_string(),
        source,
    })?;
    connection
        .write_all(line.as_bytes())
        .and_then(|()| connection.write_all(b"\n"))
        .and_then(|()| connection.flush())
        .map_err(AppError::SendRequest)?;

    let mut reply = String::new();
    BufReader::new(connection)
        .read_line(&mut reply)
        .map_err(AppError::ReadResponse)?;
    if reply.trim().is_empty() {
        return Err(AppError::MissingReply);
    }
    let envelope: AdminReply = serde_json::from_str(&reply).map_err(AppError::ParseReply)?;
    stdout
        .write_all(reply.as_bytes())
        .and_then(|()| stdout.flush())
        .map_err(AppError::ForwardResponse)?;
    Ok(match envelope {
        AdminReply::Ok {} => ExitCode::SUCCESS,
        AdminReply::Error {} => ExitCode::FAILURE,
    })
}

#[derive(Debug, Error)]
enum AppError {
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(Arc<ortho_config::OrthoError>),
    #[error("{0}")]
    CliUsage(clap::Error),
    #[error("admin request is not valid JSON: {0}")]
    InvalidRequest(serde_json::Error),
    #[error("failed to connect to guildd at {endpoint}: {source}")]
    Connect { endpoint: String, source: io::Error },
    #[error("failed to send request to guildd: {0}")]
    SendRequest(io::Error),
    #[error("failed to read reply from guildd: {0}")]
    ReadResponse(io::Error),
    #[error("guildd closed the connection without replying")]
    MissingReply,
    #[error("failed to parse guildd reply: {0}")]
    ParseReply(serde_json::Error),
    #[error("failed to forward guildd reply: {0}")]
    ForwardResponse(io::Error),
    #[error("lifecycle command failed: {0}")]
    Lifecycle(#[from] LifecycleError),
}
