//! CLI argument definitions for the `guild` operator tool.

use clap::{Parser, Subcommand};

/// Command-line interface controlling a `guildd` worker process.
#[derive(Parser, Debug)]
#[command(name = "guild", disable_help_subcommand = true)]
pub(crate) struct Cli {
    /// The operation to perform.
    #[command(subcommand)]
    pub(crate) command: CliCommand,
}

/// Operator commands.
#[derive(Subcommand, Debug, Clone)]
pub(crate) enum CliCommand {
    /// Starts `guildd` and waits until it reports ready.
    Start,
    /// Asks the running worker process to stop.
    Stop,
    /// Asks the running worker process to hand over to a fresh successor.
    Restart,
    /// Prints the recorded health snapshot and pid.
    Status,
    /// Sends one JSON request line to the admin socket and prints the reply.
    Admin {
        /// Request object, for example `{"command":"professions"}`.
        #[arg(value_name = "REQUEST")]
        request: String,
    },
}
