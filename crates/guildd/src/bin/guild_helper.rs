//! Plugin introspection helper.
//!
//! Reads one length-delimited `ExtendsRequest` from stdin, loads each named
//! bundle from the extender repository, and writes an `ExtendsResponse` to
//! stdout. Logs go to stderr.

use std::io;
use std::process::ExitCode;

use guild_config::Config;
use guild_extenders::{Repository, run_helper};
use ortho_config::OrthoConfig;

fn main() -> ExitCode {
    let config = match Config::load() {
        Ok(config) => config,
        Err(error) => {
            eprintln!("guild-helper: failed to load configuration: {error}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(error) = guildd::initialise_telemetry(&config) {
        eprintln!("guild-helper: {error}");
        return ExitCode::FAILURE;
    }

    let repository = Repository::new(config.extender_repository());
    match run_helper(io::stdin().lock(), io::stdout().lock(), &repository) {
        Ok(_) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("guild-helper: {error}");
            ExitCode::FAILURE
        }
    }
}
