//! Lifecycle management for `guildd`.
//!
//! - [`types`] defines the command model and output helpers.
//! - [`error`] captures the error surface exposed to the CLI.
//! - [`spawning`] launches the worker process.
//! - [`monitoring`] reads health snapshots and pid records.
//! - [`signals`] delivers stop and restart signals.
//! - [`socket`] checks whether the admin socket is reachable.
//! - [`controller`] implements the start/stop/restart/status flows.

mod controller;
mod error;
mod monitoring;
mod signals;
mod socket;
mod spawning;
mod types;

pub use controller::SystemLifecycle;
pub use error::LifecycleError;
pub use spawning::DaemonBinary;
pub use types::{LifecycleCommand, LifecycleContext, LifecycleOutput};
