//! The guild worker process.
//!
//! `guildd` hosts the worker registry behind two kinds of socket: a JSONL
//! admin surface that creates, updates, and deletes workers, and service
//! listeners whose traffic is routed by the built-in `router` and `upstream`
//! workers. Lifecycle files (lock, pid, health snapshot) live next to the
//! admin socket so the `guild` CLI can find and signal the process.
//!
//! ## Restarts without dropped connections
//!
//! `SIGUSR1` asks the process to hand over to a fresh copy of itself. The
//! listening descriptors are passed to the successor as descriptors 3, 4,
//! and so on, together with a length-delimited protobuf [`TrafficSet`]
//! written to its stdin that names each descriptor's endpoint and carries the
//! current worker store. Once the successor prints `ready` on stdout the
//! predecessor stops accepting, drains in-flight connections, and exits. If
//! the successor fails or stays silent past the handoff timeout, the
//! predecessor keeps serving as if nothing happened.
//!
//! `SIGINT`, `SIGTERM`, `SIGQUIT`, and `SIGHUP` stop the process, saving the
//! worker store first.

mod bootstrap;
mod dispatch;
pub mod drivers;
mod handoff;
mod health;
mod process;
mod service;
mod telemetry;
mod traffic;
mod transport;

pub use bootstrap::{
    BootstrapError, ConfigLoader, SystemConfigLoader, WorkerProcess, bootstrap_with,
};
pub use handoff::{
    FIRST_INHERITED_FD, HANDOFF_ENV_VAR, HandoffError, Outgoing, ProcessSuccessor, READY_LINE,
    SuccessorLauncher,
};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use process::{LaunchError, LaunchMode, run_daemon};
pub use telemetry::{TelemetryError, TelemetryHandle, initialise as initialise_telemetry};
pub use traffic::{Traffic, TrafficError, TrafficSet, encode_traffic, read_traffic};

#[cfg(test)]
mod tests;
