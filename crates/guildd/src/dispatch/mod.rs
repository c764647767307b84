//! JSONL admin surface.
//!
//! Each admin connection carries one request line and receives one response
//! line:
//!
//! ```json
//! {"command":"set","profession":"upstream","name":"api","driver":"static","body":{"nodes":["10.0.0.1:80"]}}
//! {"status":"ok","data":{"id":"api@upstream", ...}}
//! ```
//!
//! Failures answer `{"status":"error","kind":"not_found","message":"..."}`
//! where `kind` is the stable classification of the underlying error.
//! Every successful mutation rewrites the worker store.

mod errors;
mod extenders;
mod handler;
mod request;
mod response;
mod service;

pub(crate) use self::extenders::{ExtenderService, LocalExtenders};
pub(crate) use self::handler::DispatchConnectionHandler;
pub(crate) use self::service::{AdminService, MutationGate};

const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");
