//! Socket listeners for the admin and service endpoints.
//!
//! Listeners either bind their configured endpoint or adopt a descriptor
//! inherited from a predecessor, then accept connections on a background
//! thread. Handles expose the listening descriptor so a restart can pass it
//! on, and track live connections so the old process can drain.

mod errors;
mod handler;
mod listener;
#[cfg(test)]
mod test_utils;

pub use self::errors::ListenerError;
pub(crate) use self::handler::{ConnectionHandler, ConnectionStream, read_request_line};
pub(crate) use self::listener::{ListenerHandle, SocketListener};
#[cfg(test)]
pub(crate) use self::test_utils::{CountingHandler, wait_until};

const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
