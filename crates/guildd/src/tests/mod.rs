//! Behavioural suites for the worker process.

mod admin_behaviour;
mod support;
