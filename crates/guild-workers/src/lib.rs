//! Worker orchestration for the guild runtime.
//!
//! Professions describe pluggable capability domains and carry the drivers
//! that implement them. Operators ask the [`Workers`] registry to create,
//! reset, or delete named workers; the registry resolves `${name}` variables
//! in the raw configuration, discovers the other workers a configuration
//! depends on, and refuses to delete a worker that is still depended upon.
//!
//! # Architecture
//!
//! - [`catalog`] holds the read-only [`Professions`] and the [`Driver`] and
//!   [`Worker`] traits implemented by plugin code.
//! - [`variables`] performs substitution and remembers which worker used
//!   which variable.
//! - [`requires`] tracks dependency edges and reverse reference counts.
//! - [`schema`] discovers dependency fields in configuration bodies.
//! - [`registry`] composes the above under a single lock.
//! - [`store`] is the persisted form handed between process generations.

pub mod catalog;
pub mod error;
pub mod id;
pub mod registry;
pub mod requires;
pub mod schema;
pub mod store;
pub mod variables;

#[cfg(test)]
mod tests;

pub use self::catalog::{
    ConfigChecker, Driver, DriverConfig, DriverView, Profession, ProfessionMode, ProfessionView,
    Professions, Requires, Worker,
};
pub use self::error::{DriverError, ErrorKind, WorkerError};
pub use self::id::{RequireId, WorkerId};
pub use self::registry::{InstanceView, LoadSummary, WorkerInfo, WorkerSpec, Workers};
pub use self::requires::RequireManager;
pub use self::schema::{ConfigSchema, RequireRef};
pub use self::store::{WorkerRecord, WorkerStore};
pub use self::variables::{Substitution, Variables};
