//! Plugin bundle management for the guild runtime.
//!
//! Extenders are versioned bundles addressed as `group:project[:version]`
//! that export additional drivers. This crate installs bundles into an
//! on-disk [`Repository`] after verifying their digest, and discovers the
//! drivers a bundle exports by asking an isolated helper process over a
//! small protobuf protocol on stdin and stdout.
//!
//! # Architecture
//!
//! - [`repository`] owns the on-disk layout and staged installation.
//! - [`source`] fetches index metadata and archives.
//! - [`protocol`] defines the helper wire messages.
//! - [`helper`] is the helper-side request handler.
//! - [`runner`] spawns the helper with a time bound and absorbs failures.

pub mod error;
pub mod helper;
pub mod id;
pub mod info;
pub mod protocol;
pub mod repository;
pub mod runner;
pub mod source;


pub use self::error::{ErrorKind, ExtenderError};
pub use self::helper::{describe, run_helper};
pub use self::id::{ExtenderId, LATEST, driver_id};
pub use self::info::{ExtenderInfo, ReleaseStatus};
pub use self::protocol::{ExtendsBasicInfo, ExtendsInfo, ExtendsRequest, ExtendsResponse, Plugin};
pub use self::repository::{Bundle, BundleManifest, DriverEntry, MANIFEST_FILE, Repository};
pub use self::runner::{HelperExecutor, Introspector, ProcessHelperExecutor};
pub use self::source::{BundleSource, HttpBundleSource};
