//! Domain errors raised by worker orchestration.
//!
//! Every variant maps onto an [`ErrorKind`] so the admin surface can report
//! a stable classification. Registry operations that fail leave state
//! untouched; the kind tells the caller whether retrying with different
//! input can help.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Coarse classification of a [`WorkerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// An unknown profession, driver, worker, or dependency was named.
    NotFound,
    /// The operation collides with existing state.
    Conflict,
    /// The request itself is malformed or rejected by a driver.
    Validation,
}

impl ErrorKind {
    /// Stable lowercase label used in admin responses.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Validation => "validation",
        }
    }
}

/// Failure reported by driver or worker code.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct DriverError {
    message: String,
}

impl DriverError {
    /// Wraps a human-readable failure description.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the failure description.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Errors arising from worker registry operations.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The profession is not registered in the catalog.
    #[error("profession '{profession}' does not exist")]
    ProfessionNotExist {
        /// Profession that was looked up.
        profession: String,
    },

    /// The profession does not offer the requested driver.
    #[error("driver '{driver}' does not exist in profession '{profession}'")]
    DriverNotExist {
        /// Profession that was searched.
        profession: String,
        /// Driver that was looked up.
        driver: String,
    },

    /// No worker is registered under the id.
    #[error("worker '{id}' does not exist")]
    WorkerNotExist {
        /// Worker id that was looked up.
        id: String,
    },

    /// A configuration references a worker that is not registered.
    #[error("worker '{id}' requires '{require}', which does not exist")]
    RequireNotExist {
        /// Worker whose configuration holds the reference.
        id: String,
        /// Unresolved reference.
        require: String,
    },

    /// The name or profession cannot form a worker id.
    #[error("invalid worker id '{value}': {reason}")]
    InvalidId {
        /// Rejected input.
        value: String,
        /// Why the input was rejected.
        reason: &'static str,
    },

    /// Other workers still depend on the worker being deleted.
    #[error("worker '{id}' is required by {dependents} other worker(s)")]
    RequireInUse {
        /// Worker that was asked to be deleted.
        id: String,
        /// Number of workers referencing it.
        dependents: usize,
    },

    /// A singleton profession already holds a different worker.
    #[error("profession '{profession}' is singleton and already holds '{existing}'")]
    SingletonOccupied {
        /// Singleton profession.
        profession: String,
        /// Id of the worker already present.
        existing: String,
    },

    /// A profession or driver was registered twice.
    #[error("catalog already contains {what} '{name}'")]
    DuplicateCatalogEntry {
        /// Kind of entry, `profession` or `driver`.
        what: &'static str,
        /// Duplicated name.
        name: String,
    },

    /// The configuration body could not be parsed or decoded.
    #[error("failed to decode configuration for driver '{driver}': {message}")]
    Decode {
        /// Driver whose configuration type was targeted.
        driver: String,
        /// Parser or decoder message.
        message: String,
    },

    /// A dependency field in the configuration is missing or malformed.
    #[error("invalid dependency at '{path}': {message}")]
    InvalidRequire {
        /// JSON pointer of the offending field.
        path: String,
        /// Description of the problem.
        message: String,
    },

    /// The referenced worker lacks the capability the field demands.
    #[error("worker '{require}' does not provide skill '{skill}'")]
    SkillMismatch {
        /// Referenced worker.
        require: String,
        /// Capability demanded by the schema.
        skill: String,
    },

    /// The configuration references a variable that is not defined.
    #[error("variable '{name}' is not defined")]
    UndefinedVariable {
        /// Variable name as written in the body.
        name: String,
    },

    /// The driver's extended validation rejected the configuration.
    #[error("driver '{driver}' rejected configuration: {source}")]
    Rejected {
        /// Driver that rejected the configuration.
        driver: String,
        /// Driver-provided reason.
        #[source]
        source: DriverError,
    },

    /// Creating, resetting, or stopping a worker failed.
    #[error("worker '{id}' failed to {action}: {source}")]
    Driver {
        /// Affected worker.
        id: String,
        /// Lifecycle step that failed.
        action: &'static str,
        /// Driver-provided reason.
        #[source]
        source: DriverError,
    },

    /// Reading or writing the worker store failed.
    #[error("worker store '{path}' is unavailable: {source}")]
    StoreIo {
        /// Store location.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The worker store holds malformed content.
    #[error("worker store '{path}' is malformed: {message}")]
    StoreFormat {
        /// Store location.
        path: PathBuf,
        /// Parser message.
        message: String,
    },
}

impl WorkerError {
    /// Classifies the error for callers that only need the broad outcome.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::ProfessionNotExist { .. }
            | Self::DriverNotExist { .. }
            | Self::WorkerNotExist { .. }
            | Self::RequireNotExist { .. } => ErrorKind::NotFound,
            Self::RequireInUse { .. }
            | Self::SingletonOccupied { .. }
            | Self::DuplicateCatalogEntry { .. } => ErrorKind::Conflict,
            Self::InvalidId { .. }
            | Self::Decode { .. }
            | Self::InvalidRequire { .. }
            | Self::SkillMismatch { .. }
            | Self::UndefinedVariable { .. }
            | Self::Rejected { .. }
            | Self::Driver { .. }
            | Self::StoreIo { .. }
            | Self::StoreFormat { .. } => ErrorKind::Validation,
        }
    }
}
