//! Domain errors raised by plugin bundle handling.
//!
//! I/O errors are wrapped in `Arc` so the enum stays cheap to clone into
//! log records and admin responses.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

/// Coarse classification of an [`ExtenderError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The bundle is not installed.
    NotFound,
    /// Input or bundle content is malformed.
    Validation,
    /// A downloaded archive does not match its declared hash.
    Integrity,
    /// Network, process, or filesystem trouble that may clear on retry.
    Transient,
}

impl ErrorKind {
    /// Stable lowercase label used in admin responses.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Validation => "validation",
            Self::Integrity => "integrity",
            Self::Transient => "transient",
        }
    }
}

/// Errors arising from bundle installation, loading, and introspection.
#[derive(Debug, Clone, Error)]
pub enum ExtenderError {
    /// The extender id could not be parsed.
    #[error("invalid extender id '{value}': {reason}")]
    InvalidId {
        /// Rejected input.
        value: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// No bundle is installed for the id.
    #[error("extender '{id}' is not installed at {path}")]
    NotInstalled {
        /// Requested bundle.
        id: String,
        /// Directory that was checked.
        path: PathBuf,
    },

    /// The bundle manifest is missing or malformed.
    #[error("invalid manifest at {path}: {message}")]
    Manifest {
        /// Manifest location.
        path: PathBuf,
        /// Description of the problem.
        message: String,
    },

    /// The archive's content hash differs from the index.
    #[error("extender '{id}' is corrupted: expected sha256 {expected}, got {actual}")]
    Integrity {
        /// Bundle being installed.
        id: String,
        /// Hash declared by the index.
        expected: String,
        /// Hash of the downloaded bytes.
        actual: String,
    },

    /// Fetching index metadata or an archive failed.
    #[error("download from {url} failed: {message}")]
    Download {
        /// Requested URL.
        url: String,
        /// Transport or status description.
        message: String,
    },

    /// The archive could not be unpacked.
    #[error("failed to unpack extender '{id}': {source}")]
    Unpack {
        /// Bundle being installed.
        id: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// A filesystem operation on the repository failed.
    #[error("repository I/O failed at {path}: {source}")]
    Io {
        /// Affected path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// A protocol message could not be decoded.
    #[error("malformed {what}: {message}")]
    Decode {
        /// Message kind.
        what: &'static str,
        /// Decoder message.
        message: String,
    },

    /// The helper process could not be started or fed.
    #[error("helper '{program}' failed: {source}")]
    Helper {
        /// Helper executable.
        program: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The helper did not exit within its time bound.
    #[error("helper timed out after {timeout_ms}ms")]
    Timeout {
        /// Configured bound in milliseconds.
        timeout_ms: u128,
    },

    /// The helper exited unsuccessfully.
    #[error("helper exited with status {status}")]
    NonZeroExit {
        /// Exit code, or -1 when killed by a signal.
        status: i32,
    },
}

impl ExtenderError {
    /// Classifies the error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotInstalled { .. } => ErrorKind::NotFound,
            Self::InvalidId { .. }
            | Self::Manifest { .. }
            | Self::Unpack { .. }
            | Self::Decode { .. } => ErrorKind::Validation,
            Self::Integrity { .. } => ErrorKind::Integrity,
            Self::Download { .. }
            | Self::Io { .. }
            | Self::Helper { .. }
            | Self::Timeout { .. }
            | Self::NonZeroExit { .. } => ErrorKind::Transient,
        }
    }

    pub(crate) fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source: Arc::new(source),
        }
    }
}
