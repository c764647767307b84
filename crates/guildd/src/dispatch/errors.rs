//! Error types for admin request dispatch.

use std::io;

use thiserror::Error;

use guild_extenders::ExtenderError;
use guild_workers::WorkerError;

/// Errors surfaced while parsing or executing an admin request.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Request line could not be parsed.
    #[error("malformed request: {message}")]
    Malformed { message: String },

    /// A registry operation failed.
    #[error(transparent)]
    Worker(#[from] WorkerError),

    /// A bundle operation failed.
    #[error(transparent)]
    Extender(#[from] ExtenderError),

    /// The command cannot run in the current configuration or state.
    #[error("{message}")]
    Unavailable { message: String },

    /// IO error during read or write.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Response serialisation failed.
    #[error("failed to serialise response: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl DispatchError {
    /// Stable classification reported to admin clients.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Malformed { .. } => "validation",
            Self::Worker(error) => error.kind().as_str(),
            Self::Extender(error) => error.kind().as_str(),
            Self::Unavailable { .. } => "unavailable",
            Self::Io(_) | Self::Serialize(_) => "internal",
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::malformed(DispatchError::malformed("empty"), "validation")]
    #[case::missing_worker(
        DispatchError::Worker(WorkerError::WorkerNotExist { id: "a@upstream".into() }),
        "not_found"
    )]
    #[case::in_use(
        DispatchError::Worker(WorkerError::RequireInUse { id: "a@upstream".into(), dependents: 1 }),
        "conflict"
    )]
    #[case::integrity(
        DispatchError::Extender(ExtenderError::Integrity {
            id: "acme:cache:1.0".into(),
            expected: "aa".into(),
            actual: "bb".into(),
        }),
        "integrity"
    )]
    #[case::unavailable(DispatchError::unavailable("no index"), "unavailable")]
    fn classifies_errors(#[case] error: DispatchError, #[case] kind: &str) {
        assert_eq!(error.kind(), kind);
    }
}
