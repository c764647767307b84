//! Worker identity.
//!
//! A worker id joins the worker name and its profession as
//! `name@profession`. Both parts are restricted to ASCII alphanumerics and
//! `_`, `-`, `.`, so the separator can never appear inside a part and the
//! mapping from pairs to ids is injective. Case is preserved.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::WorkerError;

const SEPARATOR: char = '@';

/// Identifier of a worker, unique across the registry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WorkerId {
    value: String,
    name: String,
    profession: String,
}

impl WorkerId {
    /// Derives the id of the worker `name` in `profession`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::InvalidId`] when either part is empty or holds
    /// a character outside `[A-Za-z0-9_.-]`.
    pub fn new(name: &str, profession: &str) -> Result<Self, WorkerError> {
        validate_part(name, "name")?;
        validate_part(profession, "profession")?;
        Ok(Self {
            value: format!("{name}{SEPARATOR}{profession}"),
            name: name.to_owned(),
            profession: profession.to_owned(),
        })
    }

    /// Full textual form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// Worker name component.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Profession component.
    #[must_use]
    pub fn profession(&self) -> &str {
        &self.profession
    }
}

fn validate_part(part: &str, which: &'static str) -> Result<(), WorkerError> {
    if part.is_empty() {
        return Err(WorkerError::InvalidId {
            value: part.to_owned(),
            reason: if which == "name" {
                "name is empty"
            } else {
                "profession is empty"
            },
        });
    }
    if !part.chars().all(is_id_char) {
        return Err(WorkerError::InvalidId {
            value: part.to_owned(),
            reason: "only ASCII letters, digits, '_', '-' and '.' are allowed",
        });
    }
    Ok(())
}

const fn is_id_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.')
}

impl fmt::Display for WorkerId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.value)
    }
}

impl FromStr for WorkerId {
    type Err = WorkerError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let Some((name, profession)) = input.split_once(SEPARATOR) else {
            return Err(WorkerError::InvalidId {
                value: input.to_owned(),
                reason: "expected 'name@profession'",
            });
        };
        Self::new(name, profession)
    }
}

impl TryFrom<String> for WorkerId {
    type Error = WorkerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<WorkerId> for String {
    fn from(id: WorkerId) -> Self {
        id.value
    }
}

impl AsRef<str> for WorkerId {
    fn as_ref(&self) -> &str {
        &self.value
    }
}

/// Opaque name of a resource that a worker configuration depends on.
///
/// Resolvable references name another worker's id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequireId(String);

impl RequireId {
    /// Wraps a raw reference.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Textual form of the reference.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequireId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl From<&WorkerId> for RequireId {
    fn from(id: &WorkerId) -> Self {
        Self(id.as_str().to_owned())
    }
}
