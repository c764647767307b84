//! Request deserialisation for the admin surface.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use guild_extenders::ExtenderId;
use guild_workers::WorkerSpec;

use super::errors::DispatchError;

/// One admin command.
#[derive(Debug, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum AdminRequest {
    /// Create or reset a worker.
    Set(WorkerRequest),
    /// Like `set`; an omitted driver keeps the current one.
    Update(WorkerRequest),
    /// Delete a worker nobody depends on.
    Delete { profession: String, name: String },
    /// List the workers of one profession.
    List { profession: String },
    /// Every worker grouped by profession.
    Export,
    /// The profession catalog.
    Professions,
    /// List variables, optionally defining some first.
    Variables {
        #[serde(default)]
        set: BTreeMap<String, String>,
    },
    /// Drivers exported by installed bundles.
    Extenders,
    /// Download and install a bundle.
    Install { id: ExtenderId },
}

/// Worker fields shared by `set` and `update`.
#[derive(Debug, Deserialize)]
pub struct WorkerRequest {
    pub profession: String,
    pub name: String,
    #[serde(default)]
    pub driver: String,
    #[serde(default)]
    pub description: String,
    /// Configuration body: a JSON value, or a string holding the raw body
    /// text verbatim.
    pub body: Value,
}

impl WorkerRequest {
    pub fn into_spec(self) -> Result<WorkerSpec, DispatchError> {
        let body = match self.body {
            Value::String(raw) => raw.into_bytes(),
            other => serde_json::to_vec(&other)?,
        };
        Ok(
            WorkerSpec::new(self.profession, self.name, self.driver, body)
                .with_description(self.description),
        )
    }
}

impl AdminRequest {
    /// Parses a JSONL line into a request.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Malformed`] if the line is empty or does not
    /// match any command.
    pub fn parse(line: &[u8]) -> Result<Self, DispatchError> {
        let trimmed = line.trim_ascii();
        if trimmed.is_empty() {
            return Err(DispatchError::malformed("empty request line"));
        }
        serde_json::from_slice(trimmed).map_err(|error| DispatchError::malformed(error.to_string()))
    }

    /// Command name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Set(_) => "set",
            Self::Update(_) => "update",
            Self::Delete { .. } => "delete",
            Self::List { .. } => "list",
            Self::Export => "export",
            Self::Professions => "professions",
            Self::Variables { .. } => "variables",
            Self::Extenders => "extenders",
            Self::Install { .. } => "install",
        }
    }
}
