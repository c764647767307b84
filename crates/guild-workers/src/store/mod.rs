//! Persisted worker records.
//!
//! The store is a JSON document holding the variable values and one record
//! per worker. It is read once at cold start and rewritten after every
//! successful mutation; a restarted process receives the same document from
//! its predecessor instead of reading the file.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tempfile::Builder;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::error::WorkerError;

/// Serialisable form of one worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerRecord {
    /// Worker id, `name@profession`.
    pub id: String,
    /// Profession name.
    pub profession: String,
    /// Worker name.
    pub name: String,
    /// Driver name.
    pub driver: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Raw configuration body, before variable substitution.
    pub body: String,
    /// Creation time, RFC 3339.
    pub create_time: String,
    /// Last update time, RFC 3339.
    pub update_time: String,
}

/// The persisted document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStore {
    /// Variable values.
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    /// Worker records.
    #[serde(default)]
    pub workers: Vec<WorkerRecord>,
}

impl WorkerStore {
    /// Decodes a store document.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::StoreFormat`] when the bytes are not a store.
    pub fn from_slice(bytes: &[u8], origin: &Path) -> Result<Self, WorkerError> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(bytes).map_err(|error| WorkerError::StoreFormat {
            path: origin.to_path_buf(),
            message: error.to_string(),
        })
    }

    /// Encodes the store document.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::StoreFormat`] when serialisation fails.
    pub fn to_vec(&self) -> Result<Vec<u8>, WorkerError> {
        serde_json::to_vec_pretty(self).map_err(|error| WorkerError::StoreFormat {
            path: Path::new("<memory>").to_path_buf(),
            message: error.to_string(),
        })
    }

    /// Reads the store at `path`; a missing file yields an empty store.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::StoreIo`] or [`WorkerError::StoreFormat`].
    pub fn load(path: &Path) -> Result<Self, WorkerError> {
        match fs::read(path) {
            Ok(bytes) => Self::from_slice(&bytes, path),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(error) => Err(WorkerError::StoreIo {
                path: path.to_path_buf(),
                source: Arc::new(error),
            }),
        }
    }

    /// Atomically replaces the store at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::StoreIo`] when the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), WorkerError> {
        let bytes = self.to_vec()?;
        atomic_write(path, &bytes).map_err(|error| WorkerError::StoreIo {
            path: path.to_path_buf(),
            source: Arc::new(error),
        })
    }
}

fn atomic_write(path: &Path, contents: &[u8]) -> io::Result<()> {
    let directory = path.parent().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            "store path did not have a parent directory",
        )
    })?;
    fs::create_dir_all(directory)?;

    let mut builder = Builder::new();
    builder.prefix(
        path.file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("workers"),
    );
    #[cfg(unix)]
    {
        use std::fs::Permissions;
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(Permissions::from_mode(0o600));
    }

    let mut file = builder.tempfile_in(directory)?;
    file.write_all(contents)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|error| error.error)?;
    Ok(())
}

/// Formats a timestamp as RFC 3339.
#[must_use]
pub fn format_time(at: OffsetDateTime) -> String {
    at.format(&Rfc3339)
        .unwrap_or_else(|_| at.unix_timestamp().to_string())
}

/// Parses an RFC 3339 timestamp.
#[must_use]
pub fn parse_time(text: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(text, &Rfc3339).ok()
}

#[cfg(test)]
mod tests;
