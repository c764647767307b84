//! Response framing for the admin surface.

use std::io::Write;

use serde::Serialize;
use serde_json::Value;

use super::errors::DispatchError;

/// Single JSONL response line.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AdminResponse {
    /// The command succeeded.
    Ok {
        /// Command-specific payload.
        data: Value,
    },
    /// The command failed.
    Error {
        /// Stable error classification.
        kind: &'static str,
        /// Human-readable description.
        message: String,
    },
}

impl From<&DispatchError> for AdminResponse {
    fn from(error: &DispatchError) -> Self {
        Self::Error {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// Serialises responses onto a stream.
pub struct ResponseWriter<W> {
    writer: W,
}

impl<W: Write> ResponseWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Writes one response line and flushes the stream.
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation, writing, or flushing fails.
    pub fn write_response(&mut self, response: &AdminResponse) -> Result<(), DispatchError> {
        serde_json::to_writer(&mut self.writer, response)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    /// Writes an `ok` line carrying `data`.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_ok(&mut self, data: Value) -> Result<(), DispatchError> {
        self.write_response(&AdminResponse::Ok { data })
    }

    /// Writes an `error` line describing `error`.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_error(&mut self, error: &DispatchError) -> Result<(), DispatchError> {
        self.write_response(&AdminResponse::from(error))
    }
}
