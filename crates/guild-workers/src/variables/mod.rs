//! Variable Substitution Engine.
//!
//! Worker bodies may reference runtime variables as `${name}`. Substitution
//! happens on the raw body before it is parsed, with each value escaped as
//! JSON string content, so a reference is normally written inside a JSON
//! string. Variable names use ASCII alphanumerics and `_`, `-`, `.`, `@`;
//! any `${` not followed by such a name and a closing `}` is left as is.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::error::WorkerError;
use crate::id::WorkerId;

const OPEN: &str = "${";
const CLOSE: char = '}';

/// Outcome of substituting variables into one body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitution {
    /// Body with every reference replaced.
    pub body: Vec<u8>,
    /// Names referenced by the body.
    pub used: BTreeSet<String>,
}

/// Current variable values and their per-worker usage.
#[derive(Debug, Clone, Default)]
pub struct Variables {
    values: BTreeMap<String, String>,
    usage: HashMap<WorkerId, BTreeSet<String>>,
}

impl Variables {
    /// Creates an empty variable set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a variable set from existing values.
    #[must_use]
    pub fn with_values(values: BTreeMap<String, String>) -> Self {
        Self {
            values,
            usage: HashMap::new(),
        }
    }

    /// Defines or replaces a variable.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    /// Looks up a variable's value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// All variable values.
    #[must_use]
    pub const fn values(&self) -> &BTreeMap<String, String> {
        &self.values
    }

    /// Replaces every `${name}` reference in `body`.
    ///
    /// A body without references is returned byte-for-byte with an empty
    /// usage set.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::UndefinedVariable`] for an unknown name and
    /// [`WorkerError::Decode`] when a body holding references is not UTF-8.
    pub fn substitute(&self, body: &[u8]) -> Result<Substitution, WorkerError> {
        let mut used = BTreeSet::new();
        if !contains_open(body) {
            return Ok(Substitution {
                body: body.to_vec(),
                used,
            });
        }
        let text = std::str::from_utf8(body).map_err(|error| WorkerError::Decode {
            driver: String::new(),
            message: error.to_string(),
        })?;

        let mut output = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(start) = rest.find(OPEN) {
            let (before, from_open) = rest.split_at(start);
            output.push_str(before);
            let after_open = from_open.get(OPEN.len()..).unwrap_or_default();
            match reference_name(after_open) {
                Some(name) => {
                    let value = self.values.get(name).ok_or_else(|| {
                        WorkerError::UndefinedVariable {
                            name: name.to_owned(),
                        }
                    })?;
                    output.push_str(&escape(value));
                    used.insert(name.to_owned());
                    rest = after_open.get(name.len() + 1..).unwrap_or_default();
                }
                None => {
                    output.push_str(OPEN);
                    rest = after_open;
                }
            }
        }
        output.push_str(rest);

        Ok(Substitution {
            body: output.into_bytes(),
            used,
        })
    }

    /// Records the variables a worker's current body references.
    pub fn set_variables_by_id(&mut self, id: &WorkerId, used: BTreeSet<String>) {
        if used.is_empty() {
            self.usage.remove(id);
        } else {
            self.usage.insert(id.clone(), used);
        }
    }

    /// Forgets a worker's recorded usage.
    pub fn remove_worker(&mut self, id: &WorkerId) {
        self.usage.remove(id);
    }

    /// Variables a worker's current body references.
    #[must_use]
    pub fn used_by(&self, id: &WorkerId) -> Option<&BTreeSet<String>> {
        self.usage.get(id)
    }

    /// Workers whose current body references `name`, in id order.
    #[must_use]
    pub fn workers_using(&self, name: &str) -> Vec<WorkerId> {
        let mut workers: Vec<WorkerId> = self
            .usage
            .iter()
            .filter(|(_, used)| used.contains(name))
            .map(|(id, _)| id.clone())
            .collect();
        workers.sort();
        workers
    }
}

fn contains_open(body: &[u8]) -> bool {
    body.windows(OPEN.len()).any(|window| window == OPEN.as_bytes())
}

fn reference_name(after_open: &str) -> Option<&str> {
    let end = after_open.find(CLOSE)?;
    let name = after_open.get(..end)?;
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.' | '@'));
    valid.then_some(name)
}

fn escape(value: &str) -> String {
    let quoted = serde_json::Value::String(value.to_owned()).to_string();
    quoted
        .strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .map_or_else(|| value.to_owned(), str::to_owned)
}

#[cfg(test)]
mod tests;
