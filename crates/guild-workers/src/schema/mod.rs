//! Driver configuration schemas and dependency discovery.
//!
//! Schemas are JSON Schema documents produced outside this crate. Fields
//! whose schema carries `"eo:type": "require"` hold the id of another
//! worker; an optional `"skill"` names the capability the referenced worker
//! must provide. Require fields are mandatory unless marked
//! `"eo:optional": true`. Arrays of require fields are walked element-wise.

use serde_json::{Map, Value};

use crate::error::WorkerError;
use crate::id::RequireId;

/// Schema keyword marking special field types.
pub const TYPE_KEYWORD: &str = "eo:type";
/// [`TYPE_KEYWORD`] value of dependency fields.
pub const REQUIRE_TYPE: &str = "require";
/// Keyword naming the capability a dependency must provide.
pub const SKILL_KEYWORD: &str = "skill";
/// Keyword relaxing the mandatory status of a dependency field.
pub const OPTIONAL_KEYWORD: &str = "eo:optional";

/// JSON schema describing a driver's configuration type.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigSchema {
    document: Value,
}

/// Dependency discovered while walking a configuration body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequireRef {
    /// Referenced resource.
    pub id: RequireId,
    /// Capability the referenced worker must provide, if any.
    pub skill: Option<String>,
    /// JSON pointer of the field holding the reference.
    pub path: String,
}

impl ConfigSchema {
    /// Wraps a schema document.
    #[must_use]
    pub const fn new(document: Value) -> Self {
        Self { document }
    }

    /// Raw schema document.
    #[must_use]
    pub const fn document(&self) -> &Value {
        &self.document
    }

    /// Schema `title`, used as the configuration type name.
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.document.get("title").and_then(Value::as_str)
    }

    /// Collects every dependency referenced by `body`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::InvalidRequire`] when a mandatory dependency is
    /// absent or a dependency field does not hold a non-empty string.
    pub fn collect_requires(&self, body: &Value) -> Result<Vec<RequireRef>, WorkerError> {
        let mut found = Vec::new();
        walk(&self.document, body, "", &mut found)?;
        Ok(found)
    }
}

fn walk(
    schema: &Value,
    value: &Value,
    path: &str,
    found: &mut Vec<RequireRef>,
) -> Result<(), WorkerError> {
    if is_require(schema) {
        return collect_require(schema, value, path, found);
    }
    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        return walk_object(properties, value, path, found);
    }
    if let (Some(items), Some(elements)) = (schema.get("items"), value.as_array()) {
        for (index, element) in elements.iter().enumerate() {
            walk(items, element, &format!("{path}/{index}"), found)?;
        }
    }
    Ok(())
}

fn walk_object(
    properties: &Map<String, Value>,
    value: &Value,
    path: &str,
    found: &mut Vec<RequireRef>,
) -> Result<(), WorkerError> {
    let fields = value.as_object();
    for (name, property) in properties {
        let field_path = format!("{path}/{name}");
        match fields.and_then(|object| object.get(name)) {
            Some(field) if !field.is_null() => walk(property, field, &field_path, found)?,
            _ if is_mandatory_require(property) => {
                return Err(WorkerError::InvalidRequire {
                    path: field_path,
                    message: "required dependency is missing".to_owned(),
                });
            }
            _ => {}
        }
    }
    Ok(())
}

fn collect_require(
    schema: &Value,
    value: &Value,
    path: &str,
    found: &mut Vec<RequireRef>,
) -> Result<(), WorkerError> {
    match value.as_str() {
        Some(id) if !id.is_empty() => {
            found.push(RequireRef {
                id: RequireId::new(id),
                skill: schema
                    .get(SKILL_KEYWORD)
                    .and_then(Value::as_str)
                    .map(str::to_owned),
                path: path.to_owned(),
            });
            Ok(())
        }
        Some(_) if !is_mandatory_require(schema) => Ok(()),
        _ => Err(WorkerError::InvalidRequire {
            path: path.to_owned(),
            message: "expected a non-empty worker id".to_owned(),
        }),
    }
}

fn is_require(schema: &Value) -> bool {
    schema.get(TYPE_KEYWORD).and_then(Value::as_str) == Some(REQUIRE_TYPE)
}

fn is_mandatory_require(schema: &Value) -> bool {
    is_require(schema) && schema.get(OPTIONAL_KEYWORD).and_then(Value::as_bool) != Some(true)
}

#[cfg(test)]
mod tests;
