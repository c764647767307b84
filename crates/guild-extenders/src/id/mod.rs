//! Extender and driver identifiers.
//!
//! Bundles are addressed as `group:project[:version]`, where a missing
//! version means [`LATEST`]. Drivers exported by a bundle are addressed as
//! `group:project:driver`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ExtenderError;

/// Version used when an id omits one.
pub const LATEST: &str = "latest";

/// Identifier of one bundle version.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ExtenderId {
    group: String,
    project: String,
    version: String,
}

impl ExtenderId {
    /// Builds an id, defaulting an empty version to [`LATEST`].
    ///
    /// # Errors
    ///
    /// Returns [`ExtenderError::InvalidId`] when a part is empty or would
    /// escape the repository directory.
    pub fn new(group: &str, project: &str, version: &str) -> Result<Self, ExtenderError> {
        let version = if version.is_empty() { LATEST } else { version };
        for part in [group, project, version] {
            validate_part(part)?;
        }
        Ok(Self {
            group: group.to_owned(),
            project: project.to_owned(),
            version: version.to_owned(),
        })
    }

    /// Publisher group.
    #[must_use]
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Project within the group.
    #[must_use]
    pub fn project(&self) -> &str {
        &self.project
    }

    /// Bundle version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// `group:project`, the version-independent name.
    #[must_use]
    pub fn name(&self) -> String {
        format!("{}:{}", self.group, self.project)
    }

    /// Id of a driver exported by this bundle.
    #[must_use]
    pub fn driver_id(&self, driver: &str) -> String {
        driver_id(&self.group, &self.project, driver)
    }
}

/// Formats the id of a driver exported by `group:project`.
#[must_use]
pub fn driver_id(group: &str, project: &str, driver: &str) -> String {
    format!("{group}:{project}:{driver}")
}

fn validate_part(part: &str) -> Result<(), ExtenderError> {
    if part.is_empty() {
        return Err(ExtenderError::InvalidId {
            value: part.to_owned(),
            reason: "group and project must not be empty",
        });
    }
    let valid = part
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.'))
        && part != "."
        && part != "..";
    if !valid {
        return Err(ExtenderError::InvalidId {
            value: part.to_owned(),
            reason: "only ASCII letters, digits, '_', '-' and '.' are allowed",
        });
    }
    Ok(())
}

impl fmt::Display for ExtenderId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:{}:{}", self.group, self.project, self.version)
    }
}

impl FromStr for ExtenderId {
    type Err = ExtenderError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let mut parts = input.split(':');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(group), Some(project), version, None) => {
                Self::new(group, project, version.unwrap_or_default())
            }
            _ => Err(ExtenderError::InvalidId {
                value: input.to_owned(),
                reason: "expected 'group:project[:version]'",
            }),
        }
    }
}

impl TryFrom<String> for ExtenderId {
    type Error = ExtenderError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ExtenderId> for String {
    fn from(id: ExtenderId) -> Self {
        id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::versioned("acme:balancer:1.2.0", "1.2.0")]
    #[case::unversioned("acme:balancer", LATEST)]
    #[case::empty_version("acme:balancer:", LATEST)]
    fn parses_ids(#[case] input: &str, #[case] version: &str) {
        let id: ExtenderId = input.parse().expect("valid id");
        assert_eq!(id.group(), "acme");
        assert_eq!(id.project(), "balancer");
        assert_eq!(id.version(), version);
        assert_eq!(id.name(), "acme:balancer");
    }

    #[rstest]
    #[case::single("acme")]
    #[case::too_many("a:b:c:d")]
    #[case::empty_group(":balancer")]
    #[case::traversal("..:balancer:1")]
    #[case::slash("acme:bal/ancer")]
    fn rejects_malformed_ids(#[case] input: &str) {
        assert!(input.parse::<ExtenderId>().is_err());
    }

    #[test]
    fn formats_driver_ids() {
        let id = ExtenderId::new("acme", "balancer", "1.0").expect("id");
        assert_eq!(id.driver_id("round-robin"), "acme:balancer:round-robin");
        assert_eq!(id.to_string(), "acme:balancer:1.0");
    }
}
