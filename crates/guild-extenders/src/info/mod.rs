//! Index metadata describing one downloadable bundle version.

use serde::{Deserialize, Serialize};
use url::Url;

/// Lifecycle status reported by the index for a published version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseStatus {
    /// Published and installable.
    #[default]
    Active,
    /// Still installable but superseded.
    Deprecated,
    /// Withdrawn by the publisher.
    Withdrawn,
}

/// Metadata fetched from the remote index before downloading an archive.
///
/// It is used for exactly one download and verification and is never
/// persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtenderInfo {
    /// Toolchain the bundle was built with.
    #[serde(default)]
    pub runtime: String,
    /// Target architecture tag.
    #[serde(default)]
    pub arch: String,
    /// Runtime version the bundle is compatible with.
    #[serde(default)]
    pub compat: String,
    /// Hex SHA-256 digest of the archive.
    pub sha: String,
    /// Release status.
    #[serde(default)]
    pub status: ReleaseStatus,
    /// Whether this is the newest release.
    #[serde(default)]
    pub is_latest: bool,
    /// Publication time.
    #[serde(default)]
    pub create_time: String,
    /// Last metadata change.
    #[serde(default)]
    pub update_time: String,
    /// Archive location.
    pub url: Url,
}
