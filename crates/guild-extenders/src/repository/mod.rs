//! On-disk bundle repository.
//!
//! Bundles live at `<root>/<group>/<project>/<version>/` and describe the
//! drivers they export in a `manifest.json`. Installation downloads a gzip
//! tarball, verifies its digest against the index (SHA-1, or SHA-256 when the
//! index carries a 64-digit value), unpacks it into a staging directory
//! next to the target, and renames the staging directory into place so a
//! half-written bundle is never visible.

use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind as IoErrorKind;
use std::path::Path;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::ExtenderError;
use crate::id::ExtenderId;
use crate::source::BundleSource;

const REPOSITORY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::repository");

/// File naming the drivers a bundle exports.
pub const MANIFEST_FILE: &str = "manifest.json";
const STAGING_PREFIX: &str = ".staging-";

/// Driver declared by a bundle manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverEntry {
    /// Driver name, unique within the bundle.
    pub name: String,
    /// Display name; falls back to `name` when empty.
    #[serde(default)]
    pub title: String,
}

impl DriverEntry {
    /// Display name of the driver.
    #[must_use]
    pub fn display_name(&self) -> &str {
        if self.title.is_empty() {
            &self.name
        } else {
            &self.title
        }
    }
}

/// Parsed `manifest.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleManifest {
    /// Exported drivers.
    pub drivers: Vec<DriverEntry>,
}

impl BundleManifest {
    fn validate(&self) -> Result<(), String> {
        if self.drivers.is_empty() {
            return Err(String::from("bundle exports no drivers"));
        }
        let mut seen = BTreeSet::new();
        for driver in &self.drivers {
            if driver.name.is_empty() {
                return Err(String::from("driver name must not be empty"));
            }
            if !seen.insert(driver.name.as_str()) {
                return Err(format!("driver '{}' is declared twice", driver.name));
            }
        }
        Ok(())
    }
}

/// Installed bundle loaded from the repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    /// Bundle identity.
    pub id: ExtenderId,
    /// Bundle directory.
    pub path: Utf8PathBuf,
    /// Exported drivers.
    pub manifest: BundleManifest,
}

/// Root directory holding installed bundles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    root: Utf8PathBuf,
}

impl Repository {
    /// Opens a repository rooted at `root`. The directory need not exist.
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Repository root.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Directory a bundle is installed into.
    #[must_use]
    pub fn bundle_dir(&self, id: &ExtenderId) -> Utf8PathBuf {
        self.root
            .join(id.group())
            .join(id.project())
            .join(id.version())
    }

    /// Loads an installed bundle's manifest.
    ///
    /// # Errors
    ///
    /// Returns [`ExtenderError::NotInstalled`] when the bundle directory is
    /// absent and [`ExtenderError::Manifest`] when the manifest is missing,
    /// malformed, or declares no usable drivers.
    pub fn read_bundle(&self, id: &ExtenderId) -> Result<Bundle, ExtenderError> {
        let path = self.bundle_dir(id);
        if !path.is_dir() {
            return Err(ExtenderError::NotInstalled {
                id: id.to_string(),
                path: path.into_std_path_buf(),
            });
        }
        let manifest = read_manifest(path.as_std_path())?;
        Ok(Bundle {
            id: id.clone(),
            path,
            manifest,
        })
    }

    /// Lists installed bundles, ordered by id.
    ///
    /// Directories that do not form valid ids are ignored. A missing root
    /// yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`ExtenderError::Io`] when a directory cannot be listed.
    pub fn installed(&self) -> Result<Vec<ExtenderId>, ExtenderError> {
        let mut ids = Vec::new();
        for group in subdirectories(&self.root)? {
            for project in subdirectories(&self.root.join(&group))? {
                for version in subdirectories(&self.root.join(&group).join(&project))? {
                    if let Ok(id) = ExtenderId::new(&group, &project, &version) {
                        ids.push(id);
                    }
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Downloads, verifies, and installs a bundle, replacing any previous
    /// copy of the same version.
    ///
    /// Nothing is written to the repository unless the archive's digest
    /// matches the index.
    ///
    /// # Errors
    ///
    /// Returns [`ExtenderError::Integrity`] on digest mismatch,
    /// [`ExtenderError::Unpack`] or [`ExtenderError::Manifest`] for bad
    /// archives, and propagates source and filesystem failures.
    pub fn install(
        &self,
        source: &dyn BundleSource,
        id: &ExtenderId,
    ) -> Result<Bundle, ExtenderError> {
        let info = source.info(id)?;
        let archive = source.fetch(&info)?;
        let actual = archive_digest(&archive, &info.sha);
        if !actual.eq_ignore_ascii_case(info.sha.trim()) {
            return Err(ExtenderError::Integrity {
                id: id.to_string(),
                expected: info.sha,
                actual,
            });
        }
        debug!(target: REPOSITORY_TARGET, %id, sha = %actual, "archive verified");

        let target = self.bundle_dir(id);
        let parent = target.parent().unwrap_or(self.root.as_path()).to_owned();
        fs::create_dir_all(&parent).map_err(|error| ExtenderError::io(&parent, error))?;
        let staging = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(&parent)
            .map_err(|error| ExtenderError::io(&parent, error))?;
        tar::Archive::new(GzDecoder::new(archive.as_slice()))
            .unpack(staging.path())
            .map_err(|error| ExtenderError::Unpack {
                id: id.to_string(),
                source: Arc::new(error),
            })?;
        let manifest = read_manifest(staging.path())?;

        match fs::remove_dir_all(&target) {
            Ok(()) => debug!(target: REPOSITORY_TARGET, %id, "replacing installed copy"),
            Err(error) if error.kind() == IoErrorKind::NotFound => {}
            Err(error) => return Err(ExtenderError::io(&target, error)),
        }
        fs::rename(staging.path(), &target).map_err(|error| ExtenderError::io(&target, error))?;
        info!(
            target: REPOSITORY_TARGET,
            %id,
            drivers = manifest.drivers.len(),
            "extender installed"
        );
        Ok(Bundle {
            id: id.clone(),
            path: target,
            manifest,
        })
    }
}

fn read_manifest(dir: &Path) -> Result<BundleManifest, ExtenderError> {
    let path = dir.join(MANIFEST_FILE);
    let manifest_error = |message: String| ExtenderError::Manifest {
        path: path.clone(),
        message,
    };
    let bytes = fs::read(&path).map_err(|error| manifest_error(error.to_string()))?;
    let manifest: BundleManifest =
        serde_json::from_slice(&bytes).map_err(|error| manifest_error(error.to_string()))?;
    manifest.validate().map_err(manifest_error)?;
    Ok(manifest)
}

fn subdirectories(dir: &Utf8Path) -> Result<Vec<String>, ExtenderError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(error) if error.kind() == IoErrorKind::NotFound => return Ok(Vec::new()),
        Err(error) => return Err(ExtenderError::io(dir, error)),
    };
    let mut names = Vec::new();
    for item in entries {
        let entry = item.map_err(|error| ExtenderError::io(dir, error))?;
        if !entry.file_type().is_ok_and(|kind| kind.is_dir()) {
            continue;
        }
        if let Ok(name) = entry.file_name().into_string()
            && !name.starts_with('.')
        {
            names.push(name);
        }
    }
    Ok(names)
}

const SHA256_HEX_LEN: usize = 64;

/// Digest of `bytes` in the algorithm the index value `expected` names.
///
/// Indexes publish SHA-1 digests; a 64-digit value selects SHA-256.
#[must_use]
pub fn archive_digest(bytes: &[u8], expected: &str) -> String {
    if expected.trim().len() == SHA256_HEX_LEN {
        sha256_hex(bytes)
    } else {
        sha1_hex(bytes)
    }
}

/// Lowercase hex SHA-1 digest of `bytes`.
#[must_use]
pub fn sha1_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha1::digest(bytes))
}

/// Lowercase hex SHA-256 digest of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
