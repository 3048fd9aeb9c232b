// src/archive/manifest.rs

//! In-archive package manifest
//!
//! Every package archive carries one metadata entry (`pkg.json` or
//! `metadata.json`) describing the package and declaring its payload files.
//! The declared per-file digests are authoritative: after extraction the
//! tree is cross-checked against them.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Accepted names for the metadata entry
pub const MANIFEST_NAMES: &[&str] = &["pkg.json", "metadata.json"];

/// One declared payload file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ManifestFile {
    /// Archive-relative path, e.g. `files/bin/demo`
    pub path: String,
    #[serde(default)]
    pub size: u64,
    /// Unix permission bits; informative only
    #[serde(default)]
    pub mode: Option<u32>,
    /// SHA-256 hex digest of the file contents
    pub sha256: String,
}

/// Package metadata carried inside the archive
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageManifest {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub files: Vec<ManifestFile>,
}

impl PackageManifest {
    /// Parse and validate a manifest document
    pub fn from_json(data: &[u8]) -> Result<Self> {
        let manifest: PackageManifest = serde_json::from_slice(data)
            .map_err(|e| Error::InvalidManifest(format!("malformed manifest JSON: {e}")))?;

        if manifest.name.is_empty() {
            return Err(Error::InvalidManifest("empty package name".to_string()));
        }
        if manifest.version.is_empty() {
            return Err(Error::InvalidManifest(format!(
                "package '{}' has empty version",
                manifest.name
            )));
        }

        Ok(manifest)
    }
}

/// Check whether an archive entry path names the metadata file
///
/// Only a top-level entry counts; a nested `files/pkg.json` is payload.
pub fn is_manifest_entry(entry_path: &str) -> bool {
    let trimmed = entry_path.trim_start_matches("./");
    MANIFEST_NAMES.contains(&trimmed)
}
