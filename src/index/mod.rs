// src/index/mod.rs

//! Repository index data structures
//!
//! A repository index is an immutable-per-fetch JSON catalog of artifact
//! descriptors. Parsing validates the whole document on ingest: an index
//! with a missing format version or an incomplete descriptor is rejected
//! wholesale, never partially accepted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Current index format version written by this crate
pub const INDEX_FORMAT_VERSION: &str = "1.0";

/// Metadata record for one installable artifact
///
/// Uniquely identified by (name, version, os, arch) within one index; an
/// index may carry multiple platform variants of the same name+version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactDescriptor {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    /// Download location of the artifact archive
    pub url: String,
    /// SHA-256 hex digest of the archive
    pub checksum: String,
    #[serde(default)]
    pub size: u64,
    /// Target OS, empty or "any" for platform-independent artifacts
    #[serde(default)]
    pub os: String,
    /// Target architecture, empty or "any" for platform-independent artifacts
    #[serde(default)]
    pub arch: String,
    /// Names of required packages, install-order significant
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl ArtifactDescriptor {
    /// Step identifier used by plans and events
    pub fn id(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }
}

/// Versioned catalog of artifact descriptors for one repository
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryIndex {
    pub format_version: String,
    pub last_update: DateTime<Utc>,
    pub packages: Vec<ArtifactDescriptor>,
}

impl RepositoryIndex {
    /// Create an empty index stamped now
    pub fn new() -> Self {
        Self {
            format_version: INDEX_FORMAT_VERSION.to_string(),
            last_update: Utc::now(),
            packages: Vec::new(),
        }
    }

    /// Parse and validate an index document
    ///
    /// Validation failure rejects the entire index.
    pub fn from_json(data: &[u8]) -> Result<Self> {
        let index: RepositoryIndex = serde_json::from_slice(data)
            .map_err(|e| Error::InvalidIndex(format!("malformed index JSON: {e}")))?;
        index.validate()?;
        Ok(index)
    }

    /// Serialize with 2-space indentation
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(|e| Error::EncodeFailed(e.to_string()))
    }

    /// Check the index invariants: non-empty format version, every
    /// descriptor carries name, version, url, and checksum
    pub fn validate(&self) -> Result<()> {
        if self.format_version.is_empty() {
            return Err(Error::InvalidIndex("empty format_version".to_string()));
        }

        for (i, pkg) in self.packages.iter().enumerate() {
            if pkg.name.is_empty() {
                return Err(Error::InvalidIndex(format!("package {i} has empty name")));
            }
            if pkg.version.is_empty() {
                return Err(Error::InvalidIndex(format!(
                    "package '{}' has empty version",
                    pkg.name
                )));
            }
            if pkg.url.is_empty() {
                return Err(Error::InvalidIndex(format!(
                    "package '{}' has empty url",
                    pkg.name
                )));
            }
            if pkg.checksum.is_empty() {
                return Err(Error::InvalidIndex(format!(
                    "package '{}' has empty checksum",
                    pkg.name
                )));
            }
        }

        Ok(())
    }

    /// All descriptors with the given name, in declaration order
    pub fn find_by_name(&self, name: &str) -> Vec<&ArtifactDescriptor> {
        self.packages.iter().filter(|p| p.name == name).collect()
    }
}

impl Default for RepositoryIndex {
    fn default() -> Self {
        Self::new()
    }
}
