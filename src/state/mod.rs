// src/state/mod.rs

//! Durable record of installed packages
//!
//! The installed database is one JSON file, replaced atomically on every
//! mutation (temp file in the target directory, fsync, rename). Loading a
//! missing file yields a fresh empty database. The store performs no
//! locking of its own; callers serialize concurrent mutation of the same
//! database path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{Error, Result};

/// Current database format version written by this crate
pub const STATE_FORMAT_VERSION: &str = "1.0";

/// One installed package
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstalledRecord {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    pub installed_at: DateTime<Utc>,
    /// Source URL the artifact was fetched from
    pub installed_from: String,
    /// Paths written by the installer, in extraction order
    pub files: Vec<String>,
    /// SHA-256 hex digest of the installed archive
    pub checksum: String,
}

/// The installed-packages database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstalledDatabase {
    pub format_version: String,
    pub last_update: DateTime<Utc>,
    pub packages: Vec<InstalledRecord>,
}

impl InstalledDatabase {
    /// Create an empty database stamped now
    pub fn new() -> Self {
        Self {
            format_version: STATE_FORMAT_VERSION.to_string(),
            last_update: Utc::now(),
            packages: Vec::new(),
        }
    }

    /// Load the database from disk
    ///
    /// A missing file is a fresh empty database, not an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No installed database at {}, starting fresh", path.display());
            return Ok(Self::new());
        }

        let data = std::fs::read(path)
            .map_err(|e| Error::IoError(format!("failed to read {}: {e}", path.display())))?;
        let db: InstalledDatabase = serde_json::from_slice(&data)
            .map_err(|e| Error::InvalidState(format!("{}: {e}", path.display())))?;

        if db.format_version.is_empty() {
            return Err(Error::InvalidState(format!(
                "{}: empty format_version",
                path.display()
            )));
        }

        Ok(db)
    }

    /// Atomically persist the database
    ///
    /// Writes 2-space-indented JSON to a temporary file in the target
    /// directory, fsyncs, then renames over the destination.
    pub fn save(&self, path: &Path) -> Result<()> {
        let data =
            serde_json::to_vec_pretty(self).map_err(|e| Error::EncodeFailed(e.to_string()))?;

        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)
            .map_err(|e| Error::IoError(format!("failed to create {}: {e}", dir.display())))?;

        let mut temp = NamedTempFile::new_in(dir)
            .map_err(|e| Error::IoError(format!("failed to create temp file: {e}")))?;
        temp.write_all(&data)
            .map_err(|e| Error::IoError(format!("failed to write state: {e}")))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| Error::IoError(format!("failed to sync state: {e}")))?;
        temp.persist(path)
            .map_err(|e| Error::RenameFailed(format!("{}: {}", path.display(), e.error)))?;

        debug!("Saved installed database to {}", path.display());
        Ok(())
    }

    /// Look up an installed package by name
    pub fn find_by_name(&self, name: &str) -> Option<&InstalledRecord> {
        self.packages.iter().find(|p| p.name == name)
    }

    /// Insert or replace a record by name (last write wins)
    ///
    /// Refreshes `last_update`.
    pub fn upsert(&mut self, record: InstalledRecord) {
        self.packages.retain(|p| p.name != record.name);
        self.packages.push(record);
        self.last_update = Utc::now();
    }

    /// Remove a record by name; returns whether one existed
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.packages.len();
        self.packages.retain(|p| p.name != name);
        let removed = self.packages.len() != before;
        if removed {
            self.last_update = Utc::now();
        }
        removed
    }
}

impl Default for InstalledDatabase {
    fn default() -> Self {
        Self::new()
    }
}
