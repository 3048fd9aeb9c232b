// src/repository/sync.rs

//! Repository index synchronization and on-disk caching
//!
//! Each repository's index is cached as one JSON file under the syncer's
//! cache directory. Sync performs a conditional fetch keyed on the cache
//! file's modification time; a fresh document is validated before it is
//! persisted, and persistence is atomic (temp file, fsync, rename), so a
//! failed sync never corrupts the previous cache.

use rayon::prelude::*;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::index::RepositoryIndex;

use super::client::{IndexClient, IndexFetch};
use super::manager::{RepositoryManager, RepositoryRecord};

/// Synchronizes repository indexes into an on-disk cache
pub struct RepositorySyncer {
    client: IndexClient,
    cache_dir: PathBuf,
}

impl RepositorySyncer {
    /// Create a syncer caching under `cache_dir` (created on demand)
    pub fn new(cache_dir: impl Into<PathBuf>) -> Result<Self> {
        let cache_dir = cache_dir.into();
        std::fs::create_dir_all(&cache_dir)
            .map_err(|e| Error::IoError(format!("failed to create cache dir: {e}")))?;

        Ok(Self {
            client: IndexClient::new()?,
            cache_dir,
        })
    }

    /// Cache file path for a repository name
    pub fn cache_path(&self, name: &str) -> PathBuf {
        self.cache_dir.join(format!("{name}.json"))
    }

    /// Modification time of the cached index, if one exists
    fn cache_mtime(&self, name: &str) -> Option<SystemTime> {
        std::fs::metadata(self.cache_path(name))
            .and_then(|m| m.modified())
            .ok()
    }

    /// Age of the cached index
    ///
    /// Fails with [`Error::StaleCache`] when no cache exists.
    pub fn cache_age(&self, name: &str) -> Result<Duration> {
        let mtime = self
            .cache_mtime(name)
            .ok_or_else(|| Error::StaleCache(name.to_string()))?;
        Ok(SystemTime::now()
            .duration_since(mtime)
            .unwrap_or(Duration::ZERO))
    }

    /// Check whether the cached index is older than `max_age`
    ///
    /// A missing cache counts as stale. The mtime carries the server's
    /// Last-Modified, so a stale result for an unchanged index resolves to
    /// a cheap 304 on the next sync.
    pub fn is_stale(&self, name: &str, max_age: Duration) -> bool {
        match self.cache_age(name) {
            Ok(age) => age > max_age,
            Err(_) => true,
        }
    }

    /// Load and validate the cached index for a repository
    pub fn load_cached(&self, name: &str) -> Result<RepositoryIndex> {
        let path = self.cache_path(name);
        if !path.exists() {
            return Err(Error::StaleCache(name.to_string()));
        }
        let data = std::fs::read(&path)
            .map_err(|e| Error::IoError(format!("failed to read cached index: {e}")))?;
        RepositoryIndex::from_json(&data)
    }

    /// Atomically replace the cached index file
    ///
    /// Writes to a temporary file in the cache directory, fsyncs, and
    /// renames over the destination. On any failure before the rename the
    /// temporary file is removed and the previous cache is untouched.
    fn persist(&self, name: &str, body: &[u8], last_modified: Option<SystemTime>) -> Result<()> {
        let dest = self.cache_path(name);

        let mut temp = NamedTempFile::new_in(&self.cache_dir)
            .map_err(|e| Error::IoError(format!("failed to create temp file: {e}")))?;
        temp.write_all(body)
            .map_err(|e| Error::IoError(format!("failed to write index cache: {e}")))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| Error::IoError(format!("failed to sync index cache: {e}")))?;
        temp.persist(&dest)
            .map_err(|e| Error::RenameFailed(format!("{}: {}", dest.display(), e.error)))?;

        // Stamp the server's Last-Modified so the next sync's precondition
        // reflects what the server actually served.
        if let Some(mtime) = last_modified {
            if let Err(e) = filetime::set_file_mtime(&dest, filetime::FileTime::from(mtime)) {
                warn!("Failed to stamp cache mtime for {}: {}", name, e);
            }
        }

        debug!("Cached index for {} at {}", name, dest.display());
        Ok(())
    }

    /// Synchronize one repository's index
    ///
    /// A "not modified" response loads and returns the cached index without
    /// writing. A fresh document is validated and atomically persisted;
    /// validation failure leaves the previous cache untouched. On success
    /// the record's cached index and last-sync timestamp are replaced as a
    /// whole.
    pub fn sync(&self, cancel: &CancelToken, record: &mut RepositoryRecord) -> Result<RepositoryIndex> {
        info!("Synchronizing repository: {}", record.name);

        let url = IndexClient::index_url(&record.url);
        let if_modified_since = self.cache_mtime(&record.name);

        let index = match self.client.fetch_index(cancel, &url, if_modified_since)? {
            IndexFetch::NotModified => {
                info!("Repository {} is up to date", record.name);
                self.load_cached(&record.name)?
            }
            IndexFetch::Fetched {
                body,
                last_modified,
            } => {
                let index = RepositoryIndex::from_json(&body).map_err(|e| Error::SyncFailed {
                    name: record.name.clone(),
                    reason: e.to_string(),
                })?;
                self.persist(&record.name, &body, last_modified)?;
                info!(
                    "Synchronized {} packages from repository {}",
                    index.packages.len(),
                    record.name
                );
                index
            }
        };

        record.index = Some(index.clone());
        record.last_sync = Some(chrono::Utc::now());
        Ok(index)
    }

    /// Synchronize every enabled repository concurrently
    ///
    /// One repository's failure does not block the others. Returns a map
    /// from repository name to the error it failed with; an empty map means
    /// every enabled repository synced.
    pub fn sync_all(
        &self,
        cancel: &CancelToken,
        manager: &mut RepositoryManager,
    ) -> BTreeMap<String, Error> {
        let mut records: Vec<&mut RepositoryRecord> =
            manager.iter_mut().filter(|r| r.enabled).collect();

        let results: Vec<(String, Result<()>)> = records
            .par_iter_mut()
            .map(|record| {
                let name = record.name.clone();
                let result = self.sync(cancel, record).map(|_| ());
                (name, result)
            })
            .collect();

        let mut errors = BTreeMap::new();
        for (name, result) in results {
            if let Err(e) = result {
                warn!("Sync failed for repository {}: {}", name, e);
                errors.insert(name, e);
            }
        }
        errors
    }
}
