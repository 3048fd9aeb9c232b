// src/repository/manager.rs

//! Repository registry
//!
//! [`RepositoryManager`] is an explicit owned value holding every configured
//! repository, keyed by name. It replaces any notion of a process-global
//! repository table: the embedding application constructs one and hands it
//! to the orchestrator.

use chrono::{DateTime, Utc};
use tracing::info;

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::index::{ArtifactDescriptor, RepositoryIndex};

/// One configured repository and its cached index
#[derive(Debug, Clone)]
pub struct RepositoryRecord {
    /// Unique repository name
    pub name: String,
    /// Base URL the index and artifacts are served from
    pub url: String,
    /// Disabled repositories are skipped by planning and sync
    pub enabled: bool,
    /// Tie-break weight between repositories; higher wins
    pub priority: i64,
    /// Index from the most recent successful sync, if any
    pub index: Option<RepositoryIndex>,
    /// Completion time of the most recent successful sync
    pub last_sync: Option<DateTime<Utc>>,
}

impl RepositoryRecord {
    /// Create an enabled record with default priority
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            enabled: true,
            priority: 0,
            index: None,
            last_sync: None,
        }
    }

    /// Set the priority (builder style)
    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }
}

/// A search match with the repository it came from
#[derive(Debug, Clone)]
pub struct SearchHit<'a> {
    pub repository: &'a str,
    pub descriptor: &'a ArtifactDescriptor,
}

/// Registry of configured repositories, keyed by name
#[derive(Debug, Default)]
pub struct RepositoryManager {
    repos: BTreeMap<String, RepositoryRecord>,
}

impl RepositoryManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a repository; duplicate names are rejected
    pub fn add(&mut self, record: RepositoryRecord) -> Result<()> {
        if self.repos.contains_key(&record.name) {
            return Err(Error::RepositoryError(format!(
                "repository '{}' already exists",
                record.name
            )));
        }
        info!("Added repository {} ({})", record.name, record.url);
        self.repos.insert(record.name.clone(), record);
        Ok(())
    }

    /// Remove a repository by name
    pub fn remove(&mut self, name: &str) -> Result<()> {
        self.repos
            .remove(name)
            .map(|_| info!("Removed repository {}", name))
            .ok_or_else(|| Error::RepositoryError(format!("repository '{name}' not found")))
    }

    /// Enable or disable a repository
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> Result<()> {
        let record = self
            .repos
            .get_mut(name)
            .ok_or_else(|| Error::RepositoryError(format!("repository '{name}' not found")))?;
        record.enabled = enabled;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&RepositoryRecord> {
        self.repos.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut RepositoryRecord> {
        self.repos.get_mut(name)
    }

    pub fn len(&self) -> usize {
        self.repos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repos.is_empty()
    }

    /// All records, in name order
    pub fn iter(&self) -> impl Iterator<Item = &RepositoryRecord> {
        self.repos.values()
    }

    /// Mutable access to all records, in name order
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut RepositoryRecord> {
        self.repos.values_mut()
    }

    /// Enabled repositories ordered by priority descending, then name
    ///
    /// This is the planning order: candidates from earlier repositories win
    /// platform-score ties.
    pub fn enabled_by_priority(&self) -> Vec<&RepositoryRecord> {
        let mut enabled: Vec<&RepositoryRecord> =
            self.repos.values().filter(|r| r.enabled).collect();
        enabled.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.name.cmp(&b.name)));
        enabled
    }

    /// Search cached indexes of enabled repositories for a package name
    ///
    /// Hits are returned in planning order (repository priority, then index
    /// declaration order). Repositories that have never synced contribute
    /// nothing.
    pub fn search(&self, name: &str) -> Vec<SearchHit<'_>> {
        let mut hits = Vec::new();
        for record in self.enabled_by_priority() {
            if let Some(index) = &record.index {
                for descriptor in index.find_by_name(name) {
                    hits.push(SearchHit {
                        repository: &record.name,
                        descriptor,
                    });
                }
            }
        }
        hits
    }
}
