// src/planner/mod.rs

//! Install planning
//!
//! The planner expands an install request into an ordered list of steps.
//! The requested package is resolved against every enabled repository in
//! priority order; its dependencies that are not yet installed are expanded
//! recursively, each dependency's step appended before its dependent's
//! (post-order traversal), so the plan is dependency-first.
//!
//! A visitation map guards the recursion: re-entering a package that is
//! still being expanded means the dependency graph is cyclic, and planning
//! fails with `DependencyCycle` instead of recursing without bound.

use std::collections::HashMap;
use tracing::debug;

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::index::ArtifactDescriptor;
use crate::repository::RepositoryManager;
use crate::resolver;
use crate::state::InstalledDatabase;

/// One symbolic install request
#[derive(Debug, Clone)]
pub struct InstallRequest {
    pub name: String,
    /// Version constraint; empty, "any", or "*" accept every version
    pub version: String,
    pub os: String,
    pub arch: String,
}

impl InstallRequest {
    /// Request any version of a package for the given platform
    pub fn new(name: impl Into<String>, os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: String::new(),
            os: os.into(),
            arch: arch.into(),
        }
    }

    /// Constrain the version (builder style)
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }
}

/// One resolved install step, consumed read-only downstream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallStep {
    /// `name@version`
    pub id: String,
    pub name: String,
    pub version: String,
    pub os: String,
    pub arch: String,
    pub url: String,
    pub checksum: String,
}

impl InstallStep {
    fn from_descriptor(descriptor: &ArtifactDescriptor) -> Self {
        Self {
            id: descriptor.id(),
            name: descriptor.name.clone(),
            version: descriptor.version.clone(),
            os: descriptor.os.clone(),
            arch: descriptor.arch.clone(),
            url: descriptor.url.clone(),
            checksum: descriptor.checksum.clone(),
        }
    }
}

/// Ordered, dependency-first list of install steps
#[derive(Debug, Clone, Default)]
pub struct InstallPlan {
    pub steps: Vec<InstallStep>,
}

impl InstallPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &InstallStep> {
        self.steps.iter()
    }
}

/// Visitation state during dependency expansion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    Visiting,
    Visited,
}

/// Split a dependency entry into name and version constraint
///
/// `name@constraint` pins a version; a bare name resolves at "any".
fn split_dependency(entry: &str) -> (&str, &str) {
    match entry.rsplit_once('@') {
        Some((name, constraint)) if !name.is_empty() => (name, constraint),
        _ => (entry, ""),
    }
}

/// Expands install requests into dependency-first plans
pub struct Planner<'a> {
    repositories: &'a RepositoryManager,
    installed: &'a InstalledDatabase,
}

impl<'a> Planner<'a> {
    pub fn new(repositories: &'a RepositoryManager, installed: &'a InstalledDatabase) -> Self {
        Self {
            repositories,
            installed,
        }
    }

    /// Expand a request into an ordered install plan
    pub fn plan(&self, cancel: &CancelToken, request: &InstallRequest) -> Result<InstallPlan> {
        let mut plan = InstallPlan::new();
        let mut visits: HashMap<String, Visit> = HashMap::new();

        self.expand(
            cancel,
            &request.name,
            &request.version,
            &request.os,
            &request.arch,
            &mut visits,
            &mut plan,
        )?;

        debug!(
            "Planned {} step(s) for {} {}",
            plan.len(),
            request.name,
            if request.version.is_empty() { "any" } else { &request.version }
        );
        Ok(plan)
    }

    /// Candidates for a name across enabled repositories, in planning order
    fn candidates(&self, name: &str, constraint: &str) -> Vec<ArtifactDescriptor> {
        self.repositories
            .search(name)
            .into_iter()
            .filter(|hit| resolver::matches_constraint(&hit.descriptor.version, constraint))
            .map(|hit| hit.descriptor.clone())
            .collect()
    }

    fn expand(
        &self,
        cancel: &CancelToken,
        name: &str,
        constraint: &str,
        os: &str,
        arch: &str,
        visits: &mut HashMap<String, Visit>,
        plan: &mut InstallPlan,
    ) -> Result<()> {
        cancel.check()?;

        match visits.get(name) {
            Some(Visit::Visiting) => return Err(Error::DependencyCycle(name.to_string())),
            Some(Visit::Visited) => return Ok(()),
            None => {}
        }
        visits.insert(name.to_string(), Visit::Visiting);

        let candidates = self.candidates(name, constraint);
        let descriptor =
            resolver::resolve(&candidates, os, arch).map_err(|e| Error::ResolutionFailed {
                name: name.to_string(),
                source: Box::new(e),
            })?;

        for entry in &descriptor.dependencies {
            let (dep_name, dep_constraint) = split_dependency(entry);
            if self.installed.find_by_name(dep_name).is_some() {
                debug!("Dependency {} already installed, skipping", dep_name);
                continue;
            }
            self.expand(cancel, dep_name, dep_constraint, os, arch, visits, plan)?;
        }

        plan.steps.push(InstallStep::from_descriptor(&descriptor));
        visits.insert(name.to_string(), Visit::Visited);
        Ok(())
    }
}
