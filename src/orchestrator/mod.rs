// src/orchestrator/mod.rs

//! Install pipeline composition
//!
//! The orchestrator wires the planner, download coordinator, archive
//! installer, installed-state store, and hook collaborator into one
//! pipeline:
//!
//! ```text
//! planning -> fetching -> installing(step)* -> done | failed
//! ```
//!
//! Progress surfaces only through the event sink: one event per phase
//! transition plus one per step entering planning/installing/done. The
//! returned `Result` is the sole success/failure signal.
//!
//! All step artifacts are fetched in one batch before any installation
//! begins, so a failed fetch never leaves a half-installed plan. Within the
//! plan, steps install strictly in list order; the order encodes the
//! dependency-first invariant and must not be run concurrently.

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::archive::{ArchiveInstaller, TarGzInstaller};
use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::events::{EventSink, InstallEvent, InstallPhase};
use crate::fetch::{DownloadItem, DownloadManager, FetchOptions};
use crate::hooks::{self, HookContext, HookRunner};
use crate::planner::{InstallPlan, InstallRequest, InstallStep, Planner};
use crate::repository::RepositoryManager;
use crate::state::{InstalledDatabase, InstalledRecord};

/// Composes the install pipeline over owned collaborators
pub struct Orchestrator {
    repositories: RepositoryManager,
    install_root: PathBuf,
    state_path: PathBuf,
    artifact_dir: PathBuf,
    installer: Box<dyn ArchiveInstaller>,
    downloader: Option<Box<dyn DownloadManager>>,
    hooks: Option<Box<dyn HookRunner>>,
    sink: Option<Box<dyn EventSink>>,
    concurrency: usize,
}

impl Orchestrator {
    /// Create an orchestrator with the default tar.gz installer and no
    /// download manager, hook runner, or event sink attached
    pub fn new(
        repositories: RepositoryManager,
        install_root: impl Into<PathBuf>,
        state_path: impl Into<PathBuf>,
        artifact_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            repositories,
            install_root: install_root.into(),
            state_path: state_path.into(),
            artifact_dir: artifact_dir.into(),
            installer: Box::new(TarGzInstaller::new()),
            downloader: None,
            hooks: None,
            sink: None,
            concurrency: 0,
        }
    }

    /// Attach the download coordinator (required for real installs)
    pub fn with_downloader(mut self, downloader: Box<dyn DownloadManager>) -> Self {
        self.downloader = Some(downloader);
        self
    }

    /// Replace the archive installer
    pub fn with_installer(mut self, installer: Box<dyn ArchiveInstaller>) -> Self {
        self.installer = installer;
        self
    }

    /// Attach the hook collaborator
    pub fn with_hooks(mut self, hooks: Box<dyn HookRunner>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// Attach the event sink; no sink means events are dropped
    pub fn with_sink(mut self, sink: Box<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Bound the fetch batch's parallelism (0 selects the default)
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn repositories(&self) -> &RepositoryManager {
        &self.repositories
    }

    pub fn repositories_mut(&mut self) -> &mut RepositoryManager {
        &mut self.repositories
    }

    fn emit(&self, event: InstallEvent) {
        if let Some(sink) = &self.sink {
            sink.emit(&event);
        }
    }

    /// Look up the description a repository carries for a planned step
    fn step_description(&self, step: &InstallStep) -> String {
        self.repositories
            .search(&step.name)
            .into_iter()
            .find(|hit| hit.descriptor.version == step.version)
            .map(|hit| hit.descriptor.description.clone())
            .unwrap_or_default()
    }

    /// Plan and execute an install request
    ///
    /// With `dry_run` the pipeline stops after planning: the planning
    /// events fire, a final `done("dry-run")` event is emitted, and nothing
    /// is downloaded or written.
    pub fn install(
        &self,
        cancel: &CancelToken,
        request: &InstallRequest,
        dry_run: bool,
    ) -> Result<InstallPlan> {
        match self.run_install(cancel, request, dry_run) {
            Ok(plan) => Ok(plan),
            Err(e) => {
                self.emit(InstallEvent::phase(InstallPhase::Failed, e.to_string()));
                Err(e)
            }
        }
    }

    fn run_install(
        &self,
        cancel: &CancelToken,
        request: &InstallRequest,
        dry_run: bool,
    ) -> Result<InstallPlan> {
        cancel.check()?;

        self.emit(InstallEvent::phase(
            InstallPhase::Planning,
            format!("resolving {}", request.name),
        ));

        if self.repositories.enabled_by_priority().is_empty() {
            return Err(Error::NoPlanner);
        }

        let mut db = InstalledDatabase::load(&self.state_path)?;
        let plan = Planner::new(&self.repositories, &db).plan(cancel, request)?;

        for step in plan.iter() {
            self.emit(InstallEvent::step(
                InstallPhase::Planning,
                &step.id,
                "queued",
            ));
        }

        if dry_run {
            info!("Dry run for {}: {} step(s) planned", request.name, plan.len());
            self.emit(InstallEvent::phase(InstallPhase::Done, "dry-run"));
            return Ok(plan);
        }

        let downloader = self.downloader.as_deref().ok_or(Error::NoDownloadManager)?;

        self.emit(InstallEvent::phase(
            InstallPhase::Fetching,
            format!("fetching {} artifact(s)", plan.len()),
        ));

        let items: Vec<DownloadItem> = plan
            .iter()
            .map(|step| {
                let mut item = DownloadItem::new(&step.id, &step.url);
                if !step.checksum.is_empty() {
                    item = item.with_checksum(&step.checksum);
                }
                item
            })
            .collect();

        let opts = FetchOptions::new(&self.artifact_dir).with_concurrency(self.concurrency);
        let artifacts = downloader.fetch_all(cancel, &items, &opts)?;

        for step in plan.iter() {
            cancel.check()?;
            self.emit(InstallEvent::step(
                InstallPhase::Installing,
                &step.id,
                "installing",
            ));
            self.install_step(cancel, step, &artifacts, &mut db)?;
            self.emit(InstallEvent::step(InstallPhase::Done, &step.id, "installed"));
        }

        self.emit(InstallEvent::phase(
            InstallPhase::Done,
            format!("installed {} step(s)", plan.len()),
        ));
        Ok(plan)
    }

    /// Install one step: pre-hook, extract, record, post-hook
    fn install_step(
        &self,
        cancel: &CancelToken,
        step: &InstallStep,
        artifacts: &std::collections::HashMap<String, PathBuf>,
        db: &mut InstalledDatabase,
    ) -> Result<()> {
        let local = artifacts
            .get(&step.id)
            .filter(|path| path.is_file() && path.metadata().map(|m| m.len() > 0).unwrap_or(false))
            .ok_or_else(|| Error::NoLocalFile(step.id.clone()))?;

        let context = HookContext::new(&step.name, &step.version, local, &self.install_root);

        // A pre-install failure aborts the whole install
        if let Some(runner) = &self.hooks {
            runner.execute(hooks::PRE_INSTALL, &context)?;
        }

        let files = self.installer.install(cancel, local, &self.install_root)?;

        db.upsert(InstalledRecord {
            name: step.name.clone(),
            version: step.version.clone(),
            description: self.step_description(step),
            installed_at: chrono::Utc::now(),
            installed_from: step.url.clone(),
            files,
            checksum: step.checksum.clone(),
        });
        db.save(&self.state_path)?;

        // Post-install failures are warnings, never fatal
        if let Some(runner) = &self.hooks {
            if let Err(e) = runner.execute(hooks::POST_INSTALL, &context) {
                warn!("post-install hook for {} failed: {}", step.id, e);
            }
        }

        Ok(())
    }

    /// Remove an installed package
    ///
    /// Deletes the recorded files from the install root (best-effort),
    /// drops the record, and persists the database. The pre-remove hook is
    /// fatal on failure; post-remove is downgraded to a warning.
    pub fn remove(&self, cancel: &CancelToken, name: &str) -> Result<()> {
        cancel.check()?;

        let mut db = InstalledDatabase::load(&self.state_path)?;
        let record = db
            .find_by_name(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(name.to_string()))?;

        let context = HookContext::new(
            &record.name,
            &record.version,
            PathBuf::new(),
            &self.install_root,
        );

        if let Some(runner) = &self.hooks {
            runner.execute(hooks::PRE_REMOVE, &context)?;
        }

        for file in record.files.iter().rev() {
            let path = Path::new(file);
            match std::fs::remove_file(path) {
                Ok(()) => debug!("Removed {}", file),
                Err(e) => debug!("Could not remove {}: {}", file, e),
            }
        }

        db.remove(name);
        db.save(&self.state_path)?;
        info!("Removed {} {}", record.name, record.version);

        if let Some(runner) = &self.hooks {
            if let Err(e) = runner.execute(hooks::POST_REMOVE, &context) {
                warn!("post-remove hook for {} failed: {}", name, e);
            }
        }

        Ok(())
    }
}
