// src/archive/mod.rs

//! Package archive installation
//!
//! Extracts a verified `.tar.gz`/`.tgz` package into the managed install
//! root. Extraction is security-sensitive: entry names and link targets
//! come from an untrusted archive, so every target path is sanitized and
//! any entry or link escaping the install root aborts the whole extraction
//! with nothing left behind. After extraction the in-archive manifest is
//! cross-checked against the tree: the per-file digest is authoritative,
//! size and mode are informative.

mod manifest;

pub use manifest::{ManifestFile, PackageManifest, is_manifest_entry};

use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::Read;
use std::os::unix::fs::PermissionsExt;
use std::path::{Component, Path, PathBuf};
use tar::{Archive, EntryType};
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::hash;

/// Capability interface the orchestrator consumes
pub trait ArchiveInstaller: Send + Sync {
    /// Extract an archive into the install root, returning the ordered
    /// list of installed file paths
    fn install(
        &self,
        cancel: &CancelToken,
        archive_path: &Path,
        install_root: &Path,
    ) -> Result<Vec<String>>;
}

/// Installer for gzip-compressed tar packages
#[derive(Debug, Default)]
pub struct TarGzInstaller;

impl TarGzInstaller {
    pub fn new() -> Self {
        Self
    }
}

/// Sanitize an archive entry path to a root-relative form
///
/// Rejects `..` components, skips `.`, and strips leading slashes and
/// prefixes, so the result can only point inside the extraction root.
fn sanitize_entry_path(entry_path: &str) -> Result<PathBuf> {
    let relative = entry_path.trim_start_matches('/');
    let mut normalized = PathBuf::new();

    for component in Path::new(relative).components() {
        match component {
            Component::Normal(c) => normalized.push(c),
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(Error::PathTraversal(entry_path.to_string()));
            }
            Component::Prefix(_) | Component::RootDir => {}
        }
    }

    if normalized.as_os_str().is_empty() {
        return Err(Error::InvalidPath(format!("empty entry path: {entry_path}")));
    }

    Ok(normalized)
}

/// Validate a link target against the extraction root
///
/// `entry_rel` is the sanitized root-relative path of the link entry
/// itself. Absolute targets are rejected outright; relative targets are
/// resolved lexically against the entry's directory and must stay inside
/// the root.
fn validate_link_target(entry_rel: &Path, target: &Path) -> Result<()> {
    if target.is_absolute() {
        return Err(Error::PathTraversal(format!(
            "{} -> {}",
            entry_rel.display(),
            target.display()
        )));
    }

    // Depth of the directory containing the link
    let mut depth: isize = entry_rel.components().count() as isize - 1;

    for component in target.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::ParentDir => {
                depth -= 1;
                if depth < 0 {
                    return Err(Error::PathTraversal(format!(
                        "{} -> {}",
                        entry_rel.display(),
                        target.display()
                    )));
                }
            }
            Component::CurDir => {}
            Component::Prefix(_) | Component::RootDir => {
                return Err(Error::PathTraversal(format!(
                    "{} -> {}",
                    entry_rel.display(),
                    target.display()
                )));
            }
        }
    }

    Ok(())
}

/// Tracks extracted paths so a failed extraction can be undone
#[derive(Default)]
struct ExtractionLog {
    files: Vec<PathBuf>,
    dirs: Vec<PathBuf>,
}

impl ExtractionLog {
    /// Remove everything extracted so far, newest first
    fn rollback(&self) {
        for file in self.files.iter().rev() {
            let _ = fs::remove_file(file);
        }
        // Directories only go if extraction created them and they are empty
        for dir in self.dirs.iter().rev() {
            let _ = fs::remove_dir(dir);
        }
    }
}

impl TarGzInstaller {
    /// Extract every entry, collecting the manifest along the way
    fn extract(
        &self,
        cancel: &CancelToken,
        archive_path: &Path,
        install_root: &Path,
        log: &mut ExtractionLog,
    ) -> Result<(PackageManifest, Vec<String>)> {
        let file = File::open(archive_path).map_err(|e| {
            Error::IoError(format!("failed to open {}: {e}", archive_path.display()))
        })?;
        let mut archive = Archive::new(GzDecoder::new(file));

        let mut manifest: Option<PackageManifest> = None;
        let mut installed: Vec<String> = Vec::new();

        let entries = archive
            .entries()
            .map_err(|e| Error::IoError(format!("failed to read archive entries: {e}")))?;

        for entry in entries {
            cancel.check()?;

            let mut entry =
                entry.map_err(|e| Error::IoError(format!("failed to read archive entry: {e}")))?;

            let entry_path = entry
                .path()
                .map_err(|e| Error::IoError(format!("failed to get entry path: {e}")))?
                .to_string_lossy()
                .to_string();

            // The metadata entry is parsed, never written to disk
            if is_manifest_entry(&entry_path) {
                let mut data = Vec::new();
                entry
                    .read_to_end(&mut data)
                    .map_err(|e| Error::IoError(format!("failed to read manifest: {e}")))?;
                manifest = Some(PackageManifest::from_json(&data)?);
                continue;
            }

            let relative = sanitize_entry_path(&entry_path)?;
            let target = install_root.join(&relative);
            let entry_type = entry.header().entry_type();

            match entry_type {
                EntryType::Directory => {
                    self.create_dir_tracked(install_root, &target, log)?;
                }
                EntryType::Symlink | EntryType::Link => {
                    let link_target = entry
                        .link_name()
                        .map_err(|e| Error::IoError(format!("failed to get link target: {e}")))?
                        .ok_or_else(|| {
                            Error::InvalidPath(format!("link entry without target: {entry_path}"))
                        })?;

                    validate_link_target(&relative, &link_target)?;
                    self.prepare_parent(install_root, &target, log)?;

                    if entry_type == EntryType::Symlink {
                        std::os::unix::fs::symlink(&link_target, &target).map_err(|e| {
                            Error::IoError(format!("failed to create symlink {}: {e}", target.display()))
                        })?;
                    } else {
                        // Hard link targets name an already-extracted entry
                        let source = install_root.join(sanitize_entry_path(
                            &link_target.to_string_lossy(),
                        )?);
                        fs::hard_link(&source, &target).map_err(|e| {
                            Error::IoError(format!("failed to create hard link {}: {e}", target.display()))
                        })?;
                    }

                    log.files.push(target.clone());
                    installed.push(target.display().to_string());
                }
                EntryType::Regular => {
                    self.prepare_parent(install_root, &target, log)?;

                    let mut out = File::create(&target).map_err(|e| {
                        Error::IoError(format!("failed to create {}: {e}", target.display()))
                    })?;
                    std::io::copy(&mut entry, &mut out).map_err(|e| {
                        Error::IoError(format!("failed to extract {}: {e}", target.display()))
                    })?;

                    if let Ok(mode) = entry.header().mode() {
                        let perms = fs::Permissions::from_mode(mode);
                        if let Err(e) = fs::set_permissions(&target, perms) {
                            warn!("Failed to set mode on {}: {}", target.display(), e);
                        }
                    }

                    log.files.push(target.clone());
                    installed.push(target.display().to_string());
                }
                other => {
                    debug!("Skipping unsupported entry type {:?}: {}", other, entry_path);
                }
            }
        }

        let manifest = manifest.ok_or_else(|| {
            Error::InvalidManifest(format!(
                "{} has no pkg.json/metadata.json entry",
                archive_path.display()
            ))
        })?;

        Ok((manifest, installed))
    }

    /// Create a target's parent directories inside the root on demand
    fn prepare_parent(
        &self,
        install_root: &Path,
        target: &Path,
        log: &mut ExtractionLog,
    ) -> Result<()> {
        match target.parent() {
            Some(parent) => self.create_dir_tracked(install_root, parent, log),
            None => Ok(()),
        }
    }

    /// Create a directory, recording each missing ancestor for rollback
    fn create_dir_tracked(
        &self,
        install_root: &Path,
        dir: &Path,
        log: &mut ExtractionLog,
    ) -> Result<()> {
        if dir.exists() {
            return Ok(());
        }

        let mut missing = Vec::new();
        let mut cursor = dir;
        while !cursor.exists() && cursor.starts_with(install_root) && cursor != install_root {
            missing.push(cursor.to_path_buf());
            match cursor.parent() {
                Some(p) => cursor = p,
                None => break,
            }
        }

        fs::create_dir_all(dir)
            .map_err(|e| Error::IoError(format!("failed to create {}: {e}", dir.display())))?;

        for created in missing.into_iter().rev() {
            log.dirs.push(created);
        }
        Ok(())
    }

    /// Cross-check the extracted tree against the manifest
    fn verify_manifest(&self, manifest: &PackageManifest, install_root: &Path) -> Result<()> {
        for declared in &manifest.files {
            let relative = sanitize_entry_path(&declared.path)?;
            let target = install_root.join(&relative);

            let metadata = match fs::symlink_metadata(&target) {
                Ok(m) => m,
                Err(_) => return Err(Error::MissingFile(declared.path.clone())),
            };

            if metadata.is_file() {
                let actual = hash::sha256_file(&target).map_err(|e| {
                    Error::IoError(format!("failed to hash {}: {e}", target.display()))
                })?;
                if !hash::digests_equal(&declared.sha256, &actual) {
                    return Err(Error::IntegrityMismatch {
                        path: declared.path.clone(),
                        expected: declared.sha256.clone(),
                        actual,
                    });
                }

                if declared.size != 0 && metadata.len() != declared.size {
                    warn!(
                        "Size mismatch for {} (declared {}, found {})",
                        declared.path,
                        declared.size,
                        metadata.len()
                    );
                }
                if let Some(mode) = declared.mode {
                    let actual_mode = metadata.permissions().mode() & 0o7777;
                    if actual_mode != mode {
                        warn!(
                            "Mode mismatch for {} (declared {:o}, found {:o})",
                            declared.path, mode, actual_mode
                        );
                    }
                }
            }
        }

        Ok(())
    }
}

impl ArchiveInstaller for TarGzInstaller {
    fn install(
        &self,
        cancel: &CancelToken,
        archive_path: &Path,
        install_root: &Path,
    ) -> Result<Vec<String>> {
        let name = archive_path.to_string_lossy();
        if !name.ends_with(".tar.gz") && !name.ends_with(".tgz") {
            return Err(Error::UnsupportedArchiveFormat(name.to_string()));
        }

        fs::create_dir_all(install_root)
            .map_err(|e| Error::IoError(format!("failed to create install root: {e}")))?;

        info!(
            "Installing {} into {}",
            archive_path.display(),
            install_root.display()
        );

        let mut log = ExtractionLog::default();
        let (manifest, installed) =
            match self.extract(cancel, archive_path, install_root, &mut log) {
                Ok(result) => result,
                Err(e) => {
                    log.rollback();
                    return Err(e);
                }
            };

        if let Err(e) = self.verify_manifest(&manifest, install_root) {
            log.rollback();
            return Err(e);
        }

        info!(
            "Installed {} {} ({} file(s))",
            manifest.name,
            manifest.version,
            installed.len()
        );
        Ok(installed)
    }
}
