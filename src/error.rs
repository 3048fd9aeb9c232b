// src/error.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// All errors produced by the package pipeline
#[derive(Debug, Error)]
pub enum Error {
    // Resolution
    #[error("no artifact found: {0}")]
    NotFound(String),

    #[error("no candidate artifacts to select from")]
    NoCandidates,

    // Planning
    #[error("failed to resolve '{name}': {source}")]
    ResolutionFailed {
        name: String,
        #[source]
        source: Box<Error>,
    },

    #[error("dependency cycle detected at '{0}'")]
    DependencyCycle(String),

    // Fetch
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("download failed: {0}")]
    DownloadFailed(String),

    // Archive install
    #[error("archive entry escapes install root: {0}")]
    PathTraversal(String),

    #[error("integrity mismatch for {path}: expected {expected}, got {actual}")]
    IntegrityMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("file declared in manifest not found: {0}")]
    MissingFile(String),

    #[error("unsupported archive format: {0}")]
    UnsupportedArchiveFormat(String),

    #[error("invalid package manifest: {0}")]
    InvalidManifest(String),

    // Orchestration
    #[error("no local artifact available for step {0}")]
    NoLocalFile(String),

    #[error("no download manager configured")]
    NoDownloadManager,

    #[error("no repositories configured to plan against")]
    NoPlanner,

    #[error("hook '{event}' failed: {reason}")]
    HookFailed { event: String, reason: String },

    // Repository sync
    #[error("repository cache for '{0}' is missing or stale")]
    StaleCache(String),

    #[error("sync failed for repository '{name}': {reason}")]
    SyncFailed { name: String, reason: String },

    #[error("invalid repository index: {0}")]
    InvalidIndex(String),

    // State persistence
    #[error("invalid state file: {0}")]
    InvalidState(String),

    #[error("failed to encode state: {0}")]
    EncodeFailed(String),

    #[error("failed to replace file: {0}")]
    RenameFailed(String),

    // Shared
    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("repository error: {0}")]
    RepositoryError(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    IoError(String),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::IoError(e.to_string())
    }
}
