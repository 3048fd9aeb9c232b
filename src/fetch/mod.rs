// src/fetch/mod.rs

//! Concurrent artifact download coordinator
//!
//! Fetches a batch of artifacts into deterministic destination paths,
//! verifying SHA-256 checksums while streaming to disk. Up to
//! `concurrency` fetches run in parallel; the first failure cancels the
//! remaining in-flight fetches and the batch returns that error; no
//! partial success map is ever returned.
//!
//! Each download streams into a `.part` file next to its destination and is
//! renamed into place only after the checksum verifies, so a failed or
//! cancelled fetch never leaves a file at the destination path.

mod auth;

pub use auth::{Authenticator, AuthenticatorSet};

use rayon::prelude::*;
use reqwest::blocking::Client;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::hash;

/// Default timeout for HTTP requests (30 seconds)
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum retry attempts for failed downloads
const MAX_RETRIES: u32 = 3;

/// Retry delay in milliseconds
const RETRY_DELAY_MS: u64 = 1000;

/// Buffer size for streaming downloads (8 KB)
const STREAM_BUFFER_SIZE: usize = 8192;

/// Default parallel fetches when the caller leaves concurrency unset
pub const DEFAULT_CONCURRENCY: usize = 4;

/// One artifact to fetch
#[derive(Debug, Clone)]
pub struct DownloadItem {
    /// Caller-chosen key for the result map
    pub id: String,
    pub url: String,
    /// Expected SHA-256 hex digest; empty means unverified
    pub checksum: Option<String>,
    /// Explicit destination filename; derived from the URL when absent
    pub filename: Option<String>,
}

impl DownloadItem {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            checksum: None,
            filename: None,
        }
    }

    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = Some(checksum.into());
        self
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Destination filename: explicit name, else the URL's last path
    /// segment, else `<id>.bin`
    pub fn dest_filename(&self) -> String {
        if let Some(name) = &self.filename {
            return name.clone();
        }

        let path = self.url.split(['?', '#']).next().unwrap_or(&self.url);
        match path.rsplit('/').next() {
            Some(segment) if !segment.is_empty() => segment.to_string(),
            _ => format!("{}.bin", self.id),
        }
    }
}

/// Batch fetch options
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Directory downloads land in (created on demand)
    pub dest_dir: PathBuf,
    /// Parallel fetch bound; 0 selects [`DEFAULT_CONCURRENCY`]
    pub concurrency: usize,
}

impl FetchOptions {
    pub fn new(dest_dir: impl Into<PathBuf>) -> Self {
        Self {
            dest_dir: dest_dir.into(),
            concurrency: 0,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    fn effective_concurrency(&self) -> usize {
        if self.concurrency == 0 {
            DEFAULT_CONCURRENCY
        } else {
            self.concurrency
        }
    }
}

/// Capability interface the orchestrator consumes
pub trait DownloadManager: Send + Sync {
    /// Fetch one artifact to its deterministic destination path
    fn fetch(&self, cancel: &CancelToken, item: &DownloadItem, opts: &FetchOptions)
    -> Result<PathBuf>;

    /// Fetch a batch, all-or-nothing, keyed by item id
    fn fetch_all(
        &self,
        cancel: &CancelToken,
        items: &[DownloadItem],
        opts: &FetchOptions,
    ) -> Result<HashMap<String, PathBuf>>;

    /// Attach per-repository credentials, keyed by URL prefix
    fn set_authenticators(&mut self, authenticators: HashMap<String, Authenticator>);
}

/// HTTP download coordinator
pub struct HttpDownloader {
    client: Client,
    max_retries: u32,
    authenticators: AuthenticatorSet,
}

impl HttpDownloader {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::DownloadFailed(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            max_retries: MAX_RETRIES,
            authenticators: AuthenticatorSet::default(),
        })
    }

    /// Stream a response body to `dest`, hashing as bytes arrive
    ///
    /// Returns the SHA-256 hex digest of everything written. The partial
    /// file is removed on any error, including cancellation.
    fn stream_to_file(
        &self,
        cancel: &CancelToken,
        mut response: reqwest::blocking::Response,
        dest: &Path,
    ) -> Result<String> {
        let mut file = File::create(dest)
            .map_err(|e| Error::IoError(format!("failed to create {}: {e}", dest.display())))?;

        let mut hasher = Sha256::new();
        let mut buffer = [0u8; STREAM_BUFFER_SIZE];

        let result = loop {
            if let Err(e) = cancel.check() {
                break Err(e);
            }

            let n = match response.read(&mut buffer) {
                Ok(n) => n,
                Err(e) => break Err(Error::IoError(format!("failed to read response: {e}"))),
            };
            if n == 0 {
                break Ok(());
            }

            hasher.update(&buffer[..n]);
            if let Err(e) = file.write_all(&buffer[..n]) {
                break Err(Error::IoError(format!("failed to write data: {e}")));
            }
        };

        if let Err(e) = result {
            drop(file);
            let _ = fs::remove_file(dest);
            return Err(e);
        }

        Ok(hex::encode(hasher.finalize()))
    }

    /// Single download attempt: stream, verify, move into place
    fn fetch_attempt(
        &self,
        cancel: &CancelToken,
        item: &DownloadItem,
        dest_path: &Path,
    ) -> std::result::Result<(), (Error, bool)> {
        let mut request = self.client.get(&item.url);
        if let Some(auth) = self.authenticators.lookup(&item.url) {
            request = auth.apply(request);
        }

        // Transport errors are retryable; everything past this point is not.
        let response = request
            .send()
            .map_err(|e| (Error::DownloadFailed(format!("{}: {e}", item.url)), true))?;

        if !response.status().is_success() {
            return Err((
                Error::DownloadFailed(format!("HTTP {} from {}", response.status(), item.url)),
                false,
            ));
        }

        let part_path = dest_path.with_file_name(format!("{}.part", item.dest_filename()));
        let digest = self
            .stream_to_file(cancel, response, &part_path)
            .map_err(|e| (e, false))?;

        if let Some(expected) = item.checksum.as_deref().filter(|c| !c.is_empty()) {
            if !hash::digests_equal(expected, &digest) {
                let _ = fs::remove_file(&part_path);
                return Err((
                    Error::ChecksumMismatch {
                        expected: expected.to_string(),
                        actual: digest,
                    },
                    false,
                ));
            }
            debug!("Checksum verified for {}", item.id);
        }

        fs::rename(&part_path, dest_path).map_err(|e| {
            let _ = fs::remove_file(&part_path);
            (
                Error::IoError(format!(
                    "failed to move {} to {}: {e}",
                    part_path.display(),
                    dest_path.display()
                )),
                false,
            )
        })?;

        Ok(())
    }
}

impl DownloadManager for HttpDownloader {
    fn fetch(
        &self,
        cancel: &CancelToken,
        item: &DownloadItem,
        opts: &FetchOptions,
    ) -> Result<PathBuf> {
        fs::create_dir_all(&opts.dest_dir)
            .map_err(|e| Error::IoError(format!("failed to create download dir: {e}")))?;

        let dest_path = opts.dest_dir.join(item.dest_filename());
        info!("Downloading {} to {}", item.url, dest_path.display());

        let mut attempt = 0;
        loop {
            cancel.check()?;
            attempt += 1;

            match self.fetch_attempt(cancel, item, &dest_path) {
                Ok(()) => {
                    debug!("Downloaded {} -> {}", item.id, dest_path.display());
                    return Ok(dest_path);
                }
                Err((e, retryable)) => {
                    if !retryable || attempt >= self.max_retries {
                        return Err(e);
                    }
                    warn!("Download attempt {} failed: {}, retrying...", attempt, e);
                    std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS * attempt as u64));
                }
            }
        }
    }

    fn fetch_all(
        &self,
        cancel: &CancelToken,
        items: &[DownloadItem],
        opts: &FetchOptions,
    ) -> Result<HashMap<String, PathBuf>> {
        if items.is_empty() {
            return Ok(HashMap::new());
        }

        let workers = opts.effective_concurrency().min(items.len());
        info!("Fetching {} artifact(s) with {} worker(s)", items.len(), workers);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|e| Error::DownloadFailed(format!("failed to build fetch pool: {e}")))?;

        // First failure trips the batch token so in-flight fetches abort at
        // their next chunk; the caller's token is untouched.
        let batch = cancel.child();

        let results: Vec<(String, Result<PathBuf>)> = pool.install(|| {
            items
                .par_iter()
                .map(|item| {
                    let result = self.fetch(&batch, item, opts);
                    if result.is_err() {
                        batch.cancel();
                    }
                    (item.id.clone(), result)
                })
                .collect()
        });

        let mut paths = HashMap::new();
        let mut first_error = None;
        let mut cancelled = false;

        for (id, result) in results {
            match result {
                Ok(path) => {
                    paths.insert(id, path);
                }
                Err(Error::Cancelled) => cancelled = true,
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }
        if cancelled {
            return Err(Error::Cancelled);
        }

        Ok(paths)
    }

    fn set_authenticators(&mut self, authenticators: HashMap<String, Authenticator>) {
        self.authenticators = AuthenticatorSet::new(authenticators);
    }
}
