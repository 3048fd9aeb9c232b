// src/repository/client.rs

//! HTTP client for repository index retrieval
//!
//! Wraps reqwest's blocking client with retry support and the conditional
//! GET contract: a cached index's last-modified time is sent as
//! `If-Modified-Since`, and a `304 Not Modified` short-circuits to the
//! cache. Any status other than 200/304 is a hard failure.

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{HeaderValue, IF_MODIFIED_SINCE, LAST_MODIFIED};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::error::{Error, Result};

/// Default timeout for HTTP requests (30 seconds)
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum retry attempts for failed fetches
const MAX_RETRIES: u32 = 3;

/// Retry delay in milliseconds
const RETRY_DELAY_MS: u64 = 1000;

/// Result of a conditional index fetch
#[derive(Debug)]
pub enum IndexFetch {
    /// Server reported the cached copy is current
    NotModified,
    /// Fresh index document, with the server's Last-Modified when present
    Fetched {
        body: Vec<u8>,
        last_modified: Option<SystemTime>,
    },
}

/// Format a timestamp as an HTTP-date (RFC 7231 IMF-fixdate)
fn format_http_date(time: SystemTime) -> String {
    let dt: DateTime<Utc> = time.into();
    dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Parse a Last-Modified header value
fn parse_http_date(value: &str) -> Option<SystemTime> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc).into())
}

/// HTTP client wrapper with retry support
pub struct IndexClient {
    client: Client,
    max_retries: u32,
}

impl IndexClient {
    /// Create a new index client
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::RepositoryError(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            max_retries: MAX_RETRIES,
        })
    }

    /// Derive the index document URL from a repository base URL
    ///
    /// URLs already naming a `.json` document are used as-is.
    pub fn index_url(base: &str) -> String {
        if base.ends_with(".json") {
            base.to_string()
        } else if base.ends_with('/') {
            format!("{base}index.json")
        } else {
            format!("{base}/index.json")
        }
    }

    /// Conditionally fetch an index document
    ///
    /// When `if_modified_since` is given it is sent as a precondition; a
    /// `304` response yields [`IndexFetch::NotModified`] without a body.
    pub fn fetch_index(
        &self,
        cancel: &CancelToken,
        url: &str,
        if_modified_since: Option<SystemTime>,
    ) -> Result<IndexFetch> {
        info!("Fetching repository index from {}", url);

        let mut attempt = 0;
        loop {
            cancel.check()?;
            attempt += 1;

            let mut request = self.client.get(url);
            if let Some(since) = if_modified_since {
                let date = format_http_date(since);
                debug!("Conditional request: If-Modified-Since {}", date);
                if let Ok(value) = HeaderValue::from_str(&date) {
                    request = request.header(IF_MODIFIED_SINCE, value);
                }
            }

            match request.send() {
                Ok(response) => {
                    if response.status() == StatusCode::NOT_MODIFIED {
                        debug!("Index at {} not modified", url);
                        return Ok(IndexFetch::NotModified);
                    }

                    if !response.status().is_success() {
                        return Err(Error::DownloadFailed(format!(
                            "HTTP {} from {}",
                            response.status(),
                            url
                        )));
                    }

                    let last_modified = response
                        .headers()
                        .get(LAST_MODIFIED)
                        .and_then(|v| v.to_str().ok())
                        .and_then(parse_http_date);

                    let body = response
                        .bytes()
                        .map_err(|e| {
                            Error::DownloadFailed(format!("failed to read index body: {e}"))
                        })?
                        .to_vec();

                    debug!("Fetched {} bytes from {}", body.len(), url);
                    return Ok(IndexFetch::Fetched {
                        body,
                        last_modified,
                    });
                }
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(Error::DownloadFailed(format!(
                            "failed to fetch index after {attempt} attempts: {e}"
                        )));
                    }
                    warn!("Index fetch attempt {} failed: {}, retrying...", attempt, e);
                    std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS * attempt as u64));
                }
            }
        }
    }
}
