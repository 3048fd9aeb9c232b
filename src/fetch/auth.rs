// src/fetch/auth.rs

//! Per-repository download credentials
//!
//! Authenticators are attached to the download coordinator keyed by URL
//! prefix; the longest matching prefix supplies the credentials for a
//! request. Variants cover the schemes repositories actually use: HTTP
//! Basic, bearer tokens, and arbitrary header injection.

use reqwest::blocking::RequestBuilder;

/// Credentials applied to outgoing artifact requests
#[derive(Debug, Clone)]
pub enum Authenticator {
    /// HTTP Basic authentication
    Basic { username: String, password: String },
    /// `Authorization: Bearer <token>`
    Bearer { token: String },
    /// Custom header, e.g. an API key
    Header { name: String, value: String },
}

impl Authenticator {
    /// Apply the credentials to a request
    pub fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Self::Basic { username, password } => {
                request.basic_auth(username, Some(password.clone()))
            }
            Self::Bearer { token } => request.bearer_auth(token),
            Self::Header { name, value } => request.header(name.as_str(), value.as_str()),
        }
    }
}

/// Ordered prefix table for authenticator lookup
///
/// Entries are held longest-prefix-first so the most specific registration
/// wins.
#[derive(Debug, Clone, Default)]
pub struct AuthenticatorSet {
    entries: Vec<(String, Authenticator)>,
}

impl AuthenticatorSet {
    /// Build from prefix → authenticator pairs
    pub fn new(entries: impl IntoIterator<Item = (String, Authenticator)>) -> Self {
        let mut entries: Vec<(String, Authenticator)> = entries.into_iter().collect();
        entries.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
        Self { entries }
    }

    /// Credentials for a URL, if any prefix matches
    pub fn lookup(&self, url: &str) -> Option<&Authenticator> {
        self.entries
            .iter()
            .find(|(prefix, _)| url.starts_with(prefix.as_str()))
            .map(|(_, auth)| auth)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
