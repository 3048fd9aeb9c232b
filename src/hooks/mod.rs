// src/hooks/mod.rs

//! Lifecycle hook execution
//!
//! Hooks run around install and remove operations. The contract is small:
//! a runner is handed an event name and a [`HookContext`]; an event with no
//! registered hook is a no-op, not an error. The shipped
//! [`ProcessHookRunner`] registers hooks by file presence (one executable
//! per event in a configured hooks directory) and runs them with:
//!
//! - `STRATA_*` environment variables describing the package
//! - stdin nullification to prevent hangs
//! - timeout protection (60 seconds by default)
//! - stdout/stderr relogged through tracing

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::{debug, info, warn};
use wait_timeout::ChildExt;

use crate::error::{Error, Result};

/// Default timeout for hook execution (60 seconds)
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Lifecycle event names
pub const PRE_INSTALL: &str = "pre-install";
pub const POST_INSTALL: &str = "post-install";
pub const PRE_REMOVE: &str = "pre-remove";
pub const POST_REMOVE: &str = "post-remove";

/// Everything a hook learns about the operation it wraps
#[derive(Debug, Clone)]
pub struct HookContext {
    pub package_name: String,
    pub package_version: String,
    /// Local path of the package archive (empty for remove events)
    pub package_path: PathBuf,
    pub install_path: PathBuf,
    /// Extra variables passed through to the hook environment verbatim
    pub vars: BTreeMap<String, String>,
}

impl HookContext {
    pub fn new(
        package_name: impl Into<String>,
        package_version: impl Into<String>,
        package_path: impl Into<PathBuf>,
        install_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            package_name: package_name.into(),
            package_version: package_version.into(),
            package_path: package_path.into(),
            install_path: install_path.into(),
            vars: BTreeMap::new(),
        }
    }
}

/// Hook collaborator contract
pub trait HookRunner: Send + Sync {
    /// Run the hook for an event; absence of a hook is a no-op
    fn execute(&self, event: &str, context: &HookContext) -> Result<()>;
}

/// Runs per-event hook scripts as subprocesses
pub struct ProcessHookRunner {
    hooks_dir: PathBuf,
    timeout: Duration,
}

impl ProcessHookRunner {
    /// Create a runner over a hooks directory
    ///
    /// A hook is registered for an event by placing an executable named
    /// after the event (e.g. `pre-install`) in this directory.
    pub fn new(hooks_dir: impl Into<PathBuf>) -> Self {
        Self {
            hooks_dir: hooks_dir.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set a custom timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn script_path(&self, event: &str) -> PathBuf {
        self.hooks_dir.join(event)
    }
}

impl HookRunner for ProcessHookRunner {
    fn execute(&self, event: &str, context: &HookContext) -> Result<()> {
        let script = self.script_path(event);
        if !script.exists() {
            debug!("No {} hook registered, skipping", event);
            return Ok(());
        }

        info!(
            "Executing {} hook for {} v{}",
            event, context.package_name, context.package_version
        );

        let mut command = Command::new(&script);
        command
            .env("STRATA_EVENT", event)
            .env("STRATA_PACKAGE_NAME", &context.package_name)
            .env("STRATA_PACKAGE_VERSION", &context.package_version)
            .env("STRATA_PACKAGE_PATH", &context.package_path)
            .env("STRATA_INSTALL_PATH", &context.install_path)
            .stdin(Stdio::null()) // CRITICAL: prevent stdin hangs
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        for (key, value) in &context.vars {
            command.env(key, value);
        }

        let mut child = command.spawn().map_err(|e| Error::HookFailed {
            event: event.to_string(),
            reason: format!("failed to spawn {}: {e}", script.display()),
        })?;

        match child.wait_timeout(self.timeout)? {
            Some(status) => {
                let output = child.wait_with_output()?;
                relog_output(event, &output.stdout, &output.stderr);

                if status.success() {
                    info!("{} hook completed successfully", event);
                    Ok(())
                } else {
                    Err(Error::HookFailed {
                        event: event.to_string(),
                        reason: format!("exit code {}", status.code().unwrap_or(-1)),
                    })
                }
            }
            None => {
                let _ = child.kill();
                Err(Error::HookFailed {
                    event: event.to_string(),
                    reason: format!("timed out after {} seconds", self.timeout.as_secs()),
                })
            }
        }
    }
}

/// Relay captured hook output through tracing
fn relog_output(event: &str, stdout: &[u8], stderr: &[u8]) {
    let stdout = String::from_utf8_lossy(stdout);
    let stderr = String::from_utf8_lossy(stderr);

    for line in stdout.lines() {
        info!("[{}] {}", event, line);
    }
    for line in stderr.lines() {
        warn!("[{}] {}", event, line);
    }
}
