// src/cancel.rs

//! Cooperative cancellation for long-running pipeline calls
//!
//! Every network- or filesystem-bound operation in the crate accepts a
//! [`CancelToken`]. Workers check the token between streamed chunks, between
//! retry attempts, and between install steps; cancellation is observed at
//! the next such point, never mid-write.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Error, Result};

/// Cloneable cancellation flag shared between a caller and its workers
///
/// A token derived with [`CancelToken::child`] observes its parent's
/// cancellation but cancelling the child leaves the parent untouched; the
/// download coordinator uses this to abort a batch on first failure without
/// cancelling the caller.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    parent: Option<Arc<CancelToken>>,
}

impl CancelToken {
    /// Create a token in the not-cancelled state
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive a child token: parent cancellation propagates down, child
    /// cancellation does not propagate up
    pub fn child(&self) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            parent: Some(Arc::new(self.clone())),
        }
    }

    /// Request cancellation; all clones and children observe it
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Check whether cancellation has been requested here or by a parent
    pub fn is_cancelled(&self) -> bool {
        if self.flag.load(Ordering::SeqCst) {
            return true;
        }
        match &self.parent {
            Some(parent) => parent.is_cancelled(),
            None => false,
        }
    }

    /// Bail out with [`Error::Cancelled`] if cancellation was requested
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}
