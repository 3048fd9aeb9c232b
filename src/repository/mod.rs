// src/repository/mod.rs

//! Repository management and index synchronization
//!
//! This module provides functionality for:
//! - Managing the set of configured repositories
//! - Synchronizing repository indexes with conditional requests
//! - Atomic on-disk index caching and staleness tracking
//! - Searching cached indexes across repositories

mod client;
mod manager;
mod sync;

pub use client::{IndexClient, IndexFetch};
pub use manager::{RepositoryManager, RepositoryRecord, SearchHit};
pub use sync::RepositorySyncer;
