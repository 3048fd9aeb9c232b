// src/paths.rs

//! Centralized path derivation for strata directories
//!
//! The embedding application normally supplies explicit paths; these helpers
//! provide the conventional defaults under the user's cache and data dirs.

use std::path::PathBuf;

/// Default directory for cached repository indexes
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("/var/cache"))
        .join("strata")
        .join("indexes")
}

/// Default directory for downloaded artifacts
pub fn default_artifact_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("/var/cache"))
        .join("strata")
        .join("artifacts")
}

/// Default path of the installed-packages database
pub fn default_state_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("/var/lib"))
        .join("strata")
        .join("installed.json")
}

/// Default directory for registered lifecycle hook scripts
pub fn default_hooks_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("/var/lib"))
        .join("strata")
        .join("hooks")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_end_in_expected_leaves() {
        assert!(default_cache_dir().ends_with("strata/indexes"));
        assert!(default_artifact_dir().ends_with("strata/artifacts"));
        assert!(default_state_path().ends_with("strata/installed.json"));
        assert!(default_hooks_dir().ends_with("strata/hooks"));
    }
}
