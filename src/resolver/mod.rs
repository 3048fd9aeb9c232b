// src/resolver/mod.rs

//! Platform-aware artifact selection
//!
//! Given the candidate descriptors for one name, the resolver scores each
//! against the target platform, discards incompatible candidates, and
//! returns the best match. "any" (or an empty string) is the wildcard value
//! on either side of the comparison.
//!
//! Selection criteria (in order of priority):
//! 1. Platform score (exact match beats wildcard match)
//! 2. Version (highest; semver comparison, lexicographic fallback)
//! 3. Input order (stable tie-breaker; callers supply candidates
//!    higher-priority-repository-first, then in index declaration order)

use std::cmp::Ordering;
use tracing::debug;

use crate::error::{Error, Result};
use crate::index::ArtifactDescriptor;

/// How well a descriptor's platform fields fit the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PlatformScore {
    /// Incompatible: a concrete OS or arch differs from the target
    NoMatch,
    /// Compatible through a wildcard on either side
    AnyMatch,
    /// OS and arch both equal the target exactly
    ExactMatch,
}

/// Check whether a platform field is the wildcard value
fn is_any(value: &str) -> bool {
    value.is_empty() || value == "any"
}

/// Score one descriptor against the target platform
pub fn score_platform(
    descriptor: &ArtifactDescriptor,
    target_os: &str,
    target_arch: &str,
) -> PlatformScore {
    let os_wild = is_any(&descriptor.os) || is_any(target_os);
    let arch_wild = is_any(&descriptor.arch) || is_any(target_arch);

    if !os_wild && descriptor.os != target_os {
        return PlatformScore::NoMatch;
    }
    if !arch_wild && descriptor.arch != target_arch {
        return PlatformScore::NoMatch;
    }

    if !os_wild && !arch_wild {
        PlatformScore::ExactMatch
    } else {
        PlatformScore::AnyMatch
    }
}

/// Compare version strings
///
/// Semver comparison when both sides parse, lexicographic otherwise.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    match (semver::Version::parse(a), semver::Version::parse(b)) {
        (Ok(va), Ok(vb)) => va.cmp(&vb),
        _ => a.cmp(b),
    }
}

/// Check a version against a constraint string
///
/// Empty, "any", and "*" match everything. Otherwise an exact string match
/// or, when the constraint parses as a semver requirement, a semver match.
pub fn matches_constraint(version: &str, constraint: &str) -> bool {
    if constraint.is_empty() || constraint == "any" || constraint == "*" {
        return true;
    }
    if version == constraint {
        return true;
    }
    if let (Ok(req), Ok(ver)) = (
        semver::VersionReq::parse(constraint),
        semver::Version::parse(version),
    ) {
        return req.matches(&ver);
    }
    false
}

/// Select the best-matching descriptor for the target platform
///
/// Fails with [`Error::NoCandidates`] on an empty input list and
/// [`Error::NotFound`] when every candidate scores [`PlatformScore::NoMatch`].
pub fn resolve(
    descriptors: &[ArtifactDescriptor],
    target_os: &str,
    target_arch: &str,
) -> Result<ArtifactDescriptor> {
    if descriptors.is_empty() {
        return Err(Error::NoCandidates);
    }

    let mut candidates: Vec<(PlatformScore, &ArtifactDescriptor)> = descriptors
        .iter()
        .map(|d| (score_platform(d, target_os, target_arch), d))
        .filter(|(score, _)| *score != PlatformScore::NoMatch)
        .collect();

    if candidates.is_empty() {
        return Err(Error::NotFound(format!(
            "{} for {}/{}",
            descriptors[0].name, target_os, target_arch
        )));
    }

    // Stable sort: equal (score, version) pairs keep input order, which
    // encodes repository priority and index declaration order.
    candidates.sort_by(|a, b| {
        b.0.cmp(&a.0)
            .then_with(|| compare_versions(&b.1.version, &a.1.version))
    });

    let selected = candidates[0].1;
    debug!(
        "Resolved {} {} ({:?}) for {}/{}",
        selected.name, selected.version, candidates[0].0, target_os, target_arch
    );

    Ok(selected.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn descriptor(name: &str, version: &str, os: &str, arch: &str) -> ArtifactDescriptor {
        ArtifactDescriptor {
            name: name.to_string(),
            version: version.to_string(),
            description: String::new(),
            url: format!("https://repo.example.com/{name}-{version}-{os}-{arch}.tgz"),
            checksum: "cd".repeat(32),
            size: 0,
            os: os.to_string(),
            arch: arch.to_string(),
            dependencies: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn test_score_exact() {
        let d = descriptor("demo", "1.0.0", "linux", "amd64");
        assert_eq!(score_platform(&d, "linux", "amd64"), PlatformScore::ExactMatch);
    }

    #[test]
    fn test_score_wildcard() {
        let d = descriptor("demo", "1.0.0", "", "");
        assert_eq!(score_platform(&d, "linux", "amd64"), PlatformScore::AnyMatch);

        let d = descriptor("demo", "1.0.0", "any", "any");
        assert_eq!(score_platform(&d, "linux", "amd64"), PlatformScore::AnyMatch);

        // Wildcard target matches a concrete descriptor
        let d = descriptor("demo", "1.0.0", "linux", "amd64");
        assert_eq!(score_platform(&d, "", ""), PlatformScore::AnyMatch);
    }

    #[test]
    fn test_score_partial_wildcard_is_any() {
        let d = descriptor("demo", "1.0.0", "linux", "any");
        assert_eq!(score_platform(&d, "linux", "amd64"), PlatformScore::AnyMatch);
    }

    #[test]
    fn test_score_mismatch() {
        let d = descriptor("demo", "1.0.0", "darwin", "amd64");
        assert_eq!(score_platform(&d, "linux", "amd64"), PlatformScore::NoMatch);

        let d = descriptor("demo", "1.0.0", "linux", "arm64");
        assert_eq!(score_platform(&d, "linux", "amd64"), PlatformScore::NoMatch);
    }

    #[test]
    fn test_resolve_empty_is_no_candidates() {
        assert!(matches!(resolve(&[], "linux", "amd64"), Err(Error::NoCandidates)));
    }

    #[test]
    fn test_resolve_all_incompatible_is_not_found() {
        let descriptors = vec![
            descriptor("demo", "1.0.0", "darwin", "arm64"),
            descriptor("demo", "1.0.0", "windows", "amd64"),
        ];
        assert!(matches!(
            resolve(&descriptors, "linux", "amd64"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_exact_beats_any() {
        let descriptors = vec![
            descriptor("demo", "1.0.0", "any", "any"),
            descriptor("demo", "1.0.0", "", ""),
            descriptor("demo", "1.0.0", "linux", "amd64"),
            descriptor("demo", "1.0.0", "any", "amd64"),
        ];

        let selected = resolve(&descriptors, "linux", "amd64").unwrap();
        assert_eq!(selected.os, "linux");
        assert_eq!(selected.arch, "amd64");
    }

    #[test]
    fn test_highest_version_wins_among_equal_scores() {
        let descriptors = vec![
            descriptor("demo", "1.2.0", "linux", "amd64"),
            descriptor("demo", "1.10.0", "linux", "amd64"),
            descriptor("demo", "1.9.3", "linux", "amd64"),
        ];

        let selected = resolve(&descriptors, "linux", "amd64").unwrap();
        // Semver comparison, not lexicographic: 1.10.0 > 1.9.3
        assert_eq!(selected.version, "1.10.0");
    }

    #[test]
    fn test_input_order_breaks_exact_ties() {
        // Same score, same version: the earlier candidate (higher-priority
        // repository or earlier index declaration) wins.
        let mut first = descriptor("demo", "1.0.0", "linux", "amd64");
        first.url = "https://primary/demo.tgz".to_string();
        let mut second = descriptor("demo", "1.0.0", "linux", "amd64");
        second.url = "https://mirror/demo.tgz".to_string();

        let selected = resolve(&[first.clone(), second], "linux", "amd64").unwrap();
        assert_eq!(selected.url, first.url);
    }

    #[test]
    fn test_matches_constraint() {
        assert!(matches_constraint("1.2.3", ""));
        assert!(matches_constraint("1.2.3", "any"));
        assert!(matches_constraint("1.2.3", "*"));
        assert!(matches_constraint("1.2.3", "1.2.3"));
        assert!(matches_constraint("1.2.3", "^1.0"));
        assert!(matches_constraint("1.2.3", ">=1.2, <2.0"));
        assert!(!matches_constraint("2.0.0", "^1.0"));
        // Non-semver versions fall back to exact equality
        assert!(matches_constraint("2024.06", "2024.06"));
        assert!(!matches_constraint("2024.06", "2024.07"));
    }

    #[test]
    fn test_compare_versions_semver_and_fallback() {
        assert_eq!(compare_versions("1.10.0", "1.9.0"), Ordering::Greater);
        assert_eq!(compare_versions("abc", "abd"), Ordering::Less);
    }
}
