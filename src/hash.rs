// src/hash.rs

//! SHA-256 hashing for artifact and manifest integrity
//!
//! All checksums in the repository index, the download pipeline, and the
//! per-file archive manifest are SHA-256 hex digests. Comparison is
//! case-insensitive: upstream indexes disagree on hex casing.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Buffer size for streaming hash computation (64 KB)
const HASH_BUFFER_SIZE: usize = 65536;

/// Details of a failed checksum comparison
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumMismatch {
    pub expected: String,
    pub actual: String,
}

/// Compute the SHA-256 hex digest of a byte slice
pub fn sha256(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// Compute the SHA-256 hex digest of everything in a reader
pub fn sha256_reader<R: Read>(reader: &mut R) -> io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; HASH_BUFFER_SIZE];

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Compute the SHA-256 hex digest of a file on disk
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    sha256_reader(&mut file)
}

/// Compare two hex digests, ignoring case
pub fn digests_equal(expected: &str, actual: &str) -> bool {
    expected.eq_ignore_ascii_case(actual)
}

/// Verify a file's SHA-256 digest against an expected hex string
///
/// Returns the `{expected, actual}` pair on mismatch so callers can report
/// both sides of the comparison.
pub fn verify_file_sha256(
    path: &Path,
    expected: &str,
) -> io::Result<std::result::Result<(), ChecksumMismatch>> {
    let actual = sha256_file(path)?;
    if digests_equal(expected, &actual) {
        Ok(Ok(()))
    } else {
        Ok(Err(ChecksumMismatch {
            expected: expected.to_string(),
            actual,
        }))
    }
}
