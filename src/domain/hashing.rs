//! Shared SHA-256 hex digest helpers.

use sha2::{Digest, Sha256};

/// Computes the lowercase SHA-256 hex digest of `data`.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    let hash = Sha256::digest(data);
    format!("{hash:x}")
}

/// Returns the first `len` hex characters of the SHA-256 digest of `data`.
///
/// `len` is clamped to the 64 characters a full digest provides.
#[must_use]
pub fn sha256_hex_prefix(data: &[u8], len: usize) -> String {
    let mut hex = sha256_hex(data);
    hex.truncate(len.min(64));
    hex
}
