//! Hashing utilities for the ledger
//!
//! Provides SHA-256 based hashing used for block hashes, transaction IDs
//! and signing payloads, plus the hex-digit proof-of-work check.

use sha2::{Digest, Sha256};

/// Computes SHA-256 hash of the input data
pub fn sha256(data: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

/// Computes SHA-256 hash and returns it as a lowercase hex string
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// Checks a hex digest against a leading-zero target.
///
/// Succeeds iff the `zero_count` hex characters starting at `offset` are
/// all `'0'`. A digest too short to cover the window never matches.
pub fn meets_target(hash_hex: &str, zero_count: usize, offset: usize) -> bool {
    let bytes = hash_hex.as_bytes();
    let window = offset
        .checked_add(zero_count)
        .and_then(|end| bytes.get(offset..end));
    match window {
        Some(window) => window.iter().all(|c| *c == b'0'),
        None => false,
    }
}
