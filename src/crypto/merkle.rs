//! Merkle root over transaction ids
//!
//! A block's hash commits to its transactions through this root, so the
//! proof-of-work search only rehashes a short header per nonce.

use super::hash::sha256;

/// Calculate the merkle root from a list of leaf hashes
pub fn calculate_merkle_root(hashes: &[Vec<u8>]) -> Vec<u8> {
    if hashes.is_empty() {
        return sha256(b"");
    }

    let mut current_level: Vec<Vec<u8>> = hashes.to_vec();

    while current_level.len() > 1 {
        let mut next_level = Vec::with_capacity(current_level.len().div_ceil(2));

        for chunk in current_level.chunks(2) {
            // Odd levels pair the last hash with itself
            let right = chunk.get(1).unwrap_or(&chunk[0]);
            let mut data = chunk[0].clone();
            data.extend_from_slice(right);
            next_level.push(sha256(&data));
        }

        current_level = next_level;
    }

    current_level.remove(0)
}

/// Merkle root of transaction ids, hex encoded.
///
/// Leaves are the SHA-256 of each id string, so any id text is accepted.
pub fn transactions_root(tx_ids: &[String]) -> String {
    let leaves: Vec<Vec<u8>> = tx_ids.iter().map(|id| sha256(id.as_bytes())).collect();
    hex::encode(calculate_merkle_root(&leaves))
}
