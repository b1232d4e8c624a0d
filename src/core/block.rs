//! Block implementation for the ledger
//!
//! A block links to its predecessor by hash, carries an ordered list of
//! transactions (coinbase first) and the nonce found by the miner.

use crate::core::transaction::{BlockTransaction, Coinbase};
use crate::crypto::{meets_target, sha256_hex, transactions_root};
use serde::{Deserialize, Serialize};

// =============================================================================
// Proof-of-Work Target
// =============================================================================

/// Default number of hex characters that must be `'0'`
pub const DEFAULT_TARGET_ZERO_COUNT: usize = 4;

/// Default position of the first checked hex character.
///
/// The first hex character is skipped, so the default window is
/// characters `1..=4` of the digest.
pub const DEFAULT_TARGET_OFFSET: usize = 1;

/// Previous-hash value carried by the genesis block
pub const GENESIS_PREVIOUS_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// Leading-zero difficulty rule on a block's hex hash
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PowTarget {
    /// Number of hex characters that must be `'0'`
    pub zero_count: usize,
    /// Index of the first checked character
    pub offset: usize,
}

impl PowTarget {
    pub fn new(zero_count: usize, offset: usize) -> Self {
        Self { zero_count, offset }
    }

    /// Check a hex digest against this target
    pub fn is_met_by(&self, hash_hex: &str) -> bool {
        meets_target(hash_hex, self.zero_count, self.offset)
    }

    /// Chance a single random nonce succeeds: `16^-zero_count`
    pub fn success_probability(&self) -> f64 {
        i32::try_from(self.zero_count)
            .map(|n| 16f64.powi(-n))
            .unwrap_or(0.0)
    }

    /// Mean of the geometric distribution of attempts per block
    pub fn expected_attempts(&self) -> f64 {
        1.0 / self.success_probability()
    }
}

impl Default for PowTarget {
    fn default() -> Self {
        Self::new(DEFAULT_TARGET_ZERO_COUNT, DEFAULT_TARGET_OFFSET)
    }
}

// =============================================================================
// Block Header
// =============================================================================

/// Everything a block hash commits to except the nonce
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    /// Hash of the previous block
    pub previous_hash: String,
    /// Merkle root of all transaction ids
    pub transactions_root: String,
    /// Number of transactions in the block
    pub tx_count: usize,
}

impl BlockHeader {
    pub fn for_transactions(previous_hash: &str, transactions: &[BlockTransaction]) -> Self {
        let ids: Vec<String> = transactions.iter().map(|tx| tx.id()).collect();
        Self {
            previous_hash: previous_hash.to_string(),
            transactions_root: transactions_root(&ids),
            tx_count: transactions.len(),
        }
    }

    /// Hash of the header combined with a nonce
    pub fn hash(&self, nonce: u64) -> String {
        let data = format!(
            "{}:{}:{}:{}",
            self.previous_hash, self.transactions_root, self.tx_count, nonce
        );
        sha256_hex(data.as_bytes())
    }
}

// =============================================================================
// Block
// =============================================================================

/// A block in the chain; immutable once constructed, identified by its hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    previous_hash: String,
    transactions: Vec<BlockTransaction>,
    nonce: u64,
}

impl Block {
    pub fn new(previous_hash: &str, transactions: Vec<BlockTransaction>, nonce: u64) -> Self {
        Self {
            previous_hash: previous_hash.to_string(),
            transactions,
            nonce,
        }
    }

    /// Create the genesis block, optionally minting an initial allocation
    pub fn genesis(allocation: Option<Coinbase>) -> Self {
        let transactions = allocation.map(BlockTransaction::Coinbase).into_iter().collect();
        Self::new(GENESIS_PREVIOUS_HASH, transactions, 0)
    }

    pub fn previous_hash(&self) -> &str {
        &self.previous_hash
    }

    pub fn transactions(&self) -> &[BlockTransaction] {
        &self.transactions
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn header(&self) -> BlockHeader {
        BlockHeader::for_transactions(&self.previous_hash, &self.transactions)
    }

    /// Deterministic digest over the whole block
    pub fn hash(&self) -> String {
        self.header().hash(self.nonce)
    }

    /// Check if the proof of work is valid
    pub fn is_valid_pow(&self, target: &PowTarget) -> bool {
        target.is_met_by(&self.hash())
    }

    /// Get the coinbase transaction (first transaction)
    pub fn coinbase(&self) -> Option<&Coinbase> {
        self.transactions.first().and_then(|tx| tx.as_coinbase())
    }

    /// Get number of transactions in this block
    pub fn tx_count(&self) -> usize {
        self.transactions.len()
    }
}
