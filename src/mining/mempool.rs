//! Transaction pool (mempool) for pending transactions
//!
//! Holds signed transfers that passed validation on admission and are
//! waiting to be mined. Entries are not checked against the UTXO set or
//! against each other here: two pending transactions may spend the same
//! output, and the miner resolves that lazily when it assembles a block.

use crate::core::{Transaction, TransactionError};
use chrono::{DateTime, Utc};
use log::debug;
use serde::Serialize;
use std::collections::HashSet;
use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// Mempool errors
#[derive(Error, Debug)]
pub enum MempoolError {
    #[error("Transaction validation error: {0}")]
    ValidationError(#[from] TransactionError),
}

// =============================================================================
// Mempool Entry
// =============================================================================

/// Entry in the mempool with metadata
#[derive(Debug, Clone)]
pub struct MempoolEntry {
    /// Transaction id at admission time
    pub id: String,
    /// The transaction
    pub tx: Transaction,
    /// When the transaction was admitted
    pub received_at: DateTime<Utc>,
}

impl MempoolEntry {
    pub fn new(tx: Transaction) -> Self {
        Self {
            id: tx.id(),
            tx,
            received_at: Utc::now(),
        }
    }
}

// =============================================================================
// Mempool
// =============================================================================

/// Memory pool for pending transactions, in arrival order
#[derive(Debug, Default)]
pub struct Mempool {
    entries: Vec<MempoolEntry>,
}

impl Mempool {
    /// Create a new mempool
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a transaction if it is valid on its own.
    ///
    /// Returns the transaction id. Identical resubmissions are admitted
    /// again; the pool is a multiset.
    pub fn insert_transaction(&mut self, tx: Transaction) -> Result<String, MempoolError> {
        tx.validate()?;

        let entry = MempoolEntry::new(tx);
        let id = entry.id.clone();
        debug!("Mempool admitted {}", id);
        self.entries.push(entry);
        Ok(id)
    }

    /// Snapshot of the pending transactions in arrival order
    pub fn pending(&self) -> Vec<Transaction> {
        self.entries.iter().map(|e| e.tx.clone()).collect()
    }

    pub fn entries(&self) -> &[MempoolEntry] {
        &self.entries
    }

    /// Remove every entry matching `predicate`; returns how many went
    pub fn purge<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(&MempoolEntry) -> bool,
    {
        let before = self.entries.len();
        self.entries.retain(|entry| !predicate(entry));
        before - self.entries.len()
    }

    /// Remove transactions that are now in a block
    pub fn remove_included(&mut self, tx_ids: &[String]) -> usize {
        let included: HashSet<&str> = tx_ids.iter().map(String::as_str).collect();
        self.purge(|entry| included.contains(entry.id.as_str()))
    }

    /// Check if a transaction is in the pool
    pub fn contains(&self, id: &str) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    /// Get the number of pending transactions
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the pool is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clear all transactions
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Get mempool statistics
    pub fn stats(&self) -> MempoolStats {
        MempoolStats {
            tx_count: self.entries.len(),
            total_output: self
                .entries
                .iter()
                .filter_map(|e| e.tx.total_output().ok())
                .fold(0u64, u64::saturating_add),
            oldest: self.entries.iter().map(|e| e.received_at).min(),
        }
    }
}

/// Mempool statistics
#[derive(Debug, Clone, Serialize)]
pub struct MempoolStats {
    pub tx_count: usize,
    pub total_output: u64,
    pub oldest: Option<DateTime<Utc>>,
}
