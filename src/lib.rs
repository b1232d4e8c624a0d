//! UTXO Ledger: a single-node proof-of-work ledger in Rust
//!
//! This crate provides:
//! - UTXO transactions signed with password-sealed secp256k1 keys
//! - A hash-linked blockchain that rejects double spends
//! - A mempool with lazy purging at block assembly
//! - A random-nonce proof-of-work miner with cancellable budgets
//! - An async application context for serving submissions
//!
//! # Example
//!
//! ```rust
//! use utxo_ledger::core::Blockchain;
//! use utxo_ledger::mining::{Mempool, Miner, MiningBudget};
//!
//! // Create a new blockchain
//! let mut blockchain = Blockchain::with_difficulty(1);
//! let mut mempool = Mempool::new();
//!
//! // Mine a block
//! let mut miner = Miner::new("miner_public_key");
//! let outcome = miner
//!     .mine_once(&mut blockchain, &mut mempool, &MiningBudget::unbounded())
//!     .unwrap();
//! println!("Mined in {} attempts", outcome.stats().attempts);
//!
//! // Check balance
//! assert_eq!(blockchain.get_balance("miner_public_key"), 50);
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod crypto;
pub mod mining;
pub mod service;
pub mod wallet;

// Re-export commonly used types
pub use config::{ConfigError, LedgerConfig, MiningConfig};
pub use core::{
    Block, Blockchain, BlockchainError, ChainParams, Coinbase, PowTarget, Transaction,
    UnsignedTransaction, Utxo, BLOCK_REWARD,
};
pub use crypto::{derive_public_key, generate_sealed_key, KeyPair};
pub use mining::{Mempool, MineOutcome, Miner, MiningBudget};
pub use service::{LedgerContext, LedgerError};
pub use wallet::Wallet;
