//! Core ledger components
//!
//! This module contains the fundamental building blocks:
//! - Transactions (UTXO inputs, receivers, amounts, one signature)
//! - Blocks (hash-linked, with a nonce for proof of work)
//! - Blockchain (validation, UTXO derivation and indexing)

pub mod block;
pub mod blockchain;
pub mod transaction;

pub use block::{
    Block, BlockHeader, PowTarget, DEFAULT_TARGET_OFFSET, DEFAULT_TARGET_ZERO_COUNT,
    GENESIS_PREVIOUS_HASH,
};
pub use blockchain::{
    Blockchain, BlockchainError, ChainParams, ChainStats, GenesisAllocation, BLOCK_REWARD,
};
pub use transaction::{
    BlockTransaction, Coinbase, OutPoint, Transaction, TransactionError, UnsignedTransaction,
    Utxo,
};
