//! Blockchain implementation
//!
//! An append-only, in-memory sequence of blocks, genesis first. Every
//! candidate block is checked for linkage, transaction validity, double
//! spends and proof of work before it is appended; a rejected block leaves
//! the chain untouched.

use crate::core::block::{Block, PowTarget};
use crate::core::transaction::{BlockTransaction, Coinbase, OutPoint, TransactionError, Utxo};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Block reward in coins
pub const BLOCK_REWARD: u64 = 50;

/// Blockchain-related errors
#[derive(Error, Debug)]
pub enum BlockchainError {
    #[error("Chain has no blocks")]
    EmptyChain,
    #[error("Previous hash mismatch: expected {expected}, got {actual}")]
    ChainLinkage { expected: String, actual: String },
    #[error("Double spend: {0} is not an unspent output")]
    DoubleSpend(OutPoint),
    #[error("Invalid transaction {tx_id}: {source}")]
    InvalidTransaction {
        tx_id: String,
        #[source]
        source: TransactionError,
    },
    #[error("Invalid coinbase: {0}")]
    InvalidCoinbase(String),
    #[error("Block hash {0} does not meet the proof-of-work target")]
    InvalidProofOfWork(String),
    #[error("Genesis block does not match the chain parameters")]
    GenesisMismatch,
}

/// Value minted to one key by the genesis block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisAllocation {
    pub public_key: String,
    pub amount: u64,
}

/// Protocol parameters fixed for the lifetime of a chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainParams {
    pub pow: PowTarget,
    pub block_reward: u64,
    pub genesis: Option<GenesisAllocation>,
}

impl Default for ChainParams {
    fn default() -> Self {
        Self {
            pow: PowTarget::default(),
            block_reward: BLOCK_REWARD,
            genesis: None,
        }
    }
}

impl ChainParams {
    fn genesis_block(&self) -> Block {
        Block::genesis(
            self.genesis
                .as_ref()
                .map(|g| Coinbase::new(&g.public_key, g.amount, 0)),
        )
    }
}

/// The main blockchain structure
#[derive(Debug, Clone)]
pub struct Blockchain {
    blocks: Vec<Block>,
    params: ChainParams,
    /// Unspent outputs keyed by outpoint, maintained block by block
    utxo_index: HashMap<OutPoint, Utxo>,
}

impl Blockchain {
    /// Create a new blockchain with its genesis block
    pub fn new(params: ChainParams) -> Self {
        let genesis = params.genesis_block();
        let mut blockchain = Self {
            blocks: vec![genesis],
            params,
            utxo_index: HashMap::new(),
        };
        blockchain.rebuild_utxo_index();
        blockchain
    }

    /// Create a blockchain with default parameters and a custom difficulty
    pub fn with_difficulty(zero_count: usize) -> Self {
        let mut params = ChainParams::default();
        params.pow.zero_count = zero_count;
        Self::new(params)
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Number of blocks including genesis
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Height of the topmost block (genesis is 0)
    pub fn height(&self) -> u64 {
        self.blocks.len().saturating_sub(1) as u64
    }

    /// Get a block by height
    pub fn get_block(&self, height: u64) -> Option<&Block> {
        self.blocks.get(height as usize)
    }

    /// Get the latest block
    pub fn get_topmost_block(&self) -> Result<&Block, BlockchainError> {
        self.blocks.last().ok_or(BlockchainError::EmptyChain)
    }

    // =========================================================================
    // UTXO queries
    // =========================================================================

    /// Unspent outputs owned by `owner`, in chain order.
    ///
    /// Replays every transaction: consumed inputs leave the candidate set,
    /// then matching outputs join it.
    pub fn get_utxos(&self, owner: &str) -> Vec<Utxo> {
        let mut utxos: Vec<Utxo> = Vec::new();

        for block in &self.blocks {
            for tx in block.transactions() {
                for input in tx.inputs() {
                    utxos.retain(|u| u.outpoint() != input.outpoint());
                }
                utxos.extend(tx.outputs().into_iter().filter(|u| u.is_owned_by(owner)));
            }
        }

        utxos
    }

    /// True iff `utxo` is a recorded output that is still unspent
    pub fn is_valid_utxo(&self, utxo: &Utxo) -> bool {
        self.utxo_index.get(&utxo.outpoint()) == Some(utxo)
    }

    /// Get balance for a public key
    pub fn get_balance(&self, owner: &str) -> u64 {
        self.get_utxos(owner)
            .iter()
            .filter(|utxo| self.is_valid_utxo(utxo))
            .fold(0u64, |acc, utxo| acc.saturating_add(utxo.amount))
    }

    // =========================================================================
    // Block insertion
    // =========================================================================

    /// Validate and append a block.
    ///
    /// Checks, in order: linkage to the topmost block, the coinbase and
    /// every transfer against the pre-insertion UTXO set, then the
    /// proof-of-work target. Nothing is modified on failure.
    pub fn insert_block(&mut self, candidate: Block) -> Result<(), BlockchainError> {
        let expected = self.get_topmost_block()?.hash();
        if candidate.previous_hash() != expected {
            return Err(BlockchainError::ChainLinkage {
                expected,
                actual: candidate.previous_hash().to_string(),
            });
        }

        self.validate_transactions(&candidate)?;

        let hash = candidate.hash();
        if !self.params.pow.is_met_by(&hash) {
            return Err(BlockchainError::InvalidProofOfWork(hash));
        }

        Self::apply_block(&mut self.utxo_index, &candidate);
        self.blocks.push(candidate);

        info!(
            "Block {} accepted at height {} ({} transactions)",
            &hash[..16],
            self.height(),
            self.blocks.last().map(|b| b.tx_count()).unwrap_or_default()
        );

        Ok(())
    }

    fn validate_transactions(&self, block: &Block) -> Result<(), BlockchainError> {
        let height = self.blocks.len() as u64;
        let transactions = block.transactions();

        match transactions.first() {
            Some(BlockTransaction::Coinbase(cb)) => {
                if cb.amount != self.params.block_reward {
                    return Err(BlockchainError::InvalidCoinbase(format!(
                        "reward {} differs from protocol reward {}",
                        cb.amount, self.params.block_reward
                    )));
                }
                if cb.height != height {
                    return Err(BlockchainError::InvalidCoinbase(format!(
                        "coinbase height {} for block at height {}",
                        cb.height, height
                    )));
                }
            }
            _ => {
                return Err(BlockchainError::InvalidCoinbase(
                    "first transaction must be a coinbase".to_string(),
                ))
            }
        }

        let mut spent_in_block = HashSet::new();
        for entry in &transactions[1..] {
            let tx = entry.as_transfer().ok_or_else(|| {
                BlockchainError::InvalidCoinbase("more than one coinbase".to_string())
            })?;

            tx.validate()
                .map_err(|source| BlockchainError::InvalidTransaction {
                    tx_id: tx.id(),
                    source,
                })?;

            for input in tx.inputs() {
                if !spent_in_block.insert(input.outpoint()) || !self.is_valid_utxo(input) {
                    debug!("Rejecting spend of {}", input.outpoint());
                    return Err(BlockchainError::DoubleSpend(input.outpoint()));
                }
            }
        }

        Ok(())
    }

    fn apply_block(index: &mut HashMap<OutPoint, Utxo>, block: &Block) {
        for tx in block.transactions() {
            for input in tx.inputs() {
                index.remove(&input.outpoint());
            }
            for output in tx.outputs() {
                index.insert(output.outpoint(), output);
            }
        }
    }

    /// Rebuild the UTXO index from the blocks
    fn rebuild_utxo_index(&mut self) {
        self.utxo_index.clear();
        for block in &self.blocks {
            Self::apply_block(&mut self.utxo_index, block);
        }
    }

    // =========================================================================
    // Whole-chain checks and inspection
    // =========================================================================

    /// Re-validate the entire chain by replaying it onto a fresh genesis
    pub fn validate_chain(&self) -> Result<(), BlockchainError> {
        let (genesis, rest) = self
            .blocks
            .split_first()
            .ok_or(BlockchainError::EmptyChain)?;
        if *genesis != self.params.genesis_block() {
            return Err(BlockchainError::GenesisMismatch);
        }

        let mut replay = Self::new(self.params.clone());
        for block in rest {
            replay.insert_block(block.clone())?;
        }
        Ok(())
    }

    /// Validate the entire chain
    pub fn is_valid(&self) -> bool {
        self.validate_chain().is_ok()
    }

    /// Read-only JSON view of the chain for inspection
    pub fn get_json(&self) -> Value {
        let blocks: Vec<Value> = self
            .blocks
            .iter()
            .enumerate()
            .map(|(height, block)| {
                let transactions: Vec<Value> = block
                    .transactions()
                    .iter()
                    .map(|tx| json!({ "id": tx.id(), "body": tx }))
                    .collect();
                json!({
                    "height": height,
                    "hash": block.hash(),
                    "previous_hash": block.previous_hash(),
                    "nonce": block.nonce(),
                    "transactions": transactions,
                })
            })
            .collect();

        json!({
            "length": self.blocks.len(),
            "params": self.params,
            "blocks": blocks,
        })
    }

    /// Get chain statistics
    pub fn stats(&self) -> ChainStats {
        ChainStats {
            height: self.height(),
            total_blocks: self.blocks.len() as u64,
            total_transactions: self.blocks.iter().map(|b| b.tx_count() as u64).sum(),
            total_coins: self
                .utxo_index
                .values()
                .fold(0u64, |acc, u| acc.saturating_add(u.amount)),
            latest_hash: self.blocks.last().map(|b| b.hash()).unwrap_or_default(),
        }
    }
}

impl Default for Blockchain {
    fn default() -> Self {
        Self::new(ChainParams::default())
    }
}

/// Chain statistics
#[derive(Debug, Clone, Serialize)]
pub struct ChainStats {
    pub height: u64,
    pub total_blocks: u64,
    pub total_transactions: u64,
    pub total_coins: u64,
    pub latest_hash: String,
}
