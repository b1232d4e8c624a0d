//! Application context
//!
//! Owns the chain and the mempool behind async locks and exposes the
//! submission operations a front end needs. Writers always take the chain
//! lock before the mempool lock. The nonce search runs on a blocking
//! thread with no lock held, so reads and submissions proceed meanwhile.

use crate::config::{ConfigError, LedgerConfig, MiningConfig};
use crate::core::{Blockchain, BlockchainError, ChainStats, Transaction, TransactionError, Utxo};
use crate::crypto::KeyError;
use crate::mining::miner::log_mined;
use crate::mining::{
    search, MempoolError, MineOutcome, Mempool, MempoolStats, Miner, MinerState, MiningError,
    Submission,
};
use crate::wallet::{Wallet, WalletError};
use log::info;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// Any failure surfaced by the ledger's public operations
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error(transparent)]
    Transaction(#[from] TransactionError),
    #[error(transparent)]
    Blockchain(#[from] BlockchainError),
    #[error(transparent)]
    Mempool(#[from] MempoolError),
    #[error(transparent)]
    Mining(#[from] MiningError),
    #[error(transparent)]
    Wallet(#[from] WalletError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Mining task failed: {0}")]
    TaskFailed(String),
}

/// Shared handle to one ledger; clones refer to the same chain and pool
#[derive(Clone)]
pub struct LedgerContext {
    blockchain: Arc<RwLock<Blockchain>>,
    mempool: Arc<RwLock<Mempool>>,
    mining: MiningConfig,
    stop: Arc<AtomicBool>,
}

impl LedgerContext {
    /// Build a fresh ledger with its genesis block
    pub fn new(config: LedgerConfig) -> Self {
        Self::from_parts(Blockchain::new(config.chain), Mempool::new(), config.mining)
    }

    pub fn from_parts(blockchain: Blockchain, mempool: Mempool, mining: MiningConfig) -> Self {
        Self {
            blockchain: Arc::new(RwLock::new(blockchain)),
            mempool: Arc::new(RwLock::new(mempool)),
            mining,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn blockchain(&self) -> Arc<RwLock<Blockchain>> {
        Arc::clone(&self.blockchain)
    }

    pub fn mempool(&self) -> Arc<RwLock<Mempool>> {
        Arc::clone(&self.mempool)
    }

    // =========================================================================
    // Submission
    // =========================================================================

    /// Admit a signed transaction to the mempool, returning its id
    pub async fn submit_transaction(&self, tx: Transaction) -> Result<String, LedgerError> {
        let id = self.mempool.write().await.insert_transaction(tx)?;
        info!("Transaction {} accepted into mempool", id);
        Ok(id)
    }

    /// Build a transfer from `wallet` and submit it
    pub async fn transfer(
        &self,
        wallet: &Wallet,
        receivers: Vec<String>,
        amounts: Vec<u64>,
    ) -> Result<String, LedgerError> {
        let tx = {
            let chain = self.blockchain.read().await;
            wallet.create_transaction(&chain, receivers, amounts)?
        };
        self.submit_transaction(tx).await
    }

    /// Run one mining round paying the reward to `reward_public_key`.
    ///
    /// A block found on a tip that moved in the meantime is discarded and
    /// the round starts again from assembly.
    pub async fn mine_once(&self, reward_public_key: &str) -> Result<MineOutcome, LedgerError> {
        let mut miner = Miner::new(reward_public_key).with_max_restarts(self.mining.max_restarts);

        for _ in 0..=miner.max_restarts {
            let (candidate, target) = {
                let chain = self.blockchain.read().await;
                let mut mempool = self.mempool.write().await;
                (miner.assemble(&chain, &mut mempool)?, chain.params().pow)
            };

            miner.transition(MinerState::Searching);
            let budget = self.mining.budget(Arc::clone(&self.stop));
            let search_candidate = candidate.clone();
            let outcome =
                tokio::task::spawn_blocking(move || search(&search_candidate, &target, &budget))
                    .await
                    .map_err(|e| LedgerError::TaskFailed(e.to_string()))?;

            let (block, stats) = match outcome {
                MineOutcome::Mined { block, stats } => (block, stats),
                other => {
                    miner.transition(MinerState::Idle);
                    return Ok(other);
                }
            };

            let mut chain = self.blockchain.write().await;
            let mut mempool = self.mempool.write().await;
            if miner.submit(&mut chain, &mut mempool, &candidate, block.clone())?
                == Submission::Accepted
            {
                log_mined(&candidate, &stats);
                return Ok(MineOutcome::Mined { block, stats });
            }
        }

        Err(MiningError::TooManyRestarts(miner.max_restarts).into())
    }

    /// Cancel running searches and make new rounds return immediately
    pub fn stop_mining(&self) {
        self.stop.store(true, Ordering::Relaxed);
        info!("Mining stopped");
    }

    pub fn resume_mining(&self) {
        self.stop.store(false, Ordering::Relaxed);
        info!("Mining resumed");
    }

    pub fn is_mining_stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Sum of the valid outputs owned by `public_key`
    pub async fn get_balance(&self, public_key: &str) -> u64 {
        self.blockchain.read().await.get_balance(public_key)
    }

    pub async fn get_utxos(&self, public_key: &str) -> Vec<Utxo> {
        self.blockchain.read().await.get_utxos(public_key)
    }

    pub async fn height(&self) -> u64 {
        self.blockchain.read().await.height()
    }

    pub async fn chain_json(&self) -> Value {
        self.blockchain.read().await.get_json()
    }

    pub async fn chain_stats(&self) -> ChainStats {
        self.blockchain.read().await.stats()
    }

    pub async fn mempool_stats(&self) -> MempoolStats {
        self.mempool.read().await.stats()
    }
}
