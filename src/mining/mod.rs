//! Mining module for block creation and transaction pooling

pub mod mempool;
pub mod miner;

pub use mempool::{Mempool, MempoolEntry, MempoolError, MempoolStats};
pub use miner::{
    search, Candidate, MineOutcome, Miner, MinerState, MiningBudget, MiningError, MiningStats,
    Submission, DEFAULT_MAX_RESTARTS,
};
