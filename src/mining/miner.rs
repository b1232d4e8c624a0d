//! Mining engine for the ledger
//!
//! One mining round assembles a candidate from the mempool, searches random
//! nonces until the proof-of-work target is met (or the budget runs out),
//! then submits the block to the chain. A candidate that went stale while
//! searching is rebuilt from scratch rather than resubmitted.

use crate::core::{
    Block, BlockHeader, BlockTransaction, Blockchain, BlockchainError, Coinbase, PowTarget,
};
use crate::mining::Mempool;
use log::{debug, info, warn};
use rand::Rng;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Stale-candidate rebuilds allowed per round
pub const DEFAULT_MAX_RESTARTS: u32 = 3;

/// The cancel flag is polled once per this many attempts
const CANCEL_CHECK_INTERVAL: u64 = 1024;

/// Mining errors
#[derive(Error, Debug)]
pub enum MiningError {
    #[error("Chain rejected block: {0}")]
    Rejected(#[from] BlockchainError),
    #[error("Candidate went stale {0} times in a row")]
    TooManyRestarts(u32),
}

/// Mining statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct MiningStats {
    /// Number of hash attempts
    pub attempts: u64,
    /// Time taken in milliseconds
    pub elapsed_ms: u128,
    /// Hash rate (hashes per second)
    pub hash_rate: f64,
}

impl MiningStats {
    fn measure(attempts: u64, start: Instant) -> Self {
        let elapsed_ms = start.elapsed().as_millis();
        let hash_rate = if elapsed_ms > 0 {
            (attempts as f64) / (elapsed_ms as f64 / 1000.0)
        } else {
            attempts as f64
        };
        Self {
            attempts,
            elapsed_ms,
            hash_rate,
        }
    }
}

/// Limits on a single nonce search. The default is unbounded.
#[derive(Debug, Clone, Default)]
pub struct MiningBudget {
    pub max_attempts: Option<u64>,
    pub deadline: Option<Instant>,
    pub cancel: Option<Arc<AtomicBool>>,
}

impl MiningBudget {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn with_max_attempts(mut self, max_attempts: u64) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(|flag| flag.load(Ordering::Relaxed))
            .unwrap_or(false)
    }

    fn is_exhausted(&self, attempts: u64) -> bool {
        self.max_attempts.map(|max| attempts >= max).unwrap_or(false)
            || self.deadline.map(|d| Instant::now() >= d).unwrap_or(false)
    }
}

/// How a mining round ended
#[derive(Debug, Clone)]
pub enum MineOutcome {
    /// A block was found (and, from `mine_once`, accepted by the chain)
    Mined { block: Block, stats: MiningStats },
    /// Attempt limit or deadline reached
    Exhausted { stats: MiningStats },
    /// Stopped through the cancel flag
    Cancelled { stats: MiningStats },
}

impl MineOutcome {
    pub fn stats(&self) -> &MiningStats {
        match self {
            MineOutcome::Mined { stats, .. }
            | MineOutcome::Exhausted { stats }
            | MineOutcome::Cancelled { stats } => stats,
        }
    }

    pub fn block(&self) -> Option<&Block> {
        match self {
            MineOutcome::Mined { block, .. } => Some(block),
            _ => None,
        }
    }

    pub fn is_mined(&self) -> bool {
        matches!(self, MineOutcome::Mined { .. })
    }
}

/// Where the miner is within a round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinerState {
    Idle,
    AssemblingCandidate,
    Searching,
    Submitting,
}

/// Block contents awaiting a nonce
#[derive(Debug, Clone)]
pub struct Candidate {
    pub previous_hash: String,
    pub height: u64,
    /// Coinbase first, then the selected transfers in mempool order
    pub transactions: Vec<BlockTransaction>,
    /// Mempool entries dropped while assembling
    pub purged: usize,
}

impl Candidate {
    /// Ids of the transfers this candidate includes
    pub fn transfer_ids(&self) -> Vec<String> {
        self.transactions
            .iter()
            .filter(|tx| !tx.is_coinbase())
            .map(|tx| tx.id())
            .collect()
    }
}

/// Result of handing a mined block to the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Accepted,
    /// The chain tip moved while searching
    Stale,
}

/// Search random nonces for a block over `candidate` meeting `target`.
///
/// Runs without touching the chain or the mempool, so callers can run it
/// off-thread while other requests proceed.
pub fn search(candidate: &Candidate, target: &PowTarget, budget: &MiningBudget) -> MineOutcome {
    let start = Instant::now();
    let header = BlockHeader::for_transactions(&candidate.previous_hash, &candidate.transactions);
    let mut rng = rand::thread_rng();
    let mut attempts: u64 = 0;

    loop {
        if attempts % CANCEL_CHECK_INTERVAL == 0 && budget.is_cancelled() {
            return MineOutcome::Cancelled {
                stats: MiningStats::measure(attempts, start),
            };
        }
        if budget.is_exhausted(attempts) {
            return MineOutcome::Exhausted {
                stats: MiningStats::measure(attempts, start),
            };
        }

        let nonce: u64 = rng.gen();
        attempts += 1;
        if target.is_met_by(&header.hash(nonce)) {
            let block = Block::new(
                &candidate.previous_hash,
                candidate.transactions.clone(),
                nonce,
            );
            return MineOutcome::Mined {
                block,
                stats: MiningStats::measure(attempts, start),
            };
        }
    }
}

/// Miner for creating new blocks
#[derive(Debug)]
pub struct Miner {
    /// Public key receiving block rewards
    pub reward_public_key: String,
    pub max_restarts: u32,
    state: MinerState,
}

impl Miner {
    /// Create a new miner
    pub fn new(reward_public_key: &str) -> Self {
        Self {
            reward_public_key: reward_public_key.to_string(),
            max_restarts: DEFAULT_MAX_RESTARTS,
            state: MinerState::Idle,
        }
    }

    pub fn with_max_restarts(mut self, max_restarts: u32) -> Self {
        self.max_restarts = max_restarts;
        self
    }

    pub fn state(&self) -> MinerState {
        self.state
    }

    pub(crate) fn transition(&mut self, next: MinerState) {
        debug!("Miner {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Build a candidate on the current tip.
    ///
    /// Pending transactions are taken in arrival order. Any that are
    /// invalid, spend outputs the chain does not hold unspent, or clash
    /// with an earlier selection are purged from the mempool.
    pub fn assemble(
        &mut self,
        chain: &Blockchain,
        mempool: &mut Mempool,
    ) -> Result<Candidate, BlockchainError> {
        self.transition(MinerState::AssemblingCandidate);

        let previous_hash = chain.get_topmost_block()?.hash();
        let height = chain.height() + 1;

        let mut spent = HashSet::new();
        let mut keep = Vec::with_capacity(mempool.len());
        let mut selected: Vec<BlockTransaction> = Vec::new();

        for entry in mempool.entries() {
            let tx = &entry.tx;
            let spendable = tx.is_valid()
                && tx
                    .inputs()
                    .iter()
                    .all(|input| chain.is_valid_utxo(input) && !spent.contains(&input.outpoint()));

            if spendable {
                spent.extend(tx.inputs().iter().map(|input| input.outpoint()));
                selected.push(tx.clone().into());
            } else {
                debug!("Purging {} from mempool", entry.id);
            }
            keep.push(spendable);
        }

        let mut verdicts = keep.into_iter();
        let purged = mempool.purge(|_| !verdicts.next().unwrap_or(false));

        let coinbase = Coinbase::new(&self.reward_public_key, chain.params().block_reward, height);
        let mut transactions = vec![BlockTransaction::from(coinbase)];
        transactions.extend(selected);

        info!(
            "Assembled candidate for block {} ({} transfers, {} purged)",
            height,
            transactions.len() - 1,
            purged
        );

        Ok(Candidate {
            previous_hash,
            height,
            transactions,
            purged,
        })
    }

    /// Hand a found block to the chain, clearing included transfers on success
    pub fn submit(
        &mut self,
        chain: &mut Blockchain,
        mempool: &mut Mempool,
        candidate: &Candidate,
        block: Block,
    ) -> Result<Submission, MiningError> {
        self.transition(MinerState::Submitting);

        let result = chain.insert_block(block);
        self.transition(MinerState::Idle);

        match result {
            Ok(()) => {
                mempool.remove_included(&candidate.transfer_ids());
                Ok(Submission::Accepted)
            }
            Err(BlockchainError::ChainLinkage { .. }) => {
                warn!(
                    "Candidate for block {} went stale, rebuilding",
                    candidate.height
                );
                Ok(Submission::Stale)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Run one full round: assemble, search, submit
    pub fn mine_once(
        &mut self,
        chain: &mut Blockchain,
        mempool: &mut Mempool,
        budget: &MiningBudget,
    ) -> Result<MineOutcome, MiningError> {
        for _ in 0..=self.max_restarts {
            let candidate = self.assemble(chain, mempool)?;

            self.transition(MinerState::Searching);
            let outcome = search(&candidate, &chain.params().pow, budget);

            let (block, stats) = match outcome {
                MineOutcome::Mined { block, stats } => (block, stats),
                other => {
                    self.transition(MinerState::Idle);
                    return Ok(other);
                }
            };

            if self.submit(chain, mempool, &candidate, block.clone())? == Submission::Accepted {
                log_mined(&candidate, &stats);
                return Ok(MineOutcome::Mined { block, stats });
            }
        }

        Err(MiningError::TooManyRestarts(self.max_restarts))
    }
}

pub(crate) fn log_mined(candidate: &Candidate, stats: &MiningStats) {
    info!(
        "Block {} mined in {}ms ({} attempts, {:.2} H/s)",
        candidate.height, stats.elapsed_ms, stats.attempts, stats.hash_rate
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ChainParams, GenesisAllocation, Transaction, UnsignedTransaction, Utxo};
    use crate::crypto::{derive_public_key, generate_sealed_key_with, KdfParams};

    const REWARD: u64 = 50;

    fn easy_chain(genesis: Option<&str>) -> Blockchain {
        Blockchain::new(ChainParams {
            pow: PowTarget::new(1, 1),
            block_reward: REWARD,
            genesis: genesis.map(|pk| GenesisAllocation {
                public_key: pk.to_string(),
                amount: 100,
            }),
        })
    }

    fn key() -> (String, String) {
        let sealed = generate_sealed_key_with("pw", KdfParams::new(64, 1)).unwrap();
        let public_key = derive_public_key(&sealed, "pw").unwrap();
        (sealed, public_key)
    }

    fn pay(sealed: &str, input: Utxo, to: &str, amount: u64) -> Transaction {
        UnsignedTransaction::new(vec![input], vec![to.to_string()], vec![amount])
            .unwrap()
            .sign(sealed, "pw")
            .unwrap()
    }

    #[test]
    fn test_coinbase_only_round() {
        let mut chain = easy_chain(None);
        let mut mempool = Mempool::new();
        let mut miner = Miner::new("miner");

        let outcome = miner
            .mine_once(&mut chain, &mut mempool, &MiningBudget::unbounded())
            .unwrap();

        assert!(outcome.is_mined());
        assert!(outcome.stats().attempts > 0);
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.get_balance("miner"), REWARD);
        assert_eq!(miner.state(), MinerState::Idle);
    }

    #[test]
    fn test_mine_multiple_blocks() {
        let mut chain = easy_chain(None);
        let mut mempool = Mempool::new();
        let mut miner = Miner::new("miner");

        for _ in 0..3 {
            miner
                .mine_once(&mut chain, &mut mempool, &MiningBudget::unbounded())
                .unwrap();
        }

        assert_eq!(chain.height(), 3);
        assert_eq!(chain.get_balance("miner"), 3 * REWARD);
        assert!(chain.is_valid());
    }

    #[test]
    fn test_pending_transfer_is_mined() {
        let (sealed, alice) = key();
        let mut chain = easy_chain(Some(&alice));
        let mut mempool = Mempool::new();
        let input = chain.get_utxos(&alice).remove(0);
        mempool.insert_transaction(pay(&sealed, input, "bob", 40)).unwrap();

        let outcome = Miner::new("miner")
            .mine_once(&mut chain, &mut mempool, &MiningBudget::unbounded())
            .unwrap();

        assert_eq!(outcome.block().unwrap().tx_count(), 2);
        assert!(mempool.is_empty());
        assert_eq!(chain.get_balance("bob"), 40);
        assert_eq!(chain.get_balance(&alice), 0);
    }

    #[test]
    fn test_unknown_input_purged_at_assembly() {
        let (sealed, alice) = key();
        let mut chain = easy_chain(None);
        let mut mempool = Mempool::new();
        let phantom = Utxo {
            tx_id: "ef".repeat(32),
            output_index: 0,
            owner: alice,
            amount: 100,
        };
        mempool.insert_transaction(pay(&sealed, phantom, "bob", 100)).unwrap();

        let outcome = Miner::new("miner")
            .mine_once(&mut chain, &mut mempool, &MiningBudget::unbounded())
            .unwrap();

        assert_eq!(outcome.block().unwrap().tx_count(), 1);
        assert!(mempool.is_empty());
        assert_eq!(chain.get_balance("bob"), 0);
    }

    #[test]
    fn test_conflicting_transfers_first_wins() {
        let (sealed, alice) = key();
        let chain = easy_chain(Some(&alice));
        let mut mempool = Mempool::new();
        let input = chain.get_utxos(&alice).remove(0);
        let first = pay(&sealed, input.clone(), "bob", 10);
        let second = pay(&sealed, input, "carol", 20);
        mempool.insert_transaction(first.clone()).unwrap();
        mempool.insert_transaction(second).unwrap();

        let candidate = Miner::new("miner").assemble(&chain, &mut mempool).unwrap();

        assert_eq!(candidate.purged, 1);
        assert_eq!(candidate.transfer_ids(), vec![first.id()]);
        assert_eq!(mempool.pending(), vec![first]);
        assert!(candidate.transactions[0].is_coinbase());
    }

    #[test]
    fn test_exhausted_budget_leaves_state_untouched() {
        let (sealed, alice) = key();
        let mut chain = Blockchain::new(ChainParams {
            // Window runs past the end of the digest, so nothing qualifies
            pow: PowTarget::new(64, 1),
            block_reward: REWARD,
            genesis: Some(GenesisAllocation {
                public_key: alice.clone(),
                amount: 100,
            }),
        });
        let mut mempool = Mempool::new();
        let input = chain.get_utxos(&alice).remove(0);
        mempool.insert_transaction(pay(&sealed, input, "bob", 40)).unwrap();

        let budget = MiningBudget::unbounded().with_max_attempts(100);
        let outcome = Miner::new("miner")
            .mine_once(&mut chain, &mut mempool, &budget)
            .unwrap();

        assert!(matches!(outcome, MineOutcome::Exhausted { .. }));
        assert_eq!(outcome.stats().attempts, 100);
        assert_eq!(chain.len(), 1);
        assert_eq!(mempool.len(), 1);
    }

    #[test]
    fn test_cancelled_search() {
        let chain = easy_chain(None);
        let mut mempool = Mempool::new();
        let candidate = Miner::new("miner").assemble(&chain, &mut mempool).unwrap();

        let cancel = Arc::new(AtomicBool::new(true));
        let budget = MiningBudget::unbounded().with_cancel(cancel);
        let outcome = search(&candidate, &PowTarget::new(64, 1), &budget);

        assert!(matches!(outcome, MineOutcome::Cancelled { .. }));
        assert_eq!(outcome.stats().attempts, 0);
    }

    #[test]
    fn test_deadline_in_the_past() {
        let chain = easy_chain(None);
        let mut mempool = Mempool::new();
        let candidate = Miner::new("miner").assemble(&chain, &mut mempool).unwrap();

        let budget = MiningBudget::unbounded().with_timeout(Duration::ZERO);
        let outcome = search(&candidate, &PowTarget::new(64, 1), &budget);
        assert!(matches!(outcome, MineOutcome::Exhausted { .. }));
    }

    #[test]
    fn test_stale_candidate_not_inserted() {
        let mut chain = easy_chain(None);
        let mut mempool = Mempool::new();
        let mut slow = Miner::new("slow");
        let candidate = slow.assemble(&chain, &mut mempool).unwrap();
        let found = search(&candidate, &chain.params().pow, &MiningBudget::unbounded());

        Miner::new("fast")
            .mine_once(&mut chain, &mut mempool, &MiningBudget::unbounded())
            .unwrap();

        let block = found.block().cloned().unwrap();
        let submission = slow.submit(&mut chain, &mut mempool, &candidate, block).unwrap();
        assert_eq!(submission, Submission::Stale);
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.get_balance("slow"), 0);
    }
}
