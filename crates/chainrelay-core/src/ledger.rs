use crate::{
    chain,
    constants::{GENESIS_PREVIOUS_HASH, GENESIS_PROOF, HASH_HEX_SIZE, POW_DIFFICULTY},
    error::LedgerError,
    pow, unix_timestamp, Block, ChainSnapshot, Transaction,
};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Ledger handle shared between request handlers and the consensus coordinator.
pub type SharedLedger = Arc<RwLock<Ledger>>;

/// The local chain plus the buffer of transactions waiting for the next block.
///
/// The chain sits behind an `Arc` so readers take cheap snapshots; appends
/// copy-on-write and consensus swaps the whole reference.
#[derive(Clone, Debug)]
pub struct Ledger {
    chain: Arc<Vec<Block>>,
    pending: Vec<Transaction>,
    difficulty: usize,
}

/// Everything a detached proof search needs, captured from the tip.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MiningJob {
    /// Index the mined block will receive.
    pub index: u64,
    pub previous_proof: u64,
    pub previous_hash: String,
    pub difficulty: usize,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger {
    pub fn new() -> Self {
        Self::with_difficulty(POW_DIFFICULTY)
    }

    /// Fresh ledger holding only the genesis block.
    ///
    /// Difficulty is capped at the digest width; more leading zeros than hex
    /// characters would make every search endless.
    pub fn with_difficulty(difficulty: usize) -> Self {
        if difficulty > HASH_HEX_SIZE {
            warn!(difficulty, cap = HASH_HEX_SIZE, "difficulty above digest width, capping");
        }
        let difficulty = difficulty.min(HASH_HEX_SIZE);
        let mut ledger = Self {
            chain: Arc::new(Vec::new()),
            pending: Vec::new(),
            difficulty,
        };
        ledger.create_block(GENESIS_PROOF, GENESIS_PREVIOUS_HASH.to_string());
        ledger
    }

    /// Append a block carrying the whole pending buffer, then clear the buffer.
    pub fn create_block(&mut self, proof: u64, previous_hash: String) -> Block {
        let block = Block {
            index: self.next_index(),
            timestamp: unix_timestamp(),
            proof,
            previous_hash,
            transactions: std::mem::take(&mut self.pending),
        };
        Arc::make_mut(&mut self.chain).push(block.clone());
        block
    }

    /// Queue a transaction. Returns the index of the block expected to hold it.
    pub fn add_transaction(
        &mut self,
        sender: impl Into<String>,
        receiver: impl Into<String>,
        amount: f64,
    ) -> u64 {
        self.pending.push(Transaction::new(sender, receiver, amount));
        self.next_index()
    }

    /// Index of the block the next append will create.
    fn next_index(&self) -> u64 {
        self.chain.len() as u64 + 1
    }

    pub fn previous_block(&self) -> &Block {
        self.chain
            .last()
            .expect("ledger chain always holds the genesis block")
    }

    /// Solve the next proof on the calling thread and append the block.
    pub fn mine(&mut self) -> Block {
        let job = self.mining_job();
        let proof = pow::solve(job.previous_proof, job.difficulty);
        let block = self.create_block(proof, job.previous_hash);
        info!(index = block.index, proof, "mined block");
        block
    }

    pub fn mining_job(&self) -> MiningJob {
        let previous = self.previous_block();
        MiningJob {
            index: self.next_index(),
            previous_proof: previous.proof,
            previous_hash: previous.hash(),
            difficulty: self.difficulty,
        }
    }

    /// Append the block for a job solved elsewhere.
    ///
    /// Fails without touching state if the tip changed since the job was taken
    /// or the proof does not satisfy the predicate. `reward`, when given, is
    /// queued behind the pending transactions right before the append.
    pub fn commit_mined(
        &mut self,
        job: &MiningJob,
        proof: u64,
        reward: Option<Transaction>,
    ) -> Result<Block, LedgerError> {
        if self.next_index() != job.index || self.previous_block().hash() != job.previous_hash {
            return Err(LedgerError::StaleTip {
                expected: job.index.saturating_sub(1),
            });
        }
        if !pow::verify(proof, job.previous_proof, self.difficulty) {
            return Err(LedgerError::InvalidProof { proof });
        }
        if let Some(reward) = reward {
            self.pending.push(reward);
        }
        Ok(self.create_block(proof, job.previous_hash.clone()))
    }

    /// Swap in a whole new chain. Empty chains are refused.
    pub(crate) fn replace_chain(&mut self, chain: Vec<Block>) -> bool {
        if chain.is_empty() {
            return false;
        }
        self.chain = Arc::new(chain);
        true
    }

    pub fn chain(&self) -> Arc<Vec<Block>> {
        Arc::clone(&self.chain)
    }

    pub fn snapshot(&self) -> ChainSnapshot {
        ChainSnapshot::new(self.chain.to_vec())
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    pub fn pending_transactions(&self) -> &[Transaction] {
        &self.pending
    }

    pub fn difficulty(&self) -> usize {
        self.difficulty
    }

    pub fn is_valid(&self) -> bool {
        chain::is_valid(&self.chain, self.difficulty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_DIFFICULTY: usize = 2;

    #[test]
    fn genesis_block_example() {
        let ledger = Ledger::new();
        assert_eq!(ledger.len(), 1);
        let genesis = ledger.previous_block();
        assert_eq!(genesis.index, 1);
        assert_eq!(genesis.proof, 1);
        assert_eq!(genesis.previous_hash, "0");
        assert!(genesis.transactions.is_empty());
        assert!(genesis.timestamp > 0);
        assert_eq!(ledger.difficulty(), POW_DIFFICULTY);
        assert!(ledger.pending_transactions().is_empty());
    }

    #[test]
    fn create_block_links_and_grows() {
        let mut ledger = Ledger::with_difficulty(TEST_DIFFICULTY);
        let previous_hash = ledger.previous_block().hash();
        let block = ledger.create_block(42, previous_hash.clone());
        assert_eq!(ledger.len(), 2);
        assert_eq!(block.index, 2);
        assert_eq!(block.proof, 42);
        assert_eq!(block.previous_hash, previous_hash);
        assert_eq!(ledger.previous_block(), &block);
    }

    #[test]
    fn add_transaction_reports_next_index() {
        let mut ledger = Ledger::with_difficulty(TEST_DIFFICULTY);
        assert_eq!(ledger.add_transaction("Alice", "Bob", 10.0), 2);
        assert_eq!(ledger.add_transaction("Bob", "Charlie", -3.5), 2);
        assert_eq!(ledger.pending_transactions().len(), 2);
        ledger.mine();
        assert_eq!(ledger.add_transaction("Charlie", "Dave", 1.0), 3);
    }

    #[test]
    fn mine_commits_pending_in_order_and_clears_buffer() {
        let mut ledger = Ledger::with_difficulty(TEST_DIFFICULTY);
        let txs = vec![
            Transaction::new("Alice", "Bob", 10.0),
            Transaction::new("Bob", "Charlie", 5.0),
            Transaction::new("Charlie", "Alice", 2.0),
        ];
        for tx in &txs {
            ledger.add_transaction(tx.sender.clone(), tx.receiver.clone(), tx.amount);
        }
        let genesis_hash = ledger.previous_block().hash();
        let block = ledger.mine();
        assert_eq!(block.transactions, txs);
        assert_eq!(block.previous_hash, genesis_hash);
        assert!(pow::verify(block.proof, 1, TEST_DIFFICULTY));
        assert!(ledger.pending_transactions().is_empty());

        let next = ledger.mine();
        assert!(next.transactions.is_empty());
        assert_eq!(ledger.len(), 3);
        assert!(ledger.is_valid());
    }

    #[test]
    fn snapshots_are_unaffected_by_later_appends() {
        let mut ledger = Ledger::with_difficulty(TEST_DIFFICULTY);
        let before = ledger.chain();
        ledger.mine();
        assert_eq!(before.len(), 1);
        assert_eq!(ledger.chain().len(), 2);
        assert_eq!(ledger.snapshot().length, 2);
    }

    #[test]
    fn commit_mined_appends_with_reward_last() {
        let mut ledger = Ledger::with_difficulty(TEST_DIFFICULTY);
        ledger.add_transaction("Alice", "Bob", 3.0);
        let job = ledger.mining_job();
        assert_eq!(job.index, 2);
        let proof = pow::solve(job.previous_proof, job.difficulty);
        let reward = Transaction::new("node", "node", 1.0);
        let block = ledger
            .commit_mined(&job, proof, Some(reward.clone()))
            .unwrap();
        assert_eq!(block.index, 2);
        assert_eq!(block.transactions.len(), 2);
        assert_eq!(block.transactions[1], reward);
        assert!(ledger.is_valid());
    }

    #[test]
    fn commit_mined_rejects_stale_job() {
        let mut ledger = Ledger::with_difficulty(TEST_DIFFICULTY);
        let job = ledger.mining_job();
        let proof = pow::solve(job.previous_proof, job.difficulty);
        ledger.mine();
        ledger.add_transaction("Alice", "Bob", 1.0);

        let err = ledger.commit_mined(&job, proof, None).unwrap_err();
        assert_eq!(err, LedgerError::StaleTip { expected: 1 });
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.pending_transactions().len(), 1);
    }

    #[test]
    fn commit_mined_rejects_bad_proof() {
        let mut ledger = Ledger::with_difficulty(TEST_DIFFICULTY);
        let job = ledger.mining_job();
        let bad = (1..)
            .find(|c| !pow::verify(*c, job.previous_proof, TEST_DIFFICULTY))
            .unwrap();
        let err = ledger.commit_mined(&job, bad, None).unwrap_err();
        assert_eq!(err, LedgerError::InvalidProof { proof: bad });
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn replace_chain_swaps_whole_chain() {
        let mut donor = Ledger::with_difficulty(TEST_DIFFICULTY);
        donor.mine();
        donor.mine();
        let mut ledger = Ledger::with_difficulty(TEST_DIFFICULTY);
        let held = ledger.chain();
        assert!(ledger.replace_chain(donor.chain().to_vec()));
        assert_eq!(ledger.chain(), donor.chain());
        assert_eq!(held.len(), 1);
        assert!(!ledger.replace_chain(Vec::new()));
        assert_eq!(ledger.len(), 3);
    }

    #[test]
    fn difficulty_is_capped_at_digest_width() {
        let ledger = Ledger::with_difficulty(1000);
        assert_eq!(ledger.difficulty(), HASH_HEX_SIZE);
        assert_eq!(ledger.mining_job().difficulty, HASH_HEX_SIZE);
        assert_eq!(Ledger::with_difficulty(HASH_HEX_SIZE).difficulty(), HASH_HEX_SIZE);
    }

    #[test]
    fn transaction_added_mid_search_lands_once_at_hinted_index() {
        let mut ledger = Ledger::with_difficulty(TEST_DIFFICULTY);
        let job = ledger.mining_job();
        let proof = pow::solve(job.previous_proof, job.difficulty);

        let hint = ledger.add_transaction("Alice", "Bob", 4.0);
        let block = ledger.commit_mined(&job, proof, None).unwrap();

        assert_eq!(block.index, hint);
        let matching = block
            .transactions
            .iter()
            .filter(|tx| tx.sender == "Alice" && tx.receiver == "Bob")
            .count();
        assert_eq!(matching, 1);
        assert!(ledger.pending_transactions().is_empty());
        assert!(ledger.chain()[..block.index as usize - 1]
            .iter()
            .all(|b| b.transactions.is_empty()));
    }

    #[test]
    fn replaced_chain_invalidates_job_and_retry_succeeds() {
        let mut donor = Ledger::with_difficulty(TEST_DIFFICULTY);
        donor.mine();
        donor.mine();

        let mut ledger = Ledger::with_difficulty(TEST_DIFFICULTY);
        ledger.add_transaction("Alice", "Bob", 1.0);
        let job = ledger.mining_job();
        let proof = pow::solve(job.previous_proof, job.difficulty);
        assert!(ledger.replace_chain(donor.chain().to_vec()));

        let err = ledger.commit_mined(&job, proof, None).unwrap_err();
        assert_eq!(err, LedgerError::StaleTip { expected: 1 });
        assert_eq!(ledger.len(), 3);
        assert_eq!(ledger.pending_transactions().len(), 1);

        let retry = ledger.mining_job();
        assert_eq!(retry.index, 4);
        let proof = pow::solve(retry.previous_proof, retry.difficulty);
        let block = ledger.commit_mined(&retry, proof, None).unwrap();
        assert_eq!(block.index, 4);
        assert_eq!(block.transactions, vec![Transaction::new("Alice", "Bob", 1.0)]);
        assert!(ledger.is_valid());
    }
}
