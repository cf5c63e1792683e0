use log::{info, warn};

use std::sync::{Arc, Mutex};

use super::block::Block;
use super::chain::{AccountBalance, Blockchain, BlockchainError};
use super::config::ChainConfig;
use super::transaction::{iso_timestamp_now, Transaction, TransactionData};
use super::validation;

/// Searches nonce space for a hash satisfying a candidate's difficulty
///
/// Increments the nonce from the candidate's starting value and recomputes
/// the block hash each attempt; the candidate's committed fields never
/// change during the search.
///
/// # Arguments
///
/// * `candidate` - The block candidate to mine
///
/// # Returns
///
/// The winning nonce and the hash it produces
pub fn mine_candidate(candidate: &Block) -> (u64, String) {
    let mut block = candidate.clone();

    loop {
        let hash = block.compute_block_hash();
        if validation::hash_meets_difficulty(&hash, block.difficulty) {
            return (block.nonce, hash);
        }
        block.nonce += 1;
    }
}

/// A thread-safe handle to the ledger
///
/// Every operation locks the whole `Blockchain` aggregate for its duration,
/// so concurrent request handlers never observe a partial update across the
/// chain, the pending pool, the job map and the difficulty.
///
/// Cloning a `Node` yields another handle to the same ledger.
#[derive(Debug, Clone)]
pub struct Node {
    ledger: Arc<Mutex<Blockchain>>,
}

impl Node {
    /// Creates a node holding a genesis-only ledger
    pub fn new(config: ChainConfig) -> Self {
        Node {
            ledger: Arc::new(Mutex::new(Blockchain::new(config))),
        }
    }

    /// Validates and admits a transaction into the pending pool
    pub fn submit_transaction(
        &self,
        data: TransactionData,
    ) -> Result<Transaction, BlockchainError> {
        self.ledger.lock().unwrap().submit_transaction(data)
    }

    /// Prepares a mining job for the given miner
    pub fn create_mining_job(&self, miner_address: &str) -> Result<Block, BlockchainError> {
        self.ledger.lock().unwrap().create_mining_job(miner_address)
    }

    /// Validates a mined block submission and extends the chain with it
    pub fn submit_mined_block(
        &self,
        block_data_hash: &str,
        date_created: &str,
        nonce: u64,
        block_hash: &str,
    ) -> Result<Block, BlockchainError> {
        self.ledger.lock().unwrap().submit_mined_block(
            block_data_hash,
            date_created,
            nonce,
            block_hash,
        )
    }

    /// Gets a snapshot of all blocks in the chain
    pub fn blocks(&self) -> Vec<Block> {
        self.ledger.lock().unwrap().blocks().to_vec()
    }

    /// Gets the number of blocks in the chain
    pub fn chain_length(&self) -> u64 {
        self.ledger.lock().unwrap().chain_length()
    }

    /// Gets a block by its index
    pub fn get_block_by_index(&self, block_index: u64) -> Option<Block> {
        self.ledger
            .lock()
            .unwrap()
            .get_block_by_index(block_index)
            .cloned()
    }

    /// Gets a block by its hash
    pub fn get_block_by_hash(&self, block_hash: &str) -> Option<Block> {
        self.ledger
            .lock()
            .unwrap()
            .get_block_by_hash(block_hash)
            .cloned()
    }

    /// Gets the transactions of the block with the given hash
    pub fn get_block_transactions(&self, block_hash: &str) -> Option<Vec<Transaction>> {
        self.ledger
            .lock()
            .unwrap()
            .get_block_transactions(block_hash)
            .map(|transactions| transactions.to_vec())
    }

    /// Gets a snapshot of the pending pool
    pub fn pending_transactions(&self) -> Vec<Transaction> {
        self.ledger.lock().unwrap().pending_transactions().to_vec()
    }

    /// Gets all transactions embedded in blocks
    pub fn confirmed_transactions(&self) -> Vec<Transaction> {
        self.ledger.lock().unwrap().confirmed_transactions()
    }

    /// Gets all transactions, confirmed first, then pending
    pub fn all_transactions(&self) -> Vec<Transaction> {
        self.ledger.lock().unwrap().all_transactions()
    }

    /// Looks up a transaction by data hash across confirmed and pending
    /// sets
    pub fn get_transaction_by_hash(&self, hash: &str) -> Option<(Transaction, Option<u64>)> {
        self.ledger.lock().unwrap().get_transaction_by_hash(hash)
    }

    /// Computes the three balance tiers of an address
    pub fn get_balance(&self, address: &str) -> Result<AccountBalance, BlockchainError> {
        self.ledger.lock().unwrap().get_balance(address)
    }

    /// Gets all transactions touching an address, ordered by creation date
    /// ascending
    pub fn get_transaction_history(
        &self,
        address: &str,
    ) -> Result<Vec<Transaction>, BlockchainError> {
        self.ledger.lock().unwrap().get_transaction_history(address)
    }

    /// Gets every address that appears in a confirmed transaction
    pub fn get_all_addresses(&self) -> Vec<String> {
        self.ledger.lock().unwrap().get_all_addresses()
    }

    /// Gets the difficulty applied to the next mining job
    pub fn current_difficulty(&self) -> u32 {
        self.ledger.lock().unwrap().current_difficulty()
    }

    /// Adjusts the difficulty applied to subsequent mining jobs
    pub fn set_difficulty(&self, difficulty: u32) {
        self.ledger.lock().unwrap().set_difficulty(difficulty)
    }

    /// Gets the number of outstanding mining jobs
    pub fn mining_job_count(&self) -> usize {
        self.ledger.lock().unwrap().mining_job_count()
    }

    /// Computes the cumulative proof-of-work weight of the chain
    pub fn cumulative_difficulty(&self) -> u128 {
        self.ledger.lock().unwrap().cumulative_difficulty()
    }

    /// Replaces the local chain with a peer's when it is valid and carries
    /// strictly more cumulative proof-of-work
    pub fn try_adopt_chain(&self, peer_blocks: Vec<Block>) -> Result<bool, BlockchainError> {
        self.ledger.lock().unwrap().try_adopt_chain(peer_blocks)
    }

    /// Restores the ledger to a genesis-only chain
    pub fn reset(&self) {
        self.ledger.lock().unwrap().reset()
    }

    /// Builds a job, mines it locally and submits the result
    ///
    /// The nonce search runs without holding the ledger lock, so other
    /// handlers keep making progress while this node mines. If the chain
    /// advances during the search the submission comes back stale; that is
    /// a normal outcome and the miner simply takes a fresh job and starts
    /// over.
    ///
    /// # Arguments
    ///
    /// * `miner_address` - The address the coinbase reward is paid to
    /// * `difficulty` - Overrides the current difficulty for this job only
    ///
    /// # Returns
    ///
    /// The mined block, now the chain tip
    pub fn mine_next_block(
        &self,
        miner_address: &str,
        difficulty: Option<u32>,
    ) -> Result<Block, BlockchainError> {
        loop {
            let job = {
                let mut ledger = self.ledger.lock().unwrap();
                match difficulty {
                    Some(job_difficulty) => {
                        let saved = ledger.current_difficulty();
                        ledger.set_difficulty(job_difficulty);
                        let job = ledger.create_mining_job(miner_address);
                        ledger.set_difficulty(saved);
                        job?
                    }
                    None => ledger.create_mining_job(miner_address)?,
                }
            };

            // Search nonce space with the lock released
            let (nonce, block_hash) = mine_candidate(&job);
            let date_created = iso_timestamp_now();

            let result = self.ledger.lock().unwrap().submit_mined_block(
                &job.block_data_hash,
                &date_created,
                nonce,
                &block_hash,
            );
            match result {
                Ok(block) => {
                    info!(
                        "Mined block {} with nonce {} at difficulty {}",
                        block.block_index, nonce, job.difficulty
                    );
                    return Ok(block);
                }
                Err(
                    BlockchainError::JobNotFound(_)
                    | BlockchainError::StaleBlock { .. }
                    | BlockchainError::BrokenLink { .. },
                ) => {
                    // Lost the race to another submission
                    warn!("Mining job for {} went stale, restarting", miner_address);
                    continue;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

impl Default for Node {
    fn default() -> Self {
        Self::new(ChainConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashSet;
    use std::thread;

    fn test_node() -> Node {
        let _ = env_logger::builder().is_test(true).try_init();
        Node::new(ChainConfig {
            initial_difficulty: 1,
            block_reward: 100,
            ..ChainConfig::default()
        })
    }

    #[test]
    fn test_mine_candidate_satisfies_difficulty() {
        let node = test_node();
        let job = node.create_mining_job(&"c".repeat(40)).unwrap();

        let (nonce, block_hash) = mine_candidate(&job);

        assert!(validation::hash_meets_difficulty(&block_hash, job.difficulty));
        let mut mined = job.clone();
        mined.nonce = nonce;
        assert_eq!(mined.compute_block_hash(), block_hash);
    }

    #[test]
    fn test_mine_next_block_extends_chain() {
        let node = test_node();
        let miner = "c".repeat(40);

        let block = node.mine_next_block(&miner, None).unwrap();

        assert_eq!(block.block_index, 1);
        assert_eq!(node.chain_length(), 2);
        assert_eq!(node.get_balance(&miner).unwrap().confirmed_balance, 100);
        assert_eq!(node.mining_job_count(), 0);
    }

    #[test]
    fn test_mine_next_block_difficulty_override() {
        let node = test_node();

        let block = node.mine_next_block(&"c".repeat(40), Some(2)).unwrap();

        assert_eq!(block.difficulty, 2);
        assert!(block.block_hash.starts_with("00"));
        // The override did not stick
        assert_eq!(node.current_difficulty(), 1);
    }

    #[test]
    fn test_concurrent_miners_all_land_their_blocks() {
        let node = test_node();
        let miners: u64 = 4;

        let handles: Vec<_> = (0..miners)
            .map(|i| {
                let node = node.clone();
                thread::spawn(move || {
                    let miner = format!("{:040x}", i + 1);
                    node.mine_next_block(&miner, None).unwrap()
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // Every miner retried past lost races until its block landed
        assert_eq!(node.chain_length(), 1 + miners);
        assert!(Blockchain::is_chain_valid(&node.blocks()));
    }

    #[test]
    fn test_extension_never_leaves_mined_transactions_pending() {
        let node = test_node();
        let wallet = crate::blockchain::crypto::Wallet::new().unwrap();

        // Give the sender a confirmed balance, then race mining against
        // further submissions
        node.mine_next_block(wallet.address(), None).unwrap();
        node.mine_next_block(wallet.address(), None).unwrap();

        let submitter = {
            let node = node.clone();
            let wallet = wallet.clone();
            thread::spawn(move || {
                for i in 0..10u64 {
                    let mut data = TransactionData {
                        from: wallet.address().to_string(),
                        to: "b".repeat(40),
                        value: 1,
                        fee: 1,
                        date_created: format!("2025-06-01T10:30:{:02}.000Z", i),
                        data: None,
                        sender_public_key: wallet.public_key_hex().to_string(),
                        sender_signature: crate::blockchain::config::null_signature(),
                    };
                    let unsigned = Transaction::from_data(data.clone());
                    data.sender_signature = wallet.sign(&unsigned.transaction_data_hash);
                    node.submit_transaction(data).unwrap();
                }
            })
        };
        let miner = {
            let node = node.clone();
            thread::spawn(move || {
                for _ in 0..3 {
                    node.mine_next_block(&"c".repeat(40), None).unwrap();
                }
            })
        };
        submitter.join().unwrap();
        miner.join().unwrap();

        // No pending transaction is also embedded in a block
        let confirmed: HashSet<String> = node
            .confirmed_transactions()
            .into_iter()
            .map(|t| t.transaction_data_hash)
            .collect();
        assert!(node
            .pending_transactions()
            .iter()
            .all(|t| !confirmed.contains(&t.transaction_data_hash)));
        assert!(Blockchain::is_chain_valid(&node.blocks()));
    }

    #[test]
    fn test_cloned_handles_share_one_ledger() {
        let node = test_node();
        let other = node.clone();

        node.mine_next_block(&"c".repeat(40), None).unwrap();

        assert_eq!(other.chain_length(), 2);
        other.reset();
        assert_eq!(node.chain_length(), 1);
    }
}
