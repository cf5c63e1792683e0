use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use super::block::Block;
use super::config::ChainConfig;
use super::crypto::{self, CryptoError};
use super::transaction::{iso_timestamp_now, Transaction, TransactionData};
use super::validation::{self, ValidationError};

/// Errors that can occur during ledger operations
///
/// All of these are recoverable and reported to the caller; none of them
/// leaves the ledger partially mutated.
#[derive(Debug, Error)]
pub enum BlockchainError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Invalid signature: not produced over this transaction's data hash")]
    InvalidSignature,

    #[error("Duplicate transaction: {0}")]
    DuplicateTransaction(String),

    #[error("Insufficient sender balance: required {required}, available {available}")]
    InsufficientBalance { required: u64, available: i64 },

    #[error("Block not found or already mined: {0}")]
    JobNotFound(String),

    #[error("Block hash is incorrectly calculated: recomputed {recomputed}, claimed {claimed}")]
    HashMismatch { recomputed: String, claimed: String },

    #[error("The block hash {hash} does not match difficulty {difficulty}")]
    DifficultyNotMet { difficulty: u32, hash: String },

    #[error("The submitted block was already mined by someone else: expected index {expected}, got {got}")]
    StaleBlock { expected: u64, got: u64 },

    #[error("Incorrect previous block hash: expected {expected}, got {got}")]
    BrokenLink { expected: String, got: String },

    #[error("The candidate chain failed validation")]
    InvalidChain,

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

/// The three balance tiers of an address
///
/// Balances are signed because the burn address goes negative as coinbase
/// value is minted from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountBalance {
    /// Confirmed at or beyond the configured safety depth
    pub safe_balance: i64,

    /// Confirmed by at least one block
    pub confirmed_balance: i64,

    /// Expected balance at zero confirmations, counting pool transactions
    /// as if they will execute in full
    pub pending_balance: i64,
}

/// The ledger: the chain of blocks, the pending transaction pool, the
/// outstanding mining jobs and the current difficulty, owned as one unit
///
/// All methods mutate through `&mut self`, so a single lock around the
/// whole value is enough to keep every invariant (see `Node`).
#[derive(Debug, Clone)]
pub struct Blockchain {
    /// The chain of blocks, index-contiguous from genesis; append-only
    blocks: Vec<Block>,

    /// Transactions admitted but not yet mined, unique by data hash
    pending_transactions: Vec<Transaction>,

    /// Outstanding block candidates keyed by their data hash
    mining_jobs: HashMap<String, Block>,

    /// Insertion order of job keys, for oldest-first eviction
    job_order: VecDeque<String>,

    /// Difficulty applied to the next mining job
    current_difficulty: u32,

    config: ChainConfig,
}

impl Blockchain {
    /// Creates a ledger holding only the genesis block
    pub fn new(config: ChainConfig) -> Self {
        Blockchain {
            blocks: vec![Block::genesis()],
            pending_transactions: Vec::new(),
            mining_jobs: HashMap::new(),
            job_order: VecDeque::new(),
            current_difficulty: config.initial_difficulty,
            config,
        }
    }

    /// Gets the chain configuration
    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Gets all blocks in the chain
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Gets the last block in the chain
    pub fn last_block(&self) -> &Block {
        self.blocks.last().unwrap()
    }

    /// Gets the number of blocks in the chain
    pub fn chain_length(&self) -> u64 {
        self.blocks.len() as u64
    }

    /// Gets a block by its index
    pub fn get_block_by_index(&self, block_index: u64) -> Option<&Block> {
        self.blocks.get(block_index as usize)
    }

    /// Gets a block by its hash
    pub fn get_block_by_hash(&self, block_hash: &str) -> Option<&Block> {
        self.blocks.iter().find(|b| b.block_hash == block_hash)
    }

    /// Gets the transactions of the block with the given hash
    pub fn get_block_transactions(&self, block_hash: &str) -> Option<&[Transaction]> {
        self.get_block_by_hash(block_hash)
            .map(|b| b.transactions.as_slice())
    }

    /// Gets the difficulty applied to the next mining job
    pub fn current_difficulty(&self) -> u32 {
        self.current_difficulty
    }

    /// Adjusts the difficulty applied to subsequent mining jobs
    pub fn set_difficulty(&mut self, difficulty: u32) {
        self.current_difficulty = difficulty;
    }

    /// Gets all pending transactions
    pub fn pending_transactions(&self) -> &[Transaction] {
        &self.pending_transactions
    }

    /// Gets all transactions embedded in blocks
    pub fn confirmed_transactions(&self) -> Vec<Transaction> {
        self.blocks
            .iter()
            .flat_map(|b| b.transactions.iter().cloned())
            .collect()
    }

    /// Gets all transactions, confirmed first, then pending
    pub fn all_transactions(&self) -> Vec<Transaction> {
        let mut transactions = self.confirmed_transactions();
        transactions.extend(self.pending_transactions.iter().cloned());
        transactions
    }

    /// Looks up a transaction by data hash across confirmed and pending
    /// sets
    ///
    /// # Returns
    ///
    /// The transaction and, when confirmed, the index of its containing
    /// block
    pub fn get_transaction_by_hash(&self, hash: &str) -> Option<(Transaction, Option<u64>)> {
        for block in &self.blocks {
            for transaction in &block.transactions {
                if transaction.transaction_data_hash == hash {
                    return Some((transaction.clone(), Some(block.block_index)));
                }
            }
        }

        self.pending_transactions
            .iter()
            .find(|t| t.transaction_data_hash == hash)
            .map(|t| (t.clone(), None))
    }

    fn transaction_exists(&self, hash: &str) -> bool {
        self.blocks
            .iter()
            .flat_map(|b| b.transactions.iter())
            .chain(self.pending_transactions.iter())
            .any(|t| t.transaction_data_hash == hash)
    }

    /// Validates and admits a transaction into the pending pool
    ///
    /// The solvency check here is advisory; final solvency is re-checked at
    /// mining time against the balances as of mining.
    ///
    /// # Arguments
    ///
    /// * `data` - The raw submitted transfer fields
    ///
    /// # Returns
    ///
    /// The admitted transaction with its derived data hash
    pub fn submit_transaction(
        &mut self,
        data: TransactionData,
    ) -> Result<Transaction, BlockchainError> {
        self.validate_transaction_fields(&data)?;

        let transaction = Transaction::from_data(data);

        // Check for duplicate transactions, pending or confirmed
        if self.transaction_exists(&transaction.transaction_data_hash) {
            return Err(BlockchainError::DuplicateTransaction(
                transaction.transaction_data_hash,
            ));
        }

        if !transaction.verify_signature() {
            return Err(BlockchainError::InvalidSignature);
        }

        // Check for sufficient confirmed sender balance
        let available = self.confirmed_balance_of(&transaction.from);
        let required = transaction.value + transaction.fee;
        if available < required as i64 {
            return Err(BlockchainError::InsufficientBalance {
                required,
                available,
            });
        }

        info!(
            "Admitted transaction {} from {} to {}",
            transaction.transaction_data_hash, transaction.from, transaction.to
        );
        self.pending_transactions.push(transaction.clone());

        Ok(transaction)
    }

    fn validate_transaction_fields(&self, data: &TransactionData) -> Result<(), BlockchainError> {
        if !validation::is_valid_address(&data.from) {
            return Err(ValidationError::InvalidAddress(data.from.clone()).into());
        }
        if !validation::is_valid_address(&data.to) {
            return Err(ValidationError::InvalidAddress(data.to.clone()).into());
        }
        if !validation::is_valid_public_key(&data.sender_public_key) {
            return Err(ValidationError::InvalidPublicKey(data.sender_public_key.clone()).into());
        }

        let sender_address = crypto::public_key_to_address(&data.sender_public_key)?;
        if sender_address != data.from {
            return Err(ValidationError::AddressKeyMismatch(data.from.clone()).into());
        }

        if !validation::is_valid_transfer_value(data.value, self.config.max_transfer_value) {
            return Err(ValidationError::InvalidValue(data.value).into());
        }
        if !validation::is_valid_fee(data.fee, self.config.max_transaction_fee) {
            return Err(ValidationError::InvalidFee(data.fee).into());
        }
        if !validation::is_valid_date(&data.date_created) {
            return Err(ValidationError::InvalidDate(data.date_created.clone()).into());
        }
        if !validation::is_valid_signature_format(&data.sender_signature) {
            return Err(ValidationError::InvalidSignatureFormat.into());
        }

        Ok(())
    }

    /// Computes the confirmed balance of every address by replaying the
    /// chain
    ///
    /// The sender always pays the fee; the value moves only when the
    /// transfer executed. A pure function of the blocks.
    pub fn confirmed_balances(&self) -> HashMap<String, i64> {
        let mut balances = HashMap::new();

        for block in &self.blocks {
            for transaction in &block.transactions {
                *balances.entry(transaction.from.clone()).or_insert(0) -= transaction.fee as i64;
                if transaction.transfer_successful == Some(true) {
                    *balances.entry(transaction.from.clone()).or_insert(0) -=
                        transaction.value as i64;
                    *balances.entry(transaction.to.clone()).or_insert(0) +=
                        transaction.value as i64;
                }
            }
        }

        balances
    }

    fn confirmed_balance_of(&self, address: &str) -> i64 {
        self.confirmed_balances().get(address).copied().unwrap_or(0)
    }

    /// Prepares a block candidate for the given miner and registers it as
    /// an outstanding mining job
    ///
    /// The pending pool is snapshotted and ordered by fee, highest first,
    /// then executed against the confirmed balances: the fee is always
    /// collected into the coinbase, the value moves only while the sender
    /// stays solvent, and a sender who cannot even cover the fee has the
    /// transaction dropped from the pool for good.
    ///
    /// # Arguments
    ///
    /// * `miner_address` - The address the coinbase reward is paid to
    ///
    /// # Returns
    ///
    /// The block candidate, keyed in the job map by its data hash
    pub fn create_mining_job(&mut self, miner_address: &str) -> Result<Block, BlockchainError> {
        if !validation::is_valid_address(miner_address) {
            return Err(ValidationError::InvalidAddress(miner_address.to_string()).into());
        }

        let next_block_index = self.chain_length();

        // Snapshot the pool and order it by fee, highest first
        let mut snapshot = self.pending_transactions.clone();
        snapshot.sort_by(|a, b| b.fee.cmp(&a.fee));

        let mut balances = self.confirmed_balances();
        let mut collected_fees: u64 = 0;
        let mut included = Vec::with_capacity(snapshot.len() + 1);
        let mut dropped = Vec::new();

        for mut transaction in snapshot {
            let fee = transaction.fee as i64;
            let value = transaction.value as i64;
            let mut sender_balance = balances.get(&transaction.from).copied().unwrap_or(0);

            if sender_balance < fee {
                // Cannot even pay the processing fee: unmineable, drop it
                dropped.push(transaction.transaction_data_hash.clone());
                continue;
            }

            transaction.mined_in_block_index = Some(next_block_index);
            sender_balance -= fee;
            collected_fees += transaction.fee;

            let successful = sender_balance >= value;
            if successful {
                sender_balance -= value;
            }
            balances.insert(transaction.from.clone(), sender_balance);
            if successful {
                *balances.entry(transaction.to.clone()).or_insert(0) += value;
            }

            transaction.transfer_successful = Some(successful);
            included.push(transaction);
        }

        if !dropped.is_empty() {
            warn!(
                "Dropping {} pending transaction(s) whose sender cannot pay the fee",
                dropped.len()
            );
            self.remove_pending_transactions(&dropped);
        }

        // The coinbase collects the base reward plus every fee taken above
        let date_created = iso_timestamp_now();
        let coinbase = Transaction::coinbase(
            miner_address,
            self.config.block_reward + collected_fees,
            next_block_index,
            date_created.clone(),
        );

        let mut transactions = vec![coinbase];
        transactions.extend(included);

        let mut candidate = Block::candidate(
            next_block_index,
            transactions,
            self.current_difficulty,
            self.last_block().block_hash.clone(),
            miner_address.to_string(),
            self.config.block_reward,
        );
        candidate.date_created = date_created;

        info!(
            "Prepared mining job {} at index {} with {} transaction(s)",
            candidate.block_data_hash,
            next_block_index,
            candidate.transactions.len()
        );
        self.store_mining_job(candidate.clone());

        Ok(candidate)
    }

    fn store_mining_job(&mut self, candidate: Block) {
        let key = candidate.block_data_hash.clone();
        if self.mining_jobs.insert(key.clone(), candidate).is_none() {
            self.job_order.push_back(key);
            if self.job_order.len() > self.config.max_mining_jobs {
                if let Some(oldest) = self.job_order.pop_front() {
                    self.mining_jobs.remove(&oldest);
                    debug!("Evicted oldest mining job {}", oldest);
                }
            }
        }
    }

    /// Gets an outstanding mining job by its block data hash
    pub fn get_mining_job(&self, block_data_hash: &str) -> Option<&Block> {
        self.mining_jobs.get(block_data_hash)
    }

    /// Gets the number of outstanding mining jobs
    pub fn mining_job_count(&self) -> usize {
        self.mining_jobs.len()
    }

    /// Validates a mined block submission and extends the chain with it
    ///
    /// The block hash is recomputed here; the submitter's claim is checked
    /// against it, never trusted. A rejected submission leaves the job
    /// offered and re-submittable.
    ///
    /// # Arguments
    ///
    /// * `block_data_hash` - Key of the mining job being answered
    /// * `date_created` - Timestamp the miner stamped on the block
    /// * `nonce` - The nonce found by proof-of-work
    /// * `block_hash` - The hash the miner claims that nonce produces
    ///
    /// # Returns
    ///
    /// The accepted block, now the chain tip
    pub fn submit_mined_block(
        &mut self,
        block_data_hash: &str,
        date_created: &str,
        nonce: u64,
        block_hash: &str,
    ) -> Result<Block, BlockchainError> {
        let Some(job) = self.mining_jobs.get(block_data_hash) else {
            return Err(BlockchainError::JobNotFound(block_data_hash.to_string()));
        };

        // Work on a copy so a rejected submission leaves the job as-is
        let mut candidate = job.clone();
        candidate.nonce = nonce;
        candidate.date_created = date_created.to_string();
        candidate.block_hash = candidate.compute_block_hash();

        if candidate.block_hash != block_hash {
            return Err(BlockchainError::HashMismatch {
                recomputed: candidate.block_hash,
                claimed: block_hash.to_string(),
            });
        }

        if !validation::hash_meets_difficulty(&candidate.block_hash, candidate.difficulty) {
            return Err(BlockchainError::DifficultyNotMet {
                difficulty: candidate.difficulty,
                hash: candidate.block_hash,
            });
        }

        self.extend_chain(candidate)
    }

    /// Appends a validated candidate to the chain
    ///
    /// This is the single mutation point of the chain. On success every
    /// outstanding mining job is invalidated, since each one committed to
    /// the old tip, and the pending pool is purged of transactions the new
    /// block confirmed as well as of transactions whose sender can no
    /// longer pay the fee.
    pub fn extend_chain(&mut self, candidate: Block) -> Result<Block, BlockchainError> {
        let next_index = self.chain_length();
        if candidate.block_index != next_index {
            return Err(BlockchainError::StaleBlock {
                expected: next_index,
                got: candidate.block_index,
            });
        }

        let tip_hash = self.last_block().block_hash.clone();
        if candidate.previous_block_hash != tip_hash {
            return Err(BlockchainError::BrokenLink {
                expected: tip_hash,
                got: candidate.previous_block_hash,
            });
        }

        info!(
            "Extending chain with block {} ({} transactions, difficulty {})",
            candidate.block_index,
            candidate.transactions.len(),
            candidate.difficulty
        );
        self.blocks.push(candidate);

        // Every outstanding job committed to the old tip and is unmineable
        self.mining_jobs.clear();
        self.job_order.clear();

        // Drop pool entries the new block confirmed
        let mined: HashSet<String> = self
            .last_block()
            .transactions
            .iter()
            .map(|t| t.transaction_data_hash.clone())
            .collect();
        self.pending_transactions
            .retain(|t| !mined.contains(&t.transaction_data_hash));

        // Then anything whose sender can no longer cover its fee
        let balances = self.confirmed_balances();
        let before = self.pending_transactions.len();
        self.pending_transactions
            .retain(|t| balances.get(&t.from).copied().unwrap_or(0) >= t.fee as i64);
        let purged = before - self.pending_transactions.len();
        if purged > 0 {
            warn!("Purged {} stale pending transaction(s)", purged);
        }

        Ok(self.last_block().clone())
    }

    /// Computes the three balance tiers of an address
    ///
    /// A pure function of the blocks and the pending pool: computing it
    /// twice with no intervening state change yields identical results.
    pub fn get_balance(&self, address: &str) -> Result<AccountBalance, BlockchainError> {
        if !validation::is_valid_address(address) {
            return Err(ValidationError::InvalidAddress(address.to_string()).into());
        }

        let chain_length = self.chain_length();
        let safe_depth = self.config.safe_confirm_count;
        let mut balance = AccountBalance {
            safe_balance: 0,
            confirmed_balance: 0,
            pending_balance: 0,
        };

        for transaction in self.get_transaction_history(address)? {
            let confirmations = transaction.confirmations(chain_length);
            let fee = transaction.fee as i64;
            let value = transaction.value as i64;
            let mined = transaction.mined_in_block_index.is_some();
            let successful = transaction.transfer_successful == Some(true);

            if transaction.from == address {
                if mined {
                    balance.pending_balance -= fee;
                    if successful {
                        balance.pending_balance -= value;
                    }
                } else {
                    // A pool transaction is expected to execute in full
                    balance.pending_balance -= fee + value;
                }
                if confirmations >= 1 {
                    balance.confirmed_balance -= fee;
                    if successful {
                        balance.confirmed_balance -= value;
                    }
                }
                if confirmations >= safe_depth {
                    balance.safe_balance -= fee;
                    if successful {
                        balance.safe_balance -= value;
                    }
                }
            }

            if transaction.to == address {
                if !mined || successful {
                    balance.pending_balance += value;
                }
                if confirmations >= 1 && successful {
                    balance.confirmed_balance += value;
                }
                if confirmations >= safe_depth && successful {
                    balance.safe_balance += value;
                }
            }
        }

        Ok(balance)
    }

    /// Gets all transactions touching an address, ordered by creation date
    /// ascending
    pub fn get_transaction_history(
        &self,
        address: &str,
    ) -> Result<Vec<Transaction>, BlockchainError> {
        if !validation::is_valid_address(address) {
            return Err(ValidationError::InvalidAddress(address.to_string()).into());
        }

        let mut transactions: Vec<Transaction> = self
            .all_transactions()
            .into_iter()
            .filter(|t| t.from == address || t.to == address)
            .collect();
        transactions.sort_by(|a, b| a.date_created.cmp(&b.date_created));

        Ok(transactions)
    }

    /// Gets every address that appears in a confirmed transaction
    pub fn get_all_addresses(&self) -> Vec<String> {
        let mut addresses = BTreeSet::new();
        for block in &self.blocks {
            for transaction in &block.transactions {
                addresses.insert(transaction.from.clone());
                addresses.insert(transaction.to.clone());
            }
        }
        addresses.into_iter().collect()
    }

    /// Computes the cumulative proof-of-work weight of the chain
    pub fn cumulative_difficulty(&self) -> u128 {
        Self::cumulative_difficulty_of(&self.blocks)
    }

    fn cumulative_difficulty_of(blocks: &[Block]) -> u128 {
        blocks
            .iter()
            .map(|b| 16u128.saturating_pow(b.difficulty))
            .sum()
    }

    /// Checks the integrity of a candidate chain
    ///
    /// The genesis block must match the fixed constant exactly, every block
    /// must link to its predecessor, and every hash must be recomputable
    /// from the committed fields and meet the block's claimed difficulty.
    pub fn is_chain_valid(blocks: &[Block]) -> bool {
        let Some(genesis) = blocks.first() else {
            return false;
        };
        if !genesis.is_genesis() {
            return false;
        }

        for window in blocks.windows(2) {
            let (previous, current) = (&window[0], &window[1]);

            if current.block_index != previous.block_index + 1 {
                return false;
            }
            if current.previous_block_hash != previous.block_hash {
                return false;
            }
            if current.compute_data_hash() != current.block_data_hash {
                return false;
            }
            if current.compute_block_hash() != current.block_hash {
                return false;
            }
            if !validation::hash_meets_difficulty(&current.block_hash, current.difficulty) {
                return false;
            }
        }

        true
    }

    /// Replaces the local chain with a peer's when it is valid and carries
    /// strictly more cumulative proof-of-work
    ///
    /// # Returns
    ///
    /// Whether the peer chain was adopted
    pub fn try_adopt_chain(&mut self, peer_blocks: Vec<Block>) -> Result<bool, BlockchainError> {
        if !Self::is_chain_valid(&peer_blocks) {
            return Err(BlockchainError::InvalidChain);
        }

        let peer_weight = Self::cumulative_difficulty_of(&peer_blocks);
        let local_weight = self.cumulative_difficulty();
        if peer_weight <= local_weight {
            debug!(
                "Keeping local chain: peer weight {} does not exceed local weight {}",
                peer_weight, local_weight
            );
            return Ok(false);
        }

        info!(
            "Adopting peer chain: {} blocks, cumulative difficulty {}",
            peer_blocks.len(),
            peer_weight
        );
        self.blocks = peer_blocks;
        self.mining_jobs.clear();
        self.job_order.clear();

        // The adopted chain may confirm transactions still in our pool
        let confirmed: HashSet<String> = self
            .blocks
            .iter()
            .flat_map(|b| b.transactions.iter())
            .map(|t| t.transaction_data_hash.clone())
            .collect();
        self.pending_transactions
            .retain(|t| !confirmed.contains(&t.transaction_data_hash));

        Ok(true)
    }

    /// Restores the ledger to a genesis-only chain
    pub fn reset(&mut self) {
        self.blocks = vec![Block::genesis()];
        self.pending_transactions.clear();
        self.mining_jobs.clear();
        self.job_order.clear();
        self.current_difficulty = self.config.initial_difficulty;
        info!("Chain reset to genesis");
    }

    fn remove_pending_transactions(&mut self, hashes: &[String]) {
        let to_remove: HashSet<&String> = hashes.iter().collect();
        self.pending_transactions
            .retain(|t| !to_remove.contains(&t.transaction_data_hash));
    }
}

impl Default for Blockchain {
    fn default() -> Self {
        Self::new(ChainConfig::default())
    }
}
