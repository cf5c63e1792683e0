use serde::{Deserialize, Serialize};

use super::config::{GENESIS_DATE, GENESIS_HASH, NULL_ADDRESS};
use super::crypto;
use super::transaction::Transaction;

/// Represents a block in the blockchain
///
/// A block starts life as a mining candidate with a fixed data hash and a
/// mutable nonce and timestamp; once accepted into the chain it never
/// changes again.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Index of the block in the chain (0 = genesis)
    pub block_index: u64,

    /// Transactions included in this block, coinbase first
    pub transactions: Vec<Transaction>,

    /// Number of leading zero hex digits required of the block hash
    pub difficulty: u32,

    /// Hash of the previous block
    pub previous_block_hash: String,

    /// Address of the miner this block's candidate was prepared for
    pub mined_by: String,

    /// Pre-mining commitment over everything except nonce and timestamp
    pub block_data_hash: String,

    /// Proof-of-work nonce
    pub nonce: u64,

    /// Timestamp set when the block was mined (ISO-8601)
    pub date_created: String,

    /// Hash found by proof-of-work
    pub block_hash: String,

    /// Base block reward, before collected fees
    pub block_reward: u64,
}

/// Hashing preimage for the pre-mining commitment. Nonce and timestamp are
/// deliberately absent so mining only searches nonce space.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DataHashFields<'a> {
    block_index: u64,
    transactions: &'a [Transaction],
    difficulty: u32,
    previous_block_hash: &'a str,
    mined_by: &'a str,
    block_reward: u64,
}

impl Block {
    /// Builds a mining candidate with its data hash derived and the
    /// proof-of-work fields still unset
    pub fn candidate(
        block_index: u64,
        transactions: Vec<Transaction>,
        difficulty: u32,
        previous_block_hash: String,
        mined_by: String,
        block_reward: u64,
    ) -> Self {
        let mut block = Block {
            block_index,
            transactions,
            difficulty,
            previous_block_hash,
            mined_by,
            block_data_hash: String::new(),
            nonce: 0,
            date_created: String::new(),
            block_hash: String::new(),
            block_reward,
        };

        block.block_data_hash = block.compute_data_hash();
        block
    }

    /// Recomputes the pre-mining commitment from the committed fields
    pub fn compute_data_hash(&self) -> String {
        let fields = DataHashFields {
            block_index: self.block_index,
            transactions: &self.transactions,
            difficulty: self.difficulty,
            previous_block_hash: &self.previous_block_hash,
            mined_by: &self.mined_by,
            block_reward: self.block_reward,
        };

        let json = serde_json::to_string(&fields).unwrap();
        crypto::sha256_hex(json.as_bytes())
    }

    /// Recomputes the proof-of-work hash from the previous block hash, the
    /// nonce and the data hash
    pub fn compute_block_hash(&self) -> String {
        let preimage = format!(
            "{}{}{}",
            self.previous_block_hash, self.nonce, self.block_data_hash
        );
        crypto::sha256_hex(preimage.as_bytes())
    }

    /// The fixed genesis block: index 0, no transactions, nonce 0, and the
    /// sentinel hash in every hash slot
    pub fn genesis() -> Self {
        Block {
            block_index: 0,
            transactions: Vec::new(),
            difficulty: 0,
            previous_block_hash: GENESIS_HASH.to_string(),
            mined_by: NULL_ADDRESS.to_string(),
            block_data_hash: GENESIS_HASH.to_string(),
            nonce: 0,
            date_created: GENESIS_DATE.to_string(),
            block_hash: GENESIS_HASH.to_string(),
            block_reward: 0,
        }
    }

    /// Checks this block against the fixed genesis constant
    pub fn is_genesis(&self) -> bool {
        self.block_index == 0
            && self.nonce == 0
            && self.previous_block_hash == GENESIS_HASH
            && self.block_hash == GENESIS_HASH
            && self.transactions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::transaction::iso_timestamp_now;

    fn sample_candidate() -> Block {
        let coinbase = Transaction::coinbase(&"a".repeat(40), 5_000_000, 1, iso_timestamp_now());
        Block::candidate(
            1,
            vec![coinbase],
            2,
            GENESIS_HASH.to_string(),
            "a".repeat(40),
            5_000_000,
        )
    }

    #[test]
    fn test_candidate_commits_its_data_hash() {
        let block = sample_candidate();

        assert_eq!(block.block_data_hash, block.compute_data_hash());
        assert_eq!(block.block_data_hash.len(), 64);
    }

    #[test]
    fn test_nonce_is_outside_the_commitment() {
        let mut block = sample_candidate();
        let data_hash = block.block_data_hash.clone();
        let hash_at_zero = block.compute_block_hash();

        block.nonce = 42;
        block.date_created = iso_timestamp_now();

        // The commitment is unchanged while the block hash moves
        assert_eq!(block.compute_data_hash(), data_hash);
        assert_ne!(block.compute_block_hash(), hash_at_zero);
    }

    #[test]
    fn test_transactions_are_inside_the_commitment() {
        let mut block = sample_candidate();
        let data_hash = block.block_data_hash.clone();

        block.transactions[0].value += 1;
        assert_ne!(block.compute_data_hash(), data_hash);
    }

    #[test]
    fn test_genesis_block_constant() {
        let genesis = Block::genesis();

        assert_eq!(genesis.block_index, 0);
        assert_eq!(genesis.nonce, 0);
        assert_eq!(genesis.previous_block_hash, GENESIS_HASH);
        assert_eq!(genesis.block_hash, GENESIS_HASH);
        assert!(genesis.transactions.is_empty());
        assert!(genesis.is_genesis());
    }

    #[test]
    fn test_wire_field_names() {
        let block = sample_candidate();
        let json = serde_json::to_string(&block).unwrap();

        assert!(json.contains("\"blockIndex\""));
        assert!(json.contains("\"previousBlockHash\""));
        assert!(json.contains("\"minedBy\""));
        assert!(json.contains("\"blockDataHash\""));
        assert!(json.contains("\"blockHash\""));
        assert!(json.contains("\"blockReward\""));
    }
}
