use serde::{Deserialize, Serialize};

use super::crypto::SignaturePair;

/// Sentinel hash carried by the genesis block in place of a real
/// previous-block hash, data hash and block hash.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Timestamp of the genesis block. Fixed so every node derives an
/// identical genesis record.
pub const GENESIS_DATE: &str = "2025-01-01T00:00:00.000Z";

/// Burn address used as the sender of coinbase transactions.
pub const NULL_ADDRESS: &str = "0000000000000000000000000000000000000000";

/// Well-known public key carried by coinbase transactions.
pub const NULL_PUBLIC_KEY: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// Well-known signature carried by coinbase transactions. Never verified.
pub fn null_signature() -> SignaturePair {
    [GENESIS_HASH.to_string(), GENESIS_HASH.to_string()]
}

/// Chain-wide parameters.
///
/// The difficulty is the starting value only; the ledger keeps its own
/// mutable copy that can be adjusted at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Number of leading zero hex digits a block hash must carry.
    pub initial_difficulty: u32,

    /// Base reward of a mined block, before collected fees.
    pub block_reward: u64,

    /// Upper bound on a single transaction fee.
    pub max_transaction_fee: u64,

    /// Upper bound on a single transfer value.
    pub max_transfer_value: u64,

    /// Confirmation depth at which a transaction counts toward the safe
    /// balance tier.
    pub safe_confirm_count: u64,

    /// Upper bound on simultaneously outstanding mining jobs.
    pub max_mining_jobs: usize,
}

impl Default for ChainConfig {
    fn default() -> Self {
        ChainConfig {
            initial_difficulty: 4,
            block_reward: 5_000_000,
            max_transaction_fee: 1_000_000,
            // Largest integer exactly representable by implementations that
            // carry amounts in a double-precision float.
            max_transfer_value: 9_007_199_254_740_991,
            safe_confirm_count: 6,
            max_mining_jobs: 64,
        }
    }
}
