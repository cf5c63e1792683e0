use log::info;
use thiserror::Error;

use super::block::Block;
use super::chain::BlockchainError;
use super::node::Node;

/// Errors that can occur while synchronizing with a peer
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Failed to fetch chain from peer: {0}")]
    Fetch(#[source] anyhow::Error),

    #[error(transparent)]
    Blockchain(#[from] BlockchainError),
}

/// Outcome of one synchronization attempt against a peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The peer chain was valid and heavier, and replaced the local chain
    Adopted {
        chain_length: u64,
        cumulative_difficulty: u128,
    },

    /// The peer chain carried no more work than ours; local state is
    /// untouched
    KeptLocal,
}

/// Source of peer chains, implemented by the network collaborator
///
/// Transport and wire format are the implementer's concern; the ledger only
/// requires the peer's blocks in chain order.
pub trait PeerChainProvider {
    fn fetch_peer_chain(&self, peer_endpoint: &str) -> anyhow::Result<Vec<Block>>;
}

/// Fetches a peer's chain and adopts it when it is valid and strictly
/// heavier than ours
///
/// Validation and the cumulative-difficulty comparison happen inside the
/// ledger's critical section, so a concurrent mining submission can never
/// interleave with the adoption. A chain with more blocks but less
/// accumulated work is never adopted.
///
/// # Arguments
///
/// * `node` - The local ledger handle
/// * `provider` - The network collaborator serving peer chains
/// * `peer_endpoint` - Which peer to synchronize against
pub fn synchronize_from_peer(
    node: &Node,
    provider: &impl PeerChainProvider,
    peer_endpoint: &str,
) -> Result<SyncOutcome, SyncError> {
    let peer_blocks = provider
        .fetch_peer_chain(peer_endpoint)
        .map_err(SyncError::Fetch)?;

    if node.try_adopt_chain(peer_blocks)? {
        let outcome = SyncOutcome::Adopted {
            chain_length: node.chain_length(),
            cumulative_difficulty: node.cumulative_difficulty(),
        };
        info!("Synchronized from peer {}", peer_endpoint);
        Ok(outcome)
    } else {
        Ok(SyncOutcome::KeptLocal)
    }
}
