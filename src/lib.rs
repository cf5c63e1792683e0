//! A single-node blockchain ledger.
//!
//! The ledger keeps an append-only chain of blocks holding signed
//! value-transfer transactions, offers proof-of-work mining jobs to
//! external miners, and answers balance queries at three confirmation
//! tiers (pending, confirmed, safe).
//!
//! [`Blockchain`] is the engine itself; [`Node`] wraps it in a single
//! lock for use from concurrent request handlers and adds an embedded
//! miner. HTTP endpoints, peer discovery and persistence are external
//! collaborators built on top of these types; the peer-synchronization
//! seam is the [`PeerChainProvider`] trait.

pub mod blockchain;

pub use blockchain::{
    mine_candidate, synchronize_from_peer, AccountBalance, Block, Blockchain, BlockchainError,
    ChainConfig, Node, PeerChainProvider, SignaturePair, SyncError, SyncOutcome, Transaction,
    TransactionData, ValidationError, Wallet,
};
