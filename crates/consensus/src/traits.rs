//! Contracts of the services the agreement manager depends on.
//!
//! The manager never owns these collaborators; it receives them as shared
//! trait objects at construction. All of them are presumed thread-safe.

use crate::error::{CacheError, LatticeError};
use manifold_types::{Block, Crs, Hash, NodeId, NodeSet, Position, ProtocolConfig, Vote};
use std::collections::HashSet;
use tokio::time::Instant;

/// The local multi-chain DAG of confirmed blocks.
pub trait Lattice: Send + Sync {
    /// Structural and ancestry validation of a proposed block.
    ///
    /// `strict` additionally requires the block to chain onto the current
    /// tip. [`LatticeError::RetrySanityCheckLater`] means the verdict is
    /// not reachable yet, not that the block is bad.
    fn sanity_check(&self, block: &Block, strict: bool) -> Result<(), LatticeError>;

    /// Earliest acceptable `(height, time)` for the next block of a chain
    /// in a round.
    fn next_block(&self, round: u64, chain_id: u32) -> Result<(u64, Instant), LatticeError>;

    /// Highest round for which this chain has a block in the local DAG.
    fn tip_round(&self, chain_id: u32) -> u64;
}

/// Application verdict for a proposed block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockVerdict {
    /// The block is acceptable.
    Valid,
    /// The block is permanently unacceptable.
    Invalid,
    /// The application cannot decide yet; ask again later.
    RetryLater,
}

/// The application layer that executes confirmed blocks.
pub trait Application: Send + Sync {
    /// Judge a proposed block's payload.
    fn verify_block(&self, block: &Block) -> BlockVerdict;
}

/// On-chain governance: the source of per-round parameters.
pub trait Governance: Send + Sync {
    /// Protocol configuration for a round, if published.
    fn config(&self, round: u64) -> Option<ProtocolConfig>;

    /// Common random seed for a round, if published.
    fn crs(&self, round: u64) -> Option<Crs>;
}

/// Fetch a round's configuration, aborting on absence.
///
/// Governance data for a reachable round must exist; a miss here means the
/// node's state is corrupt beyond local recovery.
pub fn config_or_abort(gov: &dyn Governance, round: u64) -> ProtocolConfig {
    match gov.config(round) {
        Some(cfg) => cfg,
        None => panic!("governance config missing for reachable round {round}: state corrupt"),
    }
}

/// Fetch a round's CRS, aborting on absence.
pub fn crs_or_abort(gov: &dyn Governance, round: u64) -> Crs {
    match gov.crs(round) {
        Some(crs) => crs,
        None => panic!("governance crs missing for reachable round {round}: state corrupt"),
    }
}

/// Cache of per-round node sets and derived lookups.
pub trait NodeSetCache: Send + Sync {
    /// The full node set of a round.
    fn node_set(&self, round: u64) -> Result<NodeSet, CacheError>;

    /// The notary subset for `(round, chain_id)`.
    fn notary_set(&self, round: u64, chain_id: u32) -> Result<HashSet<NodeId>, CacheError>;

    /// The elected leader for a position.
    fn leader_node(&self, position: Position) -> Result<NodeId, CacheError>;
}

/// Attaches this node's signature to outgoing votes.
pub trait Signer: Send + Sync {
    /// Sign `vote` in place.
    fn sign_vote(&self, vote: &mut Vote);
}

/// Best-effort pull interface to the gossip network.
pub trait Network: Send + Sync {
    /// Ask peers for votes at a position.
    fn pull_votes(&self, position: Position);

    /// Ask peers for blocks by hash.
    fn pull_blocks(&self, hashes: Vec<Hash>);
}
