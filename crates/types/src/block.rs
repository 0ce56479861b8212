//! Blocks proposed by per-position leaders.

use crate::{Hash, NodeId, Position, Signature};
use std::time::SystemTime;

/// A block proposed for one position of one chain.
///
/// Execution payloads are opaque here; the agreement layer decides *which*
/// block wins a position, never what it contains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Content hash of the block.
    pub hash: Hash,
    /// Hash of the previous block on the same chain.
    pub parent_hash: Hash,
    /// The slot this block is proposed for.
    pub position: Position,
    /// The leader that proposed it.
    pub proposer: NodeId,
    /// Proposer-declared wall-clock timestamp.
    pub timestamp: SystemTime,
    /// Opaque transaction payload.
    pub payload: Vec<u8>,
    /// Proposer signature.
    pub signature: Signature,
}

impl Block {
    /// Whether this block extends the genesis position of its chain.
    pub fn is_genesis(&self) -> bool {
        self.position.height == 0 && self.parent_hash.is_zero()
    }
}
