//! Foundational types for the manifold consensus node.
//!
//! This crate provides the types shared across the agreement layer:
//!
//! - **Primitives**: [`Hash`], [`Signature`]
//! - **Identifiers**: [`NodeId`], [`Crs`], [`Position`]
//! - **Agreement types**: [`Vote`], [`Block`], [`AgreementResult`]
//! - **Round parameters**: [`ProtocolConfig`], [`NodeSet`] subset selection
//!
//! # Design Philosophy
//!
//! This crate is self-contained with minimal dependencies. It does not
//! depend on any other workspace crates, making it the foundation layer.

mod block;
mod config;
mod hash;
mod identifiers;
mod nodeset;
mod position;
mod vote;

pub use block::Block;
pub use config::ProtocolConfig;
pub use hash::Hash;
pub use identifiers::{Crs, NodeId};
pub use nodeset::{notary_set_target, NodeSet, SubsetTarget};
pub use position::{Position, STOP_CHAIN_ID};
pub use vote::{AgreementResult, Signature, Vote, VoteType};

/// Test utilities.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils {
    use super::*;
    use std::time::SystemTime;

    /// Create a test NodeId from a seed byte.
    pub fn test_node(seed: u8) -> NodeId {
        NodeId(Hash::digest(&[b'n', seed]))
    }

    /// Create a node set from sequential seeds.
    pub fn test_node_set(count: u8) -> NodeSet {
        (0..count).map(test_node).collect()
    }

    /// Create a commit vote at `position` from the seeded node.
    pub fn test_vote(seed: u8, position: Position) -> Vote {
        Vote {
            voter: test_node(seed),
            vote_type: VoteType::Commit,
            block_hash: Hash::digest(&[b'b', seed]),
            period: 0,
            position,
            signature: Signature::default(),
        }
    }

    /// Create a minimal block at `position` with the given timestamp.
    pub fn test_block(seed: u8, position: Position, timestamp: SystemTime) -> Block {
        Block {
            hash: Hash::digest(&[b'h', seed]),
            parent_hash: Hash::digest(&[b'p', seed]),
            position,
            proposer: test_node(seed),
            timestamp,
            payload: vec![],
            signature: Signature::default(),
        }
    }
}
