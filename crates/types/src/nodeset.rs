//! The round node set and deterministic subset selection.
//!
//! Every round has one node set. Per-chain notary subsets are carved out of
//! it by ranking node identities against a target digest derived from the
//! round's common random seed and the chain ID; every honest node derives
//! the same subset without communication.

use crate::{Crs, Hash, NodeId};
use std::collections::{BTreeSet, HashSet};

/// Selection target for a notary subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubsetTarget(Hash);

/// Derive the notary-subset target for `(crs, chain_id)`.
pub fn notary_set_target(crs: Crs, chain_id: u32) -> SubsetTarget {
    SubsetTarget(Hash::digest_parts(&[
        b"notary-set",
        crs.as_bytes(),
        &chain_id.to_le_bytes(),
    ]))
}

/// The full set of eligible nodes for a round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeSet {
    ids: BTreeSet<NodeId>,
}

impl NodeSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node. Returns false when already present.
    pub fn add(&mut self, id: NodeId) -> bool {
        self.ids.insert(id)
    }

    /// Number of nodes in the set.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Whether `id` is in the set.
    pub fn contains(&self, id: &NodeId) -> bool {
        self.ids.contains(id)
    }

    /// Iterate the set in identity order.
    pub fn iter(&self) -> impl Iterator<Item = &NodeId> {
        self.ids.iter()
    }

    /// Select the `size` nodes closest to `target`.
    ///
    /// Closeness is the digest of `(target, node)`, so membership changes
    /// completely between targets. When the set is smaller than `size` the
    /// whole set is returned.
    pub fn subset(&self, size: usize, target: &SubsetTarget) -> HashSet<NodeId> {
        let mut ranked: Vec<(Hash, NodeId)> = self
            .ids
            .iter()
            .map(|id| {
                let rank = Hash::digest_parts(&[target.0.as_bytes(), id.as_bytes()]);
                (rank, *id)
            })
            .collect();
        ranked.sort();
        ranked.into_iter().take(size).map(|(_, id)| id).collect()
    }
}

impl FromIterator<NodeId> for NodeSet {
    fn from_iter<T: IntoIterator<Item = NodeId>>(iter: T) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}
