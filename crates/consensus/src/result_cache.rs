//! Bounded memory of already-processed agreement results.

use manifold_types::Position;
use std::collections::HashSet;

/// Default capacity of the processed-result cache.
pub const MAX_RESULT_CACHE: usize = 100;

/// Remembers which result positions have been handled so duplicate gossip
/// is dropped cheaply.
///
/// Eviction removes an arbitrary entry: collisions are positional and
/// positions progress monotonically, so recency ordering buys nothing.
/// Access must be serialized by the caller; the result-ingest path is
/// single-threaded by contract.
#[derive(Debug)]
pub struct ResultCache {
    positions: HashSet<Position>,
    capacity: usize,
}

impl ResultCache {
    /// Cache with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(MAX_RESULT_CACHE)
    }

    /// Cache with an explicit capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            positions: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    /// Record a position as processed.
    ///
    /// Returns true the first time a position is seen. When the cache is
    /// over capacity one arbitrary entry is evicted first.
    pub fn touch(&mut self, position: Position) -> bool {
        if self.positions.contains(&position) {
            return false;
        }
        if self.positions.len() > self.capacity {
            if let Some(evict) = self.positions.iter().next().copied() {
                self.positions.remove(&evict);
            }
        }
        self.positions.insert(position);
        true
    }

    /// Forget a position so it can be processed again.
    pub fn untouch(&mut self, position: &Position) {
        self.positions.remove(position);
    }

    /// Number of remembered positions.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new()
    }
}
