//! Leader-candidate validation.
//!
//! Each agreement instance receives this predicate and applies it to blocks
//! proposed for the position it is deciding. "Not valid yet" is a normal
//! answer under network asynchrony and maps to `Ok(false)`; only permanent
//! rejection is an error.

use crate::error::{ConsensusError, LatticeError};
use crate::traits::{Application, BlockVerdict, Lattice};
use manifold_types::Block;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::debug;

/// Predicate deciding whether a block is acceptable as a position's leader
/// candidate.
pub type LeaderValidator = Arc<dyn Fn(&Block) -> Result<bool, ConsensusError> + Send + Sync>;

/// Compose the leader validator from timestamp, lattice, and application
/// checks.
pub fn leader_validator(lattice: Arc<dyn Lattice>, app: Arc<dyn Application>) -> LeaderValidator {
    Arc::new(move |block: &Block| {
        // A timestamp from the future is acceptable later, not never.
        if block.timestamp > SystemTime::now() {
            return Ok(false);
        }
        match lattice.sanity_check(block, true) {
            Ok(()) => {}
            Err(LatticeError::RetrySanityCheckLater) => return Ok(false),
            Err(err) => return Err(err.into()),
        }
        debug!(block = %block.hash, position = %block.position, "verifying leader candidate");
        match app.verify_block(block) {
            BlockVerdict::Invalid => Err(ConsensusError::InvalidBlock),
            BlockVerdict::RetryLater => Ok(false),
            BlockVerdict::Valid => Ok(true),
        }
    })
}
