//! Votes cast by notaries during Byzantine agreement, and the aggregated
//! result bundle a confirmed agreement emits.

use crate::{Hash, NodeId, Position};
use std::fmt;

/// The kind of ballot a vote carries.
///
/// The inner agreement protocol advances through init / pre-commit / commit
/// ballots per period, with fast-path variants when the leader is honest and
/// timely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoteType {
    /// Initial ballot announcing the voter's candidate.
    Init,
    /// Pre-commit ballot for the leading candidate.
    PreCommit,
    /// Commit ballot locking the candidate.
    Commit,
    /// Fast-path ballot for the leader's block.
    Fast,
    /// Fast-path commit.
    FastCommit,
}

/// An opaque signature attached by the signer service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Signature(pub Vec<u8>);

impl Signature {
    /// Whether a signature has been attached.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A single notary ballot for a block at a position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vote {
    /// The notary casting the vote.
    pub voter: NodeId,
    /// Ballot kind.
    pub vote_type: VoteType,
    /// The block being voted for.
    pub block_hash: Hash,
    /// Agreement period the ballot belongs to. Periods restart at zero for
    /// every position.
    pub period: u64,
    /// The slot being decided.
    pub position: Position,
    /// Signature over the ballot, attached by the signer.
    pub signature: Signature,
}

impl Vote {
    /// Deduplication key: one ballot per `(voter, position, period, type)`.
    pub fn dedup_key(&self) -> (NodeId, Position, u64, VoteType) {
        (self.voter, self.position, self.period, self.vote_type)
    }
}

impl fmt::Display for Vote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Vote({:?} p{} {} by {})",
            self.vote_type, self.period, self.position, self.voter
        )
    }
}

/// The bundle a confirmed agreement emits: the decided block hash plus the
/// votes that confirmed it. Peers use it to slow- or fast-sync their own
/// instance for the same chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgreementResult {
    /// The decided slot.
    pub position: Position,
    /// Hash of the decided block.
    pub block_hash: Hash,
    /// Confirming votes.
    pub votes: Vec<Vote>,
}
