//! Error types for the agreement manager.

use thiserror::Error;

/// Errors surfaced by the agreement manager and its per-chain drivers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsensusError {
    /// `append_config` was called with a round that does not extend the
    /// registry by exactly one.
    #[error("round is not increasing")]
    RoundNotIncreasing,

    /// A vote, block, or result referenced a chain this manager does not
    /// run.
    #[error("invalid chain id {chain_id} (known chains: {known_chains})")]
    InvalidChainId { chain_id: u32, known_chains: usize },

    /// A leader candidate failed application verification.
    #[error("invalid block proposed as leader candidate")]
    InvalidBlock,

    /// The inner agreement instance rejected an input or faulted.
    #[error(transparent)]
    Agreement(#[from] AgreementError),

    /// The node-set cache could not serve a lookup.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// A non-retriable lattice failure.
    #[error(transparent)]
    Lattice(#[from] LatticeError),
}

/// Errors from the inner agreement black box.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AgreementError {
    /// The instance rejected a vote.
    #[error("agreement rejected vote: {0}")]
    InvalidVote(String),

    /// The instance rejected a block.
    #[error("agreement rejected block: {0}")]
    InvalidBlock(String),

    /// The clocked state machine faulted and cannot continue.
    #[error("agreement state fault: {0}")]
    StateFault(String),
}

/// Errors from the lattice (the local multi-chain DAG).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LatticeError {
    /// The block cannot be judged yet; retry once more context arrives.
    #[error("sanity check should be retried later")]
    RetrySanityCheckLater,

    /// The lattice has no acceptable next slot for the queried chain yet.
    #[error("next block for round {round} chain {chain_id} is not ready")]
    NextBlockNotReady { round: u64, chain_id: u32 },

    /// The block is structurally invalid.
    #[error("invalid block: {0}")]
    InvalidBlock(String),
}

/// Errors from the node-set cache.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// The round's node set has not been cached.
    #[error("node set for round {0} is not cached")]
    RoundNotCached(u64),

    /// No leader is known for the position.
    #[error("no leader known for position {0}")]
    LeaderUnknown(manifold_types::Position),
}
