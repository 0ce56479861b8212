//! Contract of the inner Byzantine agreement instance.
//!
//! The manager treats each instance as a black box: a clocked state machine
//! that decides one block per position. Everything here is the observable
//! surface the per-chain driver and the dispatchers rely on; the voting
//! logic behind it lives elsewhere.

use crate::error::AgreementError;
use crate::filter::VoteFilter;
use crate::leader::LeaderValidator;
use crate::receiver::ChainReceiver;
use crate::traits::Signer;
use manifold_types::{Block, Crs, NodeId, Position, Vote};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::watch;

/// One chain's Byzantine agreement state machine.
///
/// Implementations synchronize internally: the driver advances the clock
/// while dispatcher calls ingest votes and blocks concurrently.
pub trait Agreement: Send + Sync {
    /// The position this instance is currently deciding. A stop position
    /// means the instance has been shut down.
    fn agreement_id(&self) -> Position;

    /// Whether the current position has been decided.
    fn confirmed(&self) -> bool;

    /// Ingest a vote from the network or a replayed result bundle.
    fn process_vote(&self, vote: Vote) -> Result<(), AgreementError>;

    /// Ingest a proposed block.
    fn process_block(&self, block: Block) -> Result<(), AgreementError>;

    /// Push the instance's vote frontier into the chain's dedup filter.
    fn update_filter(&self, filter: &mut VoteFilter);

    /// Advance the clocked protocol by one state transition.
    fn next_state(&self) -> Result<(), AgreementError>;

    /// Ticker pulses that must elapse before the next `next_state` call.
    fn clocks(&self) -> usize;

    /// Level signal: true while the current position is decided. Observers
    /// may see it rise repeatedly across restarts without harm.
    fn done(&self) -> watch::Receiver<bool>;

    /// Whether the instance believes votes are missing and wants the
    /// network queried.
    fn pull_votes(&self) -> bool;

    /// Reinitialize for a new position with a fresh notary set and leader.
    fn restart(&self, notary_set: HashSet<NodeId>, position: Position, leader: NodeId, crs: Crs);

    /// Stop the instance: park it at a stop position and release every
    /// blocked waiter.
    fn stop(&self);
}

/// Builds agreement instances when a new chain appears.
///
/// The factory captures whatever the concrete protocol needs (keys, vote
/// assembly rules); the manager supplies the per-chain wiring.
pub trait AgreementFactory: Send + Sync {
    /// Create the instance for `chain_id`.
    ///
    /// `notary_set` is the subset for the chain's first round, so the
    /// instance can verify early votes before its driver performs the
    /// first restart.
    fn create(
        &self,
        chain_id: u32,
        notary_set: HashSet<NodeId>,
        receiver: Arc<ChainReceiver>,
        validate_leader: LeaderValidator,
        signer: Arc<dyn Signer>,
    ) -> Arc<dyn Agreement>;
}
