//! The per-chain capability handle shared with the agreement instance.
//!
//! The inner agreement never holds a back-pointer to the consensus object.
//! It gets this small handle instead: the round the driver is running, the
//! notary flag, the change-notary deadline, and the restart channel it must
//! kick after a block is confirmed. The driver owns the consuming end of
//! the restart channel.

use manifold_types::Position;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::warn;

/// Capacity of the restart channel.
///
/// One slot is enough: the driver's round-entry kick is the only write that
/// can race a confirmation, and the driver drains before each state step.
const RESTART_CHANNEL_CAPACITY: usize = 1;

/// Shared state between one chain's driver and its agreement instance.
#[derive(Debug)]
pub struct ChainReceiver {
    chain_id: u32,
    round: AtomicU64,
    is_notary: AtomicBool,
    change_notary_time: Mutex<Option<Instant>>,
    restart_tx: mpsc::Sender<Position>,
}

impl ChainReceiver {
    /// Create the handle plus the driver-owned consuming end of the restart
    /// channel.
    pub fn new(chain_id: u32) -> (Arc<Self>, mpsc::Receiver<Position>) {
        let (restart_tx, restart_rx) = mpsc::channel(RESTART_CHANNEL_CAPACITY);
        let receiver = Arc::new(Self {
            chain_id,
            round: AtomicU64::new(0),
            is_notary: AtomicBool::new(false),
            change_notary_time: Mutex::new(None),
            restart_tx,
        });
        (receiver, restart_rx)
    }

    /// Chain this handle belongs to.
    pub fn chain_id(&self) -> u32 {
        self.chain_id
    }

    /// Round the driver is currently running.
    pub fn round(&self) -> u64 {
        self.round.load(Ordering::Acquire)
    }

    /// Store the round at round entry.
    pub fn set_round(&self, round: u64) {
        self.round.store(round, Ordering::Release);
    }

    /// Whether this node is in the chain's notary set this round.
    pub fn is_notary(&self) -> bool {
        self.is_notary.load(Ordering::Acquire)
    }

    /// Update the notary flag at round entry.
    pub fn set_notary(&self, is_notary: bool) {
        self.is_notary.store(is_notary, Ordering::Release);
    }

    /// Deadline after which the notary set rotates.
    pub fn change_notary_time(&self) -> Option<Instant> {
        *self
            .change_notary_time
            .lock()
            .expect("change_notary_time lock poisoned")
    }

    /// Set the rotation deadline at round entry.
    pub fn set_change_notary_time(&self, deadline: Instant) {
        *self
            .change_notary_time
            .lock()
            .expect("change_notary_time lock poisoned") = Some(deadline);
    }

    /// Kick the driver to restart agreement at the next height.
    ///
    /// Called by the agreement instance on block confirmation and by the
    /// driver itself at round entry. The channel has one slot; the protocol
    /// guarantees no write ever finds it full.
    pub fn notify_restart(&self, position: Position) {
        if let Err(err) = self.restart_tx.try_send(position) {
            warn!(
                chain_id = self.chain_id,
                position = %position,
                error = %err,
                "restart channel rejected notification"
            );
        }
    }
}
