//! The manager's per-round schedule entry.

use manifold_types::{Crs, ProtocolConfig};
use std::time::Duration;
use tokio::time::Instant;

/// One round of the agreement schedule.
///
/// Built from the governance [`ProtocolConfig`] when the round is appended;
/// `begin_time` chains off the previous round's end, so the registry as a
/// whole forms a gapless timeline.
#[derive(Debug, Clone)]
pub struct RoundConfig {
    /// When the round starts.
    pub begin_time: Instant,
    /// Number of chains running agreement this round.
    pub num_chains: u32,
    /// Length of the round.
    pub round_interval: Duration,
    /// Size of each chain's notary subset.
    pub notary_set_size: u32,
    /// Agreement clock period (λ).
    pub lambda_ba: Duration,
    /// Common random seed for the round.
    pub crs: Crs,
}

impl RoundConfig {
    /// Build the schedule entry for a round beginning at `begin_time`.
    pub fn new(begin_time: Instant, config: &ProtocolConfig, crs: Crs) -> Self {
        Self {
            begin_time,
            num_chains: config.num_chains,
            round_interval: config.round_interval,
            notary_set_size: config.notary_set_size,
            lambda_ba: config.lambda_ba,
            crs,
        }
    }

    /// When the round ends (and the next one begins).
    pub fn end_time(&self) -> Instant {
        self.begin_time + self.round_interval
    }
}
