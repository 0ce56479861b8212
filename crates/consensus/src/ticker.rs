//! The agreement clock.
//!
//! Each per-chain driver owns one ticker whose period is the round's λ.
//! Built on a non-queuing interval: pulses missed while the driver was
//! suspended are skipped, never delivered in a burst.

use crate::traits::{config_or_abort, Governance};
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// Periodic pulse source clocking an agreement state machine.
#[derive(Debug)]
pub struct Ticker {
    interval: Interval,
    period: Duration,
}

impl Ticker {
    /// Ticker whose first pulse fires one full period from now.
    pub fn new(period: Duration) -> Self {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self { interval, period }
    }

    /// Wait for the next pulse.
    pub async fn tick(&mut self) {
        self.interval.tick().await;
    }

    /// Reset the cadence: the next pulse fires one full period from now.
    pub fn restart(&mut self) {
        self.interval.reset();
    }

    /// The configured pulse period.
    pub fn period(&self) -> Duration {
        self.period
    }
}

/// Build the agreement ticker for a round from governance parameters.
pub fn new_ba_ticker(gov: &dyn Governance, round: u64) -> Ticker {
    let config = config_or_abort(gov, round);
    Ticker::new(config.lambda_ba)
}
