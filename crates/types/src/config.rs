//! Per-round protocol parameters published by governance.

use std::time::Duration;

/// The governance-published configuration for one round.
///
/// Immutable once published; the agreement manager derives its own schedule
/// (begin/end times) by chaining `round_interval` across appended rounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolConfig {
    /// Number of parallel chains running agreement this round.
    pub num_chains: u32,
    /// Wall-clock length of the round.
    pub round_interval: Duration,
    /// Size of the per-chain notary subset.
    pub notary_set_size: u32,
    /// Agreement clock period (λ).
    pub lambda_ba: Duration,
}
