//! Byzantine agreement manager for the manifold consensus node.
//!
//! Every round, the protocol runs one Byzantine agreement instance per
//! chain. This crate provides the orchestrator around those instances:
//!
//! - [`AgreementManager`]: owns the per-chain instances, appends round
//!   configurations, dispatches votes/blocks/results, and supervises one
//!   driver task per chain
//! - [`Agreement`]: the contract of the inner voting state machine
//! - [`VoteFilter`] / [`ResultCache`]: cheap drop paths for replayed gossip
//! - [`Ticker`]: the λ-periodic clock driving agreement state transitions
//! - Service traits ([`Lattice`], [`Application`], [`Governance`],
//!   [`NodeSetCache`], [`Signer`], [`Network`]) for the node's shared
//!   collaborators
//!
//! # Architecture
//!
//! ```text
//! network ──▶ dispatchers ──▶ agreement instance (one per chain)
//!                                   │ confirmed block + result
//!                                   ▼
//!                            chain receiver ── restart channel ──▶ driver
//!                                   ▲                                │
//!                                   └── restart(next position) ◀────┘
//! ```
//!
//! Drivers are cooperative tokio tasks. The manager's reader-writer lock
//! guards only the inventory; each instance synchronizes internally, so
//! dispatchers and drivers never contend on a global lock while the
//! protocol is running.

mod agreement;
mod config;
mod driver;
mod error;
mod filter;
mod leader;
mod manager;
mod receiver;
mod result_cache;
mod shutdown;
mod ticker;
mod traits;

pub use agreement::{Agreement, AgreementFactory};
pub use config::RoundConfig;
pub use error::{AgreementError, CacheError, ConsensusError, LatticeError};
pub use filter::VoteFilter;
pub use leader::{leader_validator, LeaderValidator};
pub use manager::{AgreementManager, AgreementManagerBuilder, BuildError};
pub use receiver::ChainReceiver;
pub use result_cache::{ResultCache, MAX_RESULT_CACHE};
pub use shutdown::{Shutdown, ShutdownSignal};
pub use ticker::{new_ba_ticker, Ticker};
pub use traits::{
    config_or_abort, crs_or_abort, Application, BlockVerdict, Governance, Lattice, Network,
    NodeSetCache, Signer,
};
