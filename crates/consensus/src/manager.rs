//! The Byzantine agreement manager.
//!
//! Owns one agreement instance per chain, appends per-round configurations
//! as governance publishes them, routes inbound votes, blocks, and peer
//! results to the right instance, and runs one driver task per chain that
//! walks its instance across round boundaries.

use crate::agreement::{Agreement, AgreementFactory};
use crate::config::RoundConfig;
use crate::driver;
use crate::error::ConsensusError;
use crate::filter::VoteFilter;
use crate::leader::{leader_validator, LeaderValidator};
use crate::receiver::ChainReceiver;
use crate::result_cache::ResultCache;
use crate::shutdown::{Shutdown, ShutdownSignal};
use crate::traits::{
    config_or_abort, crs_or_abort, Application, Governance, Lattice, Network, NodeSetCache, Signer,
};
use manifold_types::{
    notary_set_target, AgreementResult, Block, Crs, NodeId, Position, ProtocolConfig, Vote,
};
use std::sync::{Arc, Mutex, RwLock};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument};

/// A required builder field was not provided.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("missing required field: {0}")]
pub struct BuildError(&'static str);

/// Per-chain inventory entry.
struct ChainCell {
    agreement: Arc<dyn Agreement>,
    receiver: Arc<ChainReceiver>,
    /// Consuming end of the restart channel; taken once by the driver.
    restart_rx: Mutex<Option<mpsc::Receiver<Position>>>,
    filter: Arc<Mutex<VoteFilter>>,
}

/// Mutable inventory behind the manager lock.
///
/// Drivers never hold this lock while driving their own instance; they
/// acquire it briefly to capture their chain's handles and to read the
/// round schedule.
struct Inventory {
    configs: Vec<RoundConfig>,
    last_end_time: Instant,
    chains: Vec<ChainCell>,
    is_running: bool,
}

/// Orchestrator of the per-chain Byzantine agreement instances.
pub struct AgreementManager {
    node_id: NodeId,
    init_round: u64,
    governance: Arc<dyn Governance>,
    network: Arc<dyn Network>,
    cache: Arc<dyn NodeSetCache>,
    lattice: Arc<dyn Lattice>,
    signer: Arc<dyn Signer>,
    factory: Arc<dyn AgreementFactory>,
    validate_leader: LeaderValidator,
    inner: RwLock<Inventory>,
    /// Accessed only from the serialized result-ingest path.
    results: Mutex<ResultCache>,
    shutdown: Shutdown,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl AgreementManager {
    /// Start building a manager.
    pub fn builder() -> AgreementManagerBuilder {
        AgreementManagerBuilder::new()
    }

    /// The schedule entry for `round`.
    ///
    /// Returns `None` when the round is beyond the last appended config.
    ///
    /// # Panics
    ///
    /// Asking for a round before the initial round is a contract violation
    /// and aborts: no caller can legitimately reach back that far.
    pub fn get_config(&self, round: u64) -> Option<RoundConfig> {
        let inner = self.inner.read().expect("manager lock poisoned");
        if round < self.init_round {
            panic!(
                "round {round} is before the initial round {}: state corrupt",
                self.init_round
            );
        }
        inner.configs.get((round - self.init_round) as usize).cloned()
    }

    /// Append the configuration for the next round.
    ///
    /// Rounds must arrive consecutively. When the new round enlarges the
    /// chain count, an agreement instance, receiver, and vote filter are
    /// created for each new chain; if the manager is already running, a
    /// driver task is spawned for it as well.
    pub fn append_config(
        self: &Arc<Self>,
        round: u64,
        config: &ProtocolConfig,
        crs: Crs,
    ) -> Result<(), ConsensusError> {
        let mut inner = self.inner.write().expect("manager lock poisoned");
        if round != self.init_round + inner.configs.len() as u64 {
            return Err(ConsensusError::RoundNotIncreasing);
        }
        let begin_time = inner.last_end_time;
        inner.configs.push(RoundConfig::new(begin_time, config, crs));
        inner.last_end_time = begin_time + config.round_interval;
        info!(
            round,
            num_chains = config.num_chains,
            begin_in = ?begin_time.saturating_duration_since(Instant::now()),
            "appended round configuration"
        );

        // Grow the instance table for chains introduced by this round.
        let first_new = inner.chains.len() as u32;
        for chain_id in first_new..config.num_chains {
            let nodes = self.cache.node_set(round)?;
            let notary_set = nodes.subset(
                config.notary_set_size as usize,
                &notary_set_target(crs, chain_id),
            );
            let (receiver, restart_rx) = ChainReceiver::new(chain_id);
            let agreement = self.factory.create(
                chain_id,
                notary_set,
                Arc::clone(&receiver),
                Arc::clone(&self.validate_leader),
                Arc::clone(&self.signer),
            );
            inner.chains.push(ChainCell {
                agreement,
                receiver,
                restart_rx: Mutex::new(Some(restart_rx)),
                filter: Arc::new(Mutex::new(VoteFilter::new())),
            });
            if inner.is_running {
                self.spawn_driver(round, chain_id);
            }
        }
        Ok(())
    }

    /// Start the per-chain drivers. Idempotent.
    pub fn run(self: &Arc<Self>) {
        let mut inner = self.inner.write().expect("manager lock poisoned");
        if inner.is_running {
            return;
        }
        inner.is_running = true;
        for chain_id in 0..inner.chains.len() as u32 {
            self.spawn_driver(self.init_round, chain_id);
        }
    }

    /// Route a vote to its chain's instance.
    ///
    /// The per-chain filter drops replays before they reach the instance;
    /// after a successful ingest the instance pushes its new frontier back
    /// into the filter so later stale votes are dropped cheaply.
    pub fn process_vote(&self, vote: &Vote) -> Result<(), ConsensusError> {
        let inner = self.inner.read().expect("manager lock poisoned");
        let chain_id = vote.position.chain_id;
        let Some(cell) = inner.chains.get(chain_id as usize) else {
            error!(
                position = %vote.position,
                known_chains = inner.chains.len(),
                known_rounds = inner.configs.len(),
                init_round = self.init_round,
                "vote for unknown chain"
            );
            return Err(ConsensusError::InvalidChainId {
                chain_id,
                known_chains: inner.chains.len(),
            });
        };
        let mut filter = cell.filter.lock().expect("vote filter lock poisoned");
        if filter.filter(vote) {
            return Ok(());
        }
        // Defensive copy: the instance may keep the vote across tasks.
        cell.agreement.process_vote(vote.clone())?;
        cell.agreement.update_filter(&mut filter);
        Ok(())
    }

    /// Route a proposed block to its chain's instance.
    pub fn process_block(&self, block: &Block) -> Result<(), ConsensusError> {
        let inner = self.inner.read().expect("manager lock poisoned");
        let chain_id = block.position.chain_id;
        let Some(cell) = inner.chains.get(chain_id as usize) else {
            error!(
                position = %block.position,
                known_chains = inner.chains.len(),
                known_rounds = inner.configs.len(),
                init_round = self.init_round,
                "block for unknown chain"
            );
            return Err(ConsensusError::InvalidChainId {
                chain_id,
                known_chains: inner.chains.len(),
            });
        };
        cell.agreement.process_block(block.clone())?;
        Ok(())
    }

    /// Record a peer result as processed.
    ///
    /// Returns true the first time this result's position is seen. Callers
    /// serialize result handling; the cache itself is a plain bounded set.
    pub fn touch_agreement_result(&self, result: &AgreementResult) -> bool {
        self.results
            .lock()
            .expect("result cache lock poisoned")
            .touch(result.position)
    }

    /// Forget a touched result so it can be handled again.
    pub fn untouch_agreement_result(&self, result: &AgreementResult) {
        self.results
            .lock()
            .expect("result cache lock poisoned")
            .untouch(&result.position)
    }

    /// Reconcile a chain's instance with a peer-reported result.
    ///
    /// When the result matches the position the instance is still deciding,
    /// its votes are replayed (slow sync). When it is ahead of the
    /// instance, the instance is restarted at the reported position with
    /// the round's notary subset (fast sync). Older results are dropped.
    #[instrument(skip(self, result), fields(position = %result.position))]
    pub fn process_agreement_result(&self, result: &AgreementResult) -> Result<(), ConsensusError> {
        let inner = self.inner.read().expect("manager lock poisoned");
        let chain_id = result.position.chain_id;
        let Some(cell) = inner.chains.get(chain_id as usize) else {
            error!(
                position = %result.position,
                known_chains = inner.chains.len(),
                known_rounds = inner.configs.len(),
                init_round = self.init_round,
                "result for unknown chain"
            );
            return Err(ConsensusError::InvalidChainId {
                chain_id,
                known_chains: inner.chains.len(),
            });
        };
        let agreement = &cell.agreement;
        let current = agreement.agreement_id();
        if current.is_stop() {
            return Ok(());
        }
        if result.position == current && !agreement.confirmed() {
            info!(position = %result.position, "syncing agreement");
            for vote in &result.votes {
                agreement.process_vote(vote.clone())?;
            }
        } else if result.position.newer_than(&current) {
            info!(position = %result.position, "fast syncing agreement");
            let round = result.position.round;
            let nodes = self.cache.node_set(round)?;
            let crs = crs_or_abort(self.governance.as_ref(), round);
            let notary_set_size = config_or_abort(self.governance.as_ref(), round).notary_set_size;
            let notary_set =
                nodes.subset(notary_set_size as usize, &notary_set_target(crs, chain_id));
            for vote in &result.votes {
                agreement.process_vote(vote.clone())?;
            }
            debug!(hash = %result.block_hash, "pulling confirmed block for fast sync");
            self.network.pull_blocks(vec![result.block_hash]);
            let leader = self.cache.leader_node(result.position)?;
            agreement.restart(notary_set, result.position, leader, crs);
        }
        Ok(())
    }

    /// Stop every instance, then wait for all driver tasks to finish.
    ///
    /// Instances are stopped under the write lock; the join happens after
    /// it is released. Drivers only take brief read locks, so the join
    /// cannot deadlock.
    pub async fn stop(&self) {
        {
            let inner = self.inner.write().expect("manager lock poisoned");
            for cell in &inner.chains {
                cell.agreement.stop();
            }
        }
        self.shutdown.trigger();
        let handles: Vec<JoinHandle<()>> = {
            let mut tasks = self.tasks.lock().expect("task list lock poisoned");
            tasks.drain(..).collect()
        };
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Number of chains with a live instance.
    pub fn chain_count(&self) -> usize {
        self.inner.read().expect("manager lock poisoned").chains.len()
    }

    /// Number of appended round configurations.
    pub fn round_count(&self) -> usize {
        self.inner.read().expect("manager lock poisoned").configs.len()
    }

    /// Whether drivers have been started.
    pub fn is_running(&self) -> bool {
        self.inner.read().expect("manager lock poisoned").is_running
    }

    /// This node's identity.
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    fn spawn_driver(self: &Arc<Self>, init_round: u64, chain_id: u32) {
        let mgr = Arc::clone(self);
        let handle = tokio::spawn(async move {
            driver::run_chain(mgr, init_round, chain_id).await;
        });
        self.tasks
            .lock()
            .expect("task list lock poisoned")
            .push(handle);
    }

    // ── Driver-side accessors ──────────────────────────────────────────

    pub(crate) fn chain_parts(
        &self,
        chain_id: u32,
    ) -> (
        Arc<dyn Agreement>,
        Arc<ChainReceiver>,
        Option<mpsc::Receiver<Position>>,
    ) {
        let inner = self.inner.read().expect("manager lock poisoned");
        let cell = &inner.chains[chain_id as usize];
        let restart_rx = cell
            .restart_rx
            .lock()
            .expect("restart channel lock poisoned")
            .take();
        (Arc::clone(&cell.agreement), Arc::clone(&cell.receiver), restart_rx)
    }

    pub(crate) fn reset_filter(&self, chain_id: u32) {
        let inner = self.inner.read().expect("manager lock poisoned");
        *inner.chains[chain_id as usize]
            .filter
            .lock()
            .expect("vote filter lock poisoned") = VoteFilter::new();
    }

    pub(crate) fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.subscribe()
    }

    pub(crate) fn governance(&self) -> &dyn Governance {
        self.governance.as_ref()
    }

    pub(crate) fn cache(&self) -> &dyn NodeSetCache {
        self.cache.as_ref()
    }

    pub(crate) fn lattice(&self) -> &dyn Lattice {
        self.lattice.as_ref()
    }

    pub(crate) fn network(&self) -> &dyn Network {
        self.network.as_ref()
    }
}

/// Builder for [`AgreementManager`].
pub struct AgreementManagerBuilder {
    node_id: Option<NodeId>,
    init_round: u64,
    init_round_begin_time: Option<Instant>,
    governance: Option<Arc<dyn Governance>>,
    network: Option<Arc<dyn Network>>,
    cache: Option<Arc<dyn NodeSetCache>>,
    lattice: Option<Arc<dyn Lattice>>,
    application: Option<Arc<dyn Application>>,
    signer: Option<Arc<dyn Signer>>,
    factory: Option<Arc<dyn AgreementFactory>>,
}

impl AgreementManagerBuilder {
    /// Builder with no fields set and an initial round of zero.
    pub fn new() -> Self {
        Self {
            node_id: None,
            init_round: 0,
            init_round_begin_time: None,
            governance: None,
            network: None,
            cache: None,
            lattice: None,
            application: None,
            signer: None,
            factory: None,
        }
    }

    /// This node's identity.
    pub fn node_id(mut self, node_id: NodeId) -> Self {
        self.node_id = Some(node_id);
        self
    }

    /// First round this manager is responsible for.
    pub fn init_round(mut self, round: u64) -> Self {
        self.init_round = round;
        self
    }

    /// Wall-clock start of the first round.
    pub fn init_round_begin_time(mut self, begin_time: Instant) -> Self {
        self.init_round_begin_time = Some(begin_time);
        self
    }

    /// Governance source of round parameters.
    pub fn governance(mut self, governance: Arc<dyn Governance>) -> Self {
        self.governance = Some(governance);
        self
    }

    /// Gossip network pull interface.
    pub fn network(mut self, network: Arc<dyn Network>) -> Self {
        self.network = Some(network);
        self
    }

    /// Node-set cache for notary and leader lookups.
    pub fn node_set_cache(mut self, cache: Arc<dyn NodeSetCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Local DAG of confirmed blocks.
    pub fn lattice(mut self, lattice: Arc<dyn Lattice>) -> Self {
        self.lattice = Some(lattice);
        self
    }

    /// Application block verifier.
    pub fn application(mut self, application: Arc<dyn Application>) -> Self {
        self.application = Some(application);
        self
    }

    /// Vote signer.
    pub fn signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Factory for inner agreement instances.
    pub fn agreement_factory(mut self, factory: Arc<dyn AgreementFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Build the manager.
    pub fn build(self) -> Result<Arc<AgreementManager>, BuildError> {
        let lattice = self.lattice.ok_or(BuildError("lattice"))?;
        let application = self.application.ok_or(BuildError("application"))?;
        let validate_leader = leader_validator(Arc::clone(&lattice), application);
        Ok(Arc::new(AgreementManager {
            node_id: self.node_id.ok_or(BuildError("node_id"))?,
            init_round: self.init_round,
            governance: self.governance.ok_or(BuildError("governance"))?,
            network: self.network.ok_or(BuildError("network"))?,
            cache: self.cache.ok_or(BuildError("node_set_cache"))?,
            lattice,
            signer: self.signer.ok_or(BuildError("signer"))?,
            factory: self.factory.ok_or(BuildError("agreement_factory"))?,
            validate_leader,
            inner: RwLock::new(Inventory {
                configs: Vec::new(),
                last_end_time: self
                    .init_round_begin_time
                    .ok_or(BuildError("init_round_begin_time"))?,
                chains: Vec::new(),
                is_running: false,
            }),
            results: Mutex::new(ResultCache::new()),
            shutdown: Shutdown::new(),
            tasks: Mutex::new(Vec::new()),
        }))
    }
}

impl Default for AgreementManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
