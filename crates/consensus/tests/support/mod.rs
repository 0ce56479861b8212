//! Scripted collaborators for exercising the agreement manager.

#![allow(dead_code)]

use manifold_consensus::{
    Agreement, AgreementError, AgreementFactory, AgreementManager, Application, BlockVerdict,
    CacheError, ChainReceiver, Governance, Lattice, LatticeError, LeaderValidator, Network,
    NodeSetCache, Signer, VoteFilter,
};
use manifold_types::test_utils::test_node;
use manifold_types::{
    notary_set_target, Block, Crs, Hash, NodeId, NodeSet, Position, ProtocolConfig, Vote,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep, timeout, Instant};

// ─── Agreement instance ────────────────────────────────────────────────────

/// Arguments of one `Agreement::restart` call.
#[derive(Debug, Clone)]
pub struct RestartCall {
    pub notary_set: HashSet<NodeId>,
    pub position: Position,
    pub leader: NodeId,
    pub crs: Crs,
}

struct MockAgreementState {
    agreement_id: Position,
    confirmed: bool,
    pull_votes: bool,
    clocks: usize,
    next_state_error: Option<AgreementError>,
}

/// Scripted agreement instance recording every interaction.
pub struct MockAgreement {
    pub chain_id: u32,
    pub receiver: Arc<ChainReceiver>,
    state: Mutex<MockAgreementState>,
    done_tx: watch::Sender<bool>,
    pub votes: Mutex<Vec<Vote>>,
    pub blocks: Mutex<Vec<Block>>,
    pub restarts: Mutex<Vec<RestartCall>>,
    pub next_state_calls: AtomicUsize,
    pub stop_calls: AtomicUsize,
}

impl MockAgreement {
    pub fn new(chain_id: u32, receiver: Arc<ChainReceiver>) -> Self {
        let (done_tx, _) = watch::channel(false);
        Self {
            chain_id,
            receiver,
            state: Mutex::new(MockAgreementState {
                agreement_id: Position::stop(0),
                confirmed: false,
                pull_votes: false,
                clocks: 1,
                next_state_error: None,
            }),
            done_tx,
            votes: Mutex::new(Vec::new()),
            blocks: Mutex::new(Vec::new()),
            restarts: Mutex::new(Vec::new()),
            next_state_calls: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_agreement_id(&self, position: Position) {
        self.state.lock().unwrap().agreement_id = position;
    }

    pub fn set_confirmed(&self, confirmed: bool) {
        self.state.lock().unwrap().confirmed = confirmed;
        self.done_tx.send_replace(confirmed);
    }

    pub fn set_pull_votes(&self, pull: bool) {
        self.state.lock().unwrap().pull_votes = pull;
    }

    pub fn fail_next_state(&self, error: AgreementError) {
        self.state.lock().unwrap().next_state_error = Some(error);
    }

    /// Simulate a confirmed block: mark decided and kick the driver.
    pub fn confirm_and_notify(&self, position: Position) {
        self.set_confirmed(true);
        self.receiver.notify_restart(position);
    }

    pub fn vote_count(&self) -> usize {
        self.votes.lock().unwrap().len()
    }

    pub fn restart_count(&self) -> usize {
        self.restarts.lock().unwrap().len()
    }

    pub fn last_restart(&self) -> Option<RestartCall> {
        self.restarts.lock().unwrap().last().cloned()
    }
}

impl Agreement for MockAgreement {
    fn agreement_id(&self) -> Position {
        self.state.lock().unwrap().agreement_id
    }

    fn confirmed(&self) -> bool {
        self.state.lock().unwrap().confirmed
    }

    fn process_vote(&self, vote: Vote) -> Result<(), AgreementError> {
        self.votes.lock().unwrap().push(vote);
        Ok(())
    }

    fn process_block(&self, block: Block) -> Result<(), AgreementError> {
        self.blocks.lock().unwrap().push(block);
        Ok(())
    }

    fn update_filter(&self, filter: &mut VoteFilter) {
        let state = self.state.lock().unwrap();
        filter.set_frontier(state.agreement_id, 0, state.confirmed);
    }

    fn next_state(&self) -> Result<(), AgreementError> {
        self.next_state_calls.fetch_add(1, Ordering::SeqCst);
        match self.state.lock().unwrap().next_state_error.clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn clocks(&self) -> usize {
        self.state.lock().unwrap().clocks
    }

    fn done(&self) -> watch::Receiver<bool> {
        self.done_tx.subscribe()
    }

    fn pull_votes(&self) -> bool {
        self.state.lock().unwrap().pull_votes
    }

    fn restart(&self, notary_set: HashSet<NodeId>, position: Position, leader: NodeId, crs: Crs) {
        self.restarts.lock().unwrap().push(RestartCall {
            notary_set,
            position,
            leader,
            crs,
        });
        let mut state = self.state.lock().unwrap();
        state.agreement_id = position;
        state.confirmed = false;
        drop(state);
        self.done_tx.send_replace(false);
    }

    fn stop(&self) {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        state.agreement_id = Position::stop(state.agreement_id.round);
        drop(state);
        self.done_tx.send_replace(true);
    }
}

/// Factory handing out [`MockAgreement`] instances and recording them.
#[derive(Default)]
pub struct MockFactory {
    pub created: Mutex<Vec<Arc<MockAgreement>>>,
    pub initial_sets: Mutex<Vec<HashSet<NodeId>>>,
}

impl MockFactory {
    pub fn instance(&self, chain_id: u32) -> Arc<MockAgreement> {
        Arc::clone(&self.created.lock().unwrap()[chain_id as usize])
    }
}

impl AgreementFactory for MockFactory {
    fn create(
        &self,
        chain_id: u32,
        notary_set: HashSet<NodeId>,
        receiver: Arc<ChainReceiver>,
        _validate_leader: LeaderValidator,
        _signer: Arc<dyn Signer>,
    ) -> Arc<dyn Agreement> {
        let agreement = Arc::new(MockAgreement::new(chain_id, receiver));
        self.created.lock().unwrap().push(Arc::clone(&agreement));
        self.initial_sets.lock().unwrap().push(notary_set);
        agreement
    }
}

// ─── Services ──────────────────────────────────────────────────────────────

/// Lattice with scripted tips and next-block slots.
#[derive(Default)]
pub struct MockLattice {
    tips: Mutex<HashMap<u32, u64>>,
    next_blocks: Mutex<HashMap<(u64, u32), (u64, Instant)>>,
}

impl MockLattice {
    pub fn set_tip(&self, chain_id: u32, round: u64) {
        self.tips.lock().unwrap().insert(chain_id, round);
    }

    pub fn set_next_block(&self, round: u64, chain_id: u32, height: u64, time: Instant) {
        self.next_blocks
            .lock()
            .unwrap()
            .insert((round, chain_id), (height, time));
    }
}

impl Lattice for MockLattice {
    fn sanity_check(&self, _block: &Block, _strict: bool) -> Result<(), LatticeError> {
        Ok(())
    }

    fn next_block(&self, round: u64, chain_id: u32) -> Result<(u64, Instant), LatticeError> {
        self.next_blocks
            .lock()
            .unwrap()
            .get(&(round, chain_id))
            .copied()
            .ok_or(LatticeError::NextBlockNotReady { round, chain_id })
    }

    fn tip_round(&self, chain_id: u32) -> u64 {
        self.tips.lock().unwrap().get(&chain_id).copied().unwrap_or(0)
    }
}

/// Governance with scripted per-round parameters.
#[derive(Default)]
pub struct MockGovernance {
    rounds: Mutex<HashMap<u64, (ProtocolConfig, Crs)>>,
}

impl MockGovernance {
    pub fn publish(&self, round: u64, config: ProtocolConfig, crs: Crs) {
        self.rounds.lock().unwrap().insert(round, (config, crs));
    }
}

impl Governance for MockGovernance {
    fn config(&self, round: u64) -> Option<ProtocolConfig> {
        self.rounds.lock().unwrap().get(&round).map(|(c, _)| c.clone())
    }

    fn crs(&self, round: u64) -> Option<Crs> {
        self.rounds.lock().unwrap().get(&round).map(|(_, crs)| *crs)
    }
}

struct RoundNodes {
    set: NodeSet,
    crs: Crs,
    notary_set_size: u32,
}

/// Node-set cache deriving notary subsets the same way production does.
#[derive(Default)]
pub struct MockNodeSetCache {
    rounds: Mutex<HashMap<u64, RoundNodes>>,
    leaders: Mutex<HashMap<Position, NodeId>>,
}

impl MockNodeSetCache {
    pub fn publish(&self, round: u64, set: NodeSet, crs: Crs, notary_set_size: u32) {
        self.rounds.lock().unwrap().insert(
            round,
            RoundNodes {
                set,
                crs,
                notary_set_size,
            },
        );
    }

    pub fn set_leader(&self, position: Position, leader: NodeId) {
        self.leaders.lock().unwrap().insert(position, leader);
    }
}

impl NodeSetCache for MockNodeSetCache {
    fn node_set(&self, round: u64) -> Result<NodeSet, CacheError> {
        self.rounds
            .lock()
            .unwrap()
            .get(&round)
            .map(|nodes| nodes.set.clone())
            .ok_or(CacheError::RoundNotCached(round))
    }

    fn notary_set(&self, round: u64, chain_id: u32) -> Result<HashSet<NodeId>, CacheError> {
        let rounds = self.rounds.lock().unwrap();
        let nodes = rounds
            .get(&round)
            .ok_or(CacheError::RoundNotCached(round))?;
        Ok(nodes.set.subset(
            nodes.notary_set_size as usize,
            &notary_set_target(nodes.crs, chain_id),
        ))
    }

    fn leader_node(&self, position: Position) -> Result<NodeId, CacheError> {
        if let Some(leader) = self.leaders.lock().unwrap().get(&position) {
            return Ok(*leader);
        }
        let rounds = self.rounds.lock().unwrap();
        rounds
            .get(&position.round)
            .and_then(|nodes| nodes.set.iter().next().copied())
            .ok_or(CacheError::LeaderUnknown(position))
    }
}

/// Network recording pull requests.
#[derive(Default)]
pub struct MockNetwork {
    pub pulled_votes: Mutex<Vec<Position>>,
    pub pulled_blocks: Mutex<Vec<Vec<Hash>>>,
}

impl MockNetwork {
    pub fn pulled_block_count(&self) -> usize {
        self.pulled_blocks.lock().unwrap().len()
    }
}

impl Network for MockNetwork {
    fn pull_votes(&self, position: Position) {
        self.pulled_votes.lock().unwrap().push(position);
    }

    fn pull_blocks(&self, hashes: Vec<Hash>) {
        self.pulled_blocks.lock().unwrap().push(hashes);
    }
}

/// Application that accepts every block.
pub struct AcceptingApplication;

impl Application for AcceptingApplication {
    fn verify_block(&self, _block: &Block) -> BlockVerdict {
        BlockVerdict::Valid
    }
}

/// Signer that leaves votes untouched.
pub struct NopSigner;

impl Signer for NopSigner {
    fn sign_vote(&self, _vote: &mut Vote) {}
}

// ─── Harness ───────────────────────────────────────────────────────────────

/// A manager wired to scripted collaborators.
pub struct Harness {
    pub manager: Arc<AgreementManager>,
    pub factory: Arc<MockFactory>,
    pub lattice: Arc<MockLattice>,
    pub cache: Arc<MockNodeSetCache>,
    pub network: Arc<MockNetwork>,
    pub governance: Arc<MockGovernance>,
    pub node_id: NodeId,
}

impl Harness {
    pub fn new(init_round: u64) -> Self {
        Self::with_begin_time(init_round, Instant::now())
    }

    pub fn with_begin_time(init_round: u64, begin_time: Instant) -> Self {
        let factory = Arc::new(MockFactory::default());
        let lattice = Arc::new(MockLattice::default());
        let cache = Arc::new(MockNodeSetCache::default());
        let network = Arc::new(MockNetwork::default());
        let governance = Arc::new(MockGovernance::default());
        let node_id = test_node(0);
        let manager = AgreementManager::builder()
            .node_id(node_id)
            .init_round(init_round)
            .init_round_begin_time(begin_time)
            .governance(Arc::clone(&governance) as Arc<dyn Governance>)
            .network(Arc::clone(&network) as Arc<dyn Network>)
            .node_set_cache(Arc::clone(&cache) as Arc<dyn NodeSetCache>)
            .lattice(Arc::clone(&lattice) as Arc<dyn Lattice>)
            .application(Arc::new(AcceptingApplication))
            .signer(Arc::new(NopSigner))
            .agreement_factory(Arc::clone(&factory) as Arc<dyn AgreementFactory>)
            .build()
            .expect("harness manager");
        Self {
            manager,
            factory,
            lattice,
            cache,
            network,
            governance,
            node_id,
        }
    }

    /// Publish a round to governance and the node-set cache.
    pub fn publish_round(&self, round: u64, config: &ProtocolConfig, crs: Crs, nodes: NodeSet) {
        self.governance.publish(round, config.clone(), crs);
        self.cache.publish(round, nodes, crs, config.notary_set_size);
    }
}

/// A protocol config with test-friendly timing.
pub fn protocol_config(num_chains: u32) -> ProtocolConfig {
    ProtocolConfig {
        num_chains,
        round_interval: Duration::from_secs(60),
        notary_set_size: 3,
        lambda_ba: Duration::from_millis(250),
    }
}

/// The crs used for a seeded round in tests.
pub fn test_crs(seed: u8) -> Crs {
    Crs::digest(&[b'c', seed])
}

/// Poll until `condition` holds; panics after a generous virtual deadline.
pub async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    timeout(Duration::from_secs(3600), async {
        while !condition() {
            sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
}
