//! The per-chain round driver.
//!
//! One cooperative task per chain. Each pass over the outer loop prepares
//! one round (wait for config, decide notary membership, rebuild the ticker
//! when λ changed), then hands control to the one-round sub-loop that keeps
//! the agreement's clocked state machine moving until the round is over on
//! this chain. Shutdown is observed at every suspension point.

use crate::agreement::Agreement;
use crate::error::ConsensusError;
use crate::manager::AgreementManager;
use crate::receiver::ChainReceiver;
use crate::shutdown::ShutdownSignal;
use crate::ticker::{new_ba_ticker, Ticker};
use manifold_types::{Crs, NodeId, Position};
use rand::Rng;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, error, info, instrument};

/// How often to re-check for a not-yet-appended round configuration.
const CONFIG_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// How often to re-poll the lattice while it catches up.
const LATTICE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Width of the round-entry jitter window, in ticker periods.
const BEGIN_JITTER_TICKS: u32 = 4;

/// Handles a driver keeps for the duration of one round.
struct RoundSetting {
    chain_id: u32,
    agreement: Arc<dyn Agreement>,
    receiver: Arc<ChainReceiver>,
    notary_set: HashSet<NodeId>,
    crs: Crs,
    ticker: Option<Ticker>,
}

/// The driver's position in the round schedule.
struct RoundSchedule {
    current_round: u64,
    next_round: u64,
    begin_time: Instant,
    end_time: Instant,
    tick_duration: Duration,
}

/// Result of preparing one round.
struct RoundEntry {
    is_notary: bool,
    is_disabled: bool,
}

/// What the restart handler decided.
enum RestartFlow {
    /// Agreement restarted (or the trigger was stale); keep driving.
    Continue,
    /// The round is over on this chain; leave the sub-loop.
    BreakRound,
    /// Shutdown observed mid-handler.
    Cancelled,
}

/// Entry point of a chain's driver task.
#[instrument(skip(mgr))]
pub(crate) async fn run_chain(mgr: Arc<AgreementManager>, init_round: u64, chain_id: u32) {
    let (agreement, receiver, restart_rx) = mgr.chain_parts(chain_id);
    let Some(mut restart_rx) = restart_rx else {
        error!(chain_id, "restart channel already claimed, driver not started");
        return;
    };
    let mut shutdown = mgr.shutdown_signal();
    let mut setting = RoundSetting {
        chain_id,
        agreement,
        receiver,
        notary_set: HashSet::new(),
        crs: Crs::ZERO,
        ticker: None,
    };
    let mut schedule = RoundSchedule {
        current_round: init_round,
        next_round: init_round,
        begin_time: Instant::now(),
        end_time: Instant::now(),
        tick_duration: Duration::ZERO,
    };
    info!(chain_id, init_round, "chain driver started");

    'outer: loop {
        if shutdown.is_cancelled() {
            break;
        }
        let Some(entry) = check_round(&mgr, &mut schedule, &mut setting, &mut shutdown).await
        else {
            break;
        };
        setting.receiver.set_notary(entry.is_notary);
        if entry.is_disabled {
            // Not part of this round; wake up when the next one begins.
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = sleep_until(schedule.end_time) => continue,
            }
        }
        // Round entry is jittered per chain so fullnodes do not verify
        // every chain's confirmed blocks at the same instant.
        let window = BEGIN_JITTER_TICKS * schedule.tick_duration;
        if Instant::now() < pick_biased_time(schedule.begin_time, window) {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = sleep_until(schedule.begin_time) => {}
            }
            // Absorb pulses queued while asleep so the first transitions
            // run at the expected cadence.
            if let Some(ticker) = setting.ticker.as_mut() {
                for _ in 0..2 {
                    tokio::select! {
                        _ = shutdown.cancelled() => break 'outer,
                        _ = ticker.tick() => {}
                    }
                }
            }
        }
        setting.receiver.set_round(schedule.current_round);
        setting.receiver.set_change_notary_time(schedule.end_time);
        // Initial kick: the sub-loop's restart handler seeds the agreement
        // at this round's next lattice height.
        setting
            .receiver
            .notify_restart(Position::stop(setting.receiver.round()));
        mgr.reset_filter(chain_id);
        if let Err(err) = run_one_round(&mgr, &mut setting, &mut restart_rx, &mut shutdown).await {
            error!(
                node = %mgr.node_id(),
                chain_id,
                error = %err,
                "agreement routine failed"
            );
            break;
        }
    }
    info!(chain_id, "chain driver stopped");
}

/// Prepare the next round: wait for its configuration, decide whether this
/// chain participates, refresh notary membership and the ticker.
///
/// Returns `None` when shutdown was observed.
async fn check_round(
    mgr: &Arc<AgreementManager>,
    schedule: &mut RoundSchedule,
    setting: &mut RoundSetting,
    shutdown: &mut ShutdownSignal,
) -> Option<RoundEntry> {
    let config = loop {
        if let Some(config) = mgr.get_config(schedule.next_round) {
            break config;
        }
        debug!(
            chain_id = setting.chain_id,
            round = schedule.next_round,
            "round configuration not ready"
        );
        tokio::select! {
            _ = shutdown.cancelled() => return None,
            _ = sleep(CONFIG_POLL_INTERVAL) => {}
        }
    };
    schedule.begin_time = config.begin_time;
    schedule.end_time = config.end_time();

    let entry = if setting.chain_id >= config.num_chains {
        RoundEntry {
            is_notary: false,
            is_disabled: true,
        }
    } else {
        // A cache miss here means governance data for a reachable round is
        // gone; nothing local can repair that.
        let notary_set = match mgr.cache().notary_set(schedule.next_round, setting.chain_id) {
            Ok(set) => set,
            Err(err) => panic!(
                "notary set lookup failed for round {} chain {}: {err}: state corrupt",
                schedule.next_round, setting.chain_id
            ),
        };
        setting.crs = config.crs;
        let is_notary = notary_set.contains(&mgr.node_id());
        setting.notary_set = notary_set;
        if is_notary {
            info!(
                node = %mgr.node_id(),
                round = schedule.next_round,
                chain_id = setting.chain_id,
                "selected for notary set"
            );
        } else {
            info!(
                node = %mgr.node_id(),
                round = schedule.next_round,
                chain_id = setting.chain_id,
                "not selected for notary set"
            );
        }
        if schedule.tick_duration != config.lambda_ba {
            setting.ticker = Some(new_ba_ticker(mgr.governance(), schedule.next_round));
            schedule.tick_duration = config.lambda_ba;
        }
        RoundEntry {
            is_notary,
            is_disabled: false,
        }
    };
    schedule.current_round = schedule.next_round;
    schedule.next_round += 1;
    Some(entry)
}

/// Drive the agreement until this round is over on this chain.
///
/// A confirmed instance has nothing to do until told where to go next, so
/// it blocks on the restart channel; an unconfirmed instance keeps ticking
/// and only polls the channel opportunistically.
async fn run_one_round(
    mgr: &Arc<AgreementManager>,
    setting: &mut RoundSetting,
    restart_rx: &mut mpsc::Receiver<Position>,
    shutdown: &mut ShutdownSignal,
) -> Result<(), ConsensusError> {
    let agreement = Arc::clone(&setting.agreement);
    let mut old_pos = agreement.agreement_id();
    let mut done = agreement.done();

    'round: loop {
        if shutdown.is_cancelled() {
            return Ok(());
        }
        if agreement.confirmed() {
            let restart_pos = tokio::select! {
                pos = restart_rx.recv() => match pos {
                    Some(pos) => pos,
                    None => return Ok(()),
                },
                _ = shutdown.cancelled() => return Ok(()),
            };
            match restart_agreement(mgr, setting, &mut old_pos, restart_pos, shutdown).await? {
                RestartFlow::Continue => {}
                RestartFlow::BreakRound | RestartFlow::Cancelled => return Ok(()),
            }
        }
        match restart_rx.try_recv() {
            Ok(restart_pos) => {
                match restart_agreement(mgr, setting, &mut old_pos, restart_pos, shutdown).await? {
                    RestartFlow::Continue => {}
                    RestartFlow::BreakRound | RestartFlow::Cancelled => return Ok(()),
                }
            }
            Err(mpsc::error::TryRecvError::Empty) => {}
            Err(mpsc::error::TryRecvError::Disconnected) => return Ok(()),
        }
        if agreement.pull_votes() {
            let position = agreement.agreement_id();
            debug!(position = %position, "pulling missing votes");
            mgr.network().pull_votes(position);
        }
        if let Err(err) = agreement.next_state() {
            error!(
                node = %mgr.node_id(),
                error = %err,
                "failed to proceed to next state"
            );
            return Err(err.into());
        }
        let clocks = agreement.clocks();
        for _ in 0..clocks {
            // A decision preempts any pending clock pulse.
            if *done.borrow_and_update() {
                continue 'round;
            }
            let ticker = setting
                .ticker
                .as_mut()
                .expect("ticker initialised for enabled round");
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Ok(()),
                changed = done.changed() => {
                    if changed.is_err() {
                        return Ok(());
                    }
                    continue 'round;
                }
                _ = ticker.tick() => {}
            }
        }
    }
}

/// React to a restart trigger: either the round is over on this chain, the
/// trigger is stale, or the agreement is restarted at the chain's next
/// lattice height.
async fn restart_agreement(
    mgr: &Arc<AgreementManager>,
    setting: &mut RoundSetting,
    old_pos: &mut Position,
    restart_pos: Position,
    shutdown: &mut ShutdownSignal,
) -> Result<RestartFlow, ConsensusError> {
    if !restart_pos.is_stop() {
        if restart_pos.round > old_pos.round {
            // The confirmed block belongs to a newer round. Hold the round
            // open until the lattice tip catches up, then hand back to the
            // outer loop.
            loop {
                if shutdown.is_cancelled() {
                    return Ok(RestartFlow::Cancelled);
                }
                let tip_round = mgr.lattice().tip_round(setting.chain_id);
                if tip_round >= restart_pos.round {
                    break;
                }
                debug!(
                    position = %restart_pos,
                    tip_round,
                    "waiting for lattice to change round"
                );
                tokio::select! {
                    _ = shutdown.cancelled() => return Ok(RestartFlow::Cancelled),
                    _ = sleep(LATTICE_POLL_INTERVAL) => {}
                }
            }
            return Ok(RestartFlow::BreakRound);
        }
        if restart_pos.older_than(old_pos) {
            // Late confirmation of an already superseded block.
            return Ok(RestartFlow::Continue);
        }
    }

    let recv_round = setting.receiver.round();
    let (next_height, next_time) = loop {
        let (height, time) = match mgr.lattice().next_block(recv_round, setting.chain_id) {
            Ok((height, time)) => (height, Some(time)),
            Err(err) => {
                debug!(
                    round = recv_round,
                    chain_id = setting.chain_id,
                    error = %err,
                    "next height unavailable, using restart position"
                );
                (restart_pos.height, None)
            }
        };
        if old_pos.is_stop() && restart_pos.is_stop() && height == 0 {
            break (height, time);
        }
        if height > restart_pos.height {
            break (height, time);
        }
        debug!(
            old = %old_pos,
            restart = %restart_pos,
            next_height = height,
            "lattice not ready for restart"
        );
        tokio::select! {
            _ = shutdown.cancelled() => return Ok(RestartFlow::Cancelled),
            _ = sleep(LATTICE_POLL_INTERVAL) => {}
        }
    };

    let next_pos = Position::new(recv_round, setting.chain_id, next_height);
    *old_pos = next_pos;
    let leader = mgr.cache().leader_node(next_pos)?;
    if let Some(time) = next_time {
        // The lattice dictates the earliest acceptable block time.
        tokio::select! {
            _ = shutdown.cancelled() => return Ok(RestartFlow::Cancelled),
            _ = sleep_until(time) => {}
        }
    }
    if let Some(ticker) = setting.ticker.as_mut() {
        ticker.restart();
    }
    setting
        .agreement
        .restart(setting.notary_set.clone(), next_pos, leader, setting.crs);
    Ok(RestartFlow::Continue)
}

/// Uniformly jittered round entry over `[begin_time, begin_time + window]`.
fn pick_biased_time(begin_time: Instant, window: Duration) -> Instant {
    if window.is_zero() {
        return begin_time;
    }
    let offset = rand::thread_rng().gen_range(0..=window.as_nanos() as u64);
    begin_time + Duration::from_nanos(offset)
}
