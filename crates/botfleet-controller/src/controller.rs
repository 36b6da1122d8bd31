//! The control cycle: sample demand, decide, ramp.
//!
//! All cycle state sits behind one async mutex. A cycle (periodic or
//! manually triggered) must acquire it without waiting; if it is held, the
//! request is rejected with `CycleOverlap`. Status readers never touch that
//! mutex: the latest snapshot is published on a watch channel as the cycle
//! progresses.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Offset, Timelike, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use botfleet_core::{
    CyclePhase, DemandReading, HostIndex, ScalingDecision, WorkerAction, WorkerId,
};
use botfleet_demand::DemandSampler;
use botfleet_gateway::HostGateway;
use botfleet_policy::{Policy, PolicyInput};

use crate::candidates::CandidatePool;
use crate::error::{ControllerError, ControllerResult};
use crate::inventory::{Inventory, discover};
use crate::ramp::{execute, pacing_interval, plan_batches};

/// Wall-clock source, replaceable in tests.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Runtime settings for the controller.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Upper bound on simultaneously running workers.
    pub max_workers: u32,
    pub cycle_period: Duration,
    /// Maximum worker names per start/stop call.
    pub max_batch: usize,
    /// Offset used to derive the hour of day the policies see.
    pub utc_offset: FixedOffset,
}

impl ControllerConfig {
    pub fn new(max_workers: u32) -> Self {
        Self {
            max_workers,
            cycle_period: Duration::from_secs(15 * 60),
            max_batch: 5,
            utc_offset: Utc.fix(),
        }
    }
}

// ── Reports ────────────────────────────────────────────────────────

/// Outcome of one completed control cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub decision: ScalingDecision,
    pub started: u32,
    pub stopped: u32,
    /// Workers whose start/stop call failed.
    pub failed: u32,
    /// Operations dropped because no candidate was left to draw.
    pub skipped: u32,
    /// Operations never issued because shutdown interrupted the ramp.
    pub abandoned: u32,
    pub aborted: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Outcome of startup discovery and the initial split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BootstrapReport {
    pub discovered: usize,
    pub failed_hosts: Vec<HostIndex>,
    pub running: usize,
    pub disabled: usize,
    pub failed: u32,
}

/// Point-in-time view of the fleet, readable while a cycle runs.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FleetStatus {
    pub policy: String,
    pub max_workers: u32,
    pub hosts: usize,
    pub failed_hosts: Vec<HostIndex>,
    pub running_count: usize,
    pub disabled_count: usize,
    pub total_workers: usize,
    pub phase: CyclePhase,
    pub last_cycle_decision: Option<ScalingDecision>,
    pub last_cycle: Option<CycleReport>,
    pub last_demand: Option<DemandReading>,
    pub cycles_completed: u64,
    pub cycles_rejected: u64,
}

/// Membership of both inventory sets.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerListing {
    pub running: Vec<WorkerId>,
    pub disabled: Vec<WorkerId>,
}

// ── Controller ─────────────────────────────────────────────────────

struct CycleState {
    inventory: Inventory,
    sampler: Option<DemandSampler>,
    rng: StdRng,
    bootstrapped: bool,
}

pub struct Controller {
    config: ControllerConfig,
    policy: Policy,
    gateway: Arc<dyn HostGateway>,
    state: Arc<Mutex<CycleState>>,
    status: watch::Sender<FleetStatus>,
    shutdown: watch::Sender<bool>,
    clock: Clock,
}

impl Controller {
    pub fn new(config: ControllerConfig, policy: Policy, gateway: Arc<dyn HostGateway>) -> Self {
        let status = FleetStatus {
            policy: policy.name().to_string(),
            max_workers: config.max_workers,
            hosts: gateway.host_count(),
            ..Default::default()
        };
        Self {
            config,
            policy,
            gateway,
            state: Arc::new(Mutex::new(CycleState {
                inventory: Inventory::default(),
                sampler: None,
                rng: StdRng::from_os_rng(),
                bootstrapped: false,
            })),
            status: watch::channel(status).0,
            shutdown: watch::channel(false).0,
            clock: Arc::new(Utc::now),
        }
    }

    /// Attach the demand sampler used by demand-driven policies.
    ///
    /// Builder methods only take effect before the controller is shared.
    pub fn with_sampler(mut self, sampler: DemandSampler) -> Self {
        if let Some(state) = Arc::get_mut(&mut self.state) {
            state.get_mut().sampler = Some(sampler);
        }
        self
    }

    /// Use a deterministic candidate selection sequence.
    pub fn with_seed(mut self, seed: u64) -> Self {
        if let Some(state) = Arc::get_mut(&mut self.state) {
            state.get_mut().rng = StdRng::seed_from_u64(seed);
        }
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn gateway(&self) -> &Arc<dyn HostGateway> {
        &self.gateway
    }

    /// Latest published status snapshot.
    pub fn status(&self) -> FleetStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<FleetStatus> {
        self.status.subscribe()
    }

    /// Both inventory sets, or `CycleOverlap` while a cycle holds them.
    pub fn workers(&self) -> ControllerResult<WorkerListing> {
        let state = self
            .state
            .try_lock()
            .map_err(|_| ControllerError::CycleOverlap)?;
        Ok(WorkerListing {
            running: state.inventory.running().cloned().collect(),
            disabled: state.inventory.disabled().cloned().collect(),
        })
    }

    /// Signal the run loop and any in-flight ramp to stop.
    pub fn shutdown(&self) {
        info!("controller shutdown requested");
        self.shutdown.send_replace(true);
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    // ── Bootstrap ──────────────────────────────────────────────────

    /// Discover every worker and force a randomized initial split.
    ///
    /// All discovered workers start disabled. After shuffling, the first
    /// `min(total / 2, max_workers)` are started and the rest are stopped,
    /// stops first. Calls are batched per host but not paced.
    pub async fn bootstrap(&self) -> ControllerResult<BootstrapReport> {
        let mut guard = self.state.lock().await;
        if guard.bootstrapped {
            return Err(ControllerError::AlreadyBootstrapped);
        }

        let discovery = discover(&self.gateway).await;
        let CycleState {
            inventory,
            rng,
            bootstrapped,
            ..
        } = &mut *guard;

        *inventory = Inventory::new(discovery.workers.iter().cloned());
        let mut to_start = discovery.workers.clone();
        to_start.shuffle(&mut *rng);
        let active = (to_start.len() / 2).min(self.config.max_workers as usize);
        let to_stop = to_start.split_off(active);

        info!(
            discovered = discovery.workers.len(),
            target_running = to_start.len(),
            "applying initial fleet split"
        );

        let mut batches = plan_batches(WorkerAction::Stop, to_stop, self.config.max_batch);
        batches.extend(plan_batches(
            WorkerAction::Start,
            to_start,
            self.config.max_batch,
        ));

        let mut shutdown = self.shutdown.subscribe();
        let outcome = execute(
            self.gateway.as_ref(),
            inventory,
            batches,
            Duration::ZERO,
            &mut shutdown,
            |inv| self.publish_counts(inv),
        )
        .await;
        *bootstrapped = true;

        self.publish_counts(inventory);
        self.status
            .send_modify(|s| s.failed_hosts = discovery.failed_hosts.clone());

        let report = BootstrapReport {
            discovered: discovery.workers.len(),
            failed_hosts: discovery.failed_hosts,
            running: inventory.running_count(),
            disabled: inventory.disabled_count(),
            failed: outcome.failed,
        };
        info!(
            total = report.discovered,
            running = report.running,
            disabled = report.disabled,
            failed = report.failed,
            failed_hosts = report.failed_hosts.len(),
            "bootstrap complete"
        );
        Ok(report)
    }

    // ── Cycle ──────────────────────────────────────────────────────

    /// Run one control cycle to completion on the current task.
    pub async fn run_cycle(&self) -> ControllerResult<CycleReport> {
        let guard = self
            .state
            .clone()
            .try_lock_owned()
            .map_err(|_| self.reject())?;
        Ok(self.cycle(guard).await)
    }

    /// Start one control cycle in the background.
    ///
    /// The cycle lock is taken before this returns, so an overlapping
    /// request is rejected immediately rather than queued.
    pub fn trigger(self: &Arc<Self>) -> ControllerResult<JoinHandle<CycleReport>> {
        let guard = self
            .state
            .clone()
            .try_lock_owned()
            .map_err(|_| self.reject())?;
        let controller = Arc::clone(self);
        Ok(tokio::spawn(async move { controller.cycle(guard).await }))
    }

    async fn cycle(&self, mut guard: OwnedMutexGuard<CycleState>) -> CycleReport {
        let started_at = (self.clock)();
        let CycleState {
            inventory,
            sampler,
            rng,
            ..
        } = &mut *guard;

        let demand = match sampler {
            Some(sampler) if self.policy.needs_demand() => {
                self.set_phase(CyclePhase::Sampling);
                sampler.refresh().await
            }
            Some(sampler) => sampler.last_reading(),
            None => DemandReading::default(),
        };

        self.set_phase(CyclePhase::Deciding);
        let local = started_at.with_timezone(&self.config.utc_offset);
        let input = PolicyInput {
            running: inventory.running_count() as u32,
            disabled: inventory.disabled_count() as u32,
            max_workers: self.config.max_workers,
            hour: local.hour(),
            minute: local.minute(),
            demand,
        };
        let decision = self.policy.decide(&input);
        info!(
            policy = self.policy.name(),
            running = input.running,
            disabled = input.disabled,
            max_workers = input.max_workers,
            hour = input.hour,
            minute = input.minute,
            demand = ?demand.current.map(|s| s.value),
            previous_demand = ?demand.previous.map(|s| s.value),
            demand_fresh = demand.fresh,
            target = decision.target_active,
            to_start = decision.to_start,
            to_stop = decision.to_stop,
            "scaling decision"
        );

        self.set_phase(CyclePhase::Ramping);
        let interval = pacing_interval(self.config.cycle_period, decision.operations());
        let starts = CandidatePool::new(inventory.disabled().cloned())
            .draw_many(&mut *rng, decision.to_start as usize);
        let stops = CandidatePool::new(inventory.running().cloned())
            .draw_many(&mut *rng, decision.to_stop as usize);
        let skipped = decision.operations() - (starts.len() + stops.len()) as u32;
        if skipped > 0 {
            debug!(skipped, "candidate set exhausted, skipping remaining operations");
        }

        let mut batches = plan_batches(WorkerAction::Start, starts, self.config.max_batch);
        batches.extend(plan_batches(
            WorkerAction::Stop,
            stops,
            self.config.max_batch,
        ));
        debug!(
            batches = batches.len(),
            interval_ms = interval.as_millis() as u64,
            "ramp planned"
        );

        let mut shutdown = self.shutdown.subscribe();
        let outcome = execute(
            self.gateway.as_ref(),
            inventory,
            batches,
            interval,
            &mut shutdown,
            |inv| self.publish_counts(inv),
        )
        .await;

        let report = CycleReport {
            decision,
            started: outcome.started,
            stopped: outcome.stopped,
            failed: outcome.failed,
            skipped,
            abandoned: outcome.abandoned,
            aborted: outcome.aborted,
            started_at,
            finished_at: (self.clock)(),
        };

        self.publish_counts(inventory);
        self.status.send_modify(|s| {
            s.phase = CyclePhase::Idle;
            s.last_cycle_decision = Some(decision);
            s.last_cycle = Some(report.clone());
            s.last_demand = Some(demand);
            s.cycles_completed += 1;
        });
        info!(
            started = report.started,
            stopped = report.stopped,
            failed = report.failed,
            skipped = report.skipped,
            aborted = report.aborted,
            running = inventory.running_count(),
            disabled = inventory.disabled_count(),
            "cycle complete"
        );
        report
    }

    /// Run a cycle every `cycle_period` until shutdown.
    ///
    /// The first cycle runs one period after start; bootstrap has already
    /// set the initial split. Ticks that fall inside a long cycle are
    /// skipped rather than queued.
    pub async fn run(&self) {
        let period = self.config.cycle_period;
        let mut shutdown = self.shutdown.subscribe();
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            period_ms = period.as_millis() as u64,
            policy = self.policy.name(),
            max_workers = self.config.max_workers,
            "controller loop started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_cycle().await {
                        warn!(error = %e, "scheduled cycle skipped");
                    }
                }
                _ = shutdown.changed() => {}
            }
        }
        info!("controller loop stopped");
    }

    fn set_phase(&self, phase: CyclePhase) {
        self.status.send_modify(|s| s.phase = phase);
    }

    fn publish_counts(&self, inventory: &Inventory) {
        self.status.send_modify(|s| {
            s.running_count = inventory.running_count();
            s.disabled_count = inventory.disabled_count();
            s.total_workers = inventory.total();
        });
    }

    fn reject(&self) -> ControllerError {
        warn!("control cycle already in progress, request rejected");
        self.status.send_modify(|s| s.cycles_rejected += 1);
        ControllerError::CycleOverlap
    }
}
