//! Ramp scheduler — turns selected workers into paced per-host batches.
//!
//! Workers are grouped by host and chunked into batches of at most
//! `max_batch` names. Hosts are visited round-robin so one host's backlog
//! does not starve the others. After a batch of `k` workers the ramp waits
//! `k × interval` before the next one; nothing waits after the last batch.

use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use botfleet_core::{HostIndex, WorkerAction, WorkerId};
use botfleet_gateway::HostGateway;

use crate::inventory::Inventory;

/// Spacing between consecutive logical operations within one cycle.
///
/// Spreads `operations` evenly across the cycle period. A cycle with no
/// operations gets the full period.
pub fn pacing_interval(cycle_period: Duration, operations: u32) -> Duration {
    cycle_period / operations.max(1)
}

/// One start or stop call against a single host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub host: HostIndex,
    pub action: WorkerAction,
    pub workers: Vec<WorkerId>,
}

impl Batch {
    pub fn names(&self) -> Vec<String> {
        self.workers.iter().map(|w| w.name.clone()).collect()
    }
}

/// Group workers by host, chunk to `max_batch`, and interleave hosts.
pub fn plan_batches(action: WorkerAction, workers: Vec<WorkerId>, max_batch: usize) -> Vec<Batch> {
    let max_batch = max_batch.max(1);

    let mut by_host: BTreeMap<HostIndex, Vec<WorkerId>> = BTreeMap::new();
    for worker in workers {
        by_host.entry(worker.host).or_default().push(worker);
    }

    let mut queues: Vec<VecDeque<Batch>> = by_host
        .into_iter()
        .map(|(host, workers)| {
            workers
                .chunks(max_batch)
                .map(|chunk| Batch {
                    host,
                    action,
                    workers: chunk.to_vec(),
                })
                .collect()
        })
        .collect();

    let mut batches = Vec::new();
    while queues.iter().any(|q| !q.is_empty()) {
        for queue in &mut queues {
            if let Some(batch) = queue.pop_front() {
                batches.push(batch);
            }
        }
    }
    batches
}

/// What happened to the batches handed to [`execute`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RampOutcome {
    pub started: u32,
    pub stopped: u32,
    /// Workers the host rejected, after a failed batch was retried per worker.
    pub failed: u32,
    /// Workers in batches never issued because of shutdown.
    pub abandoned: u32,
    pub aborted: bool,
}

impl RampOutcome {
    fn confirm(&mut self, inventory: &mut Inventory, worker: &WorkerId, action: WorkerAction) {
        if inventory.record_transition(worker, action) {
            match action {
                WorkerAction::Start => self.started += 1,
                WorkerAction::Stop => self.stopped += 1,
            }
        }
    }
}

/// Issue `batches` in order, recording confirmed transitions.
///
/// A failed multi-worker batch is retried one worker at a time, so only the
/// workers the host rejects individually keep their state. The ramp
/// continues either way.
/// `on_change` runs after every confirmed batch. If `shutdown` flips to
/// `true` during a pacing wait, the remaining batches are abandoned.
pub async fn execute<F>(
    gateway: &dyn HostGateway,
    inventory: &mut Inventory,
    batches: Vec<Batch>,
    interval: Duration,
    shutdown: &mut watch::Receiver<bool>,
    mut on_change: F,
) -> RampOutcome
where
    F: FnMut(&Inventory),
{
    let mut outcome = RampOutcome::default();
    let total = batches.len();
    let mut previous_len = 0u32;

    for (i, batch) in batches.iter().enumerate() {
        let proceed = if i == 0 || interval.is_zero() {
            !*shutdown.borrow()
        } else {
            pace(interval.saturating_mul(previous_len), shutdown).await
        };
        if !proceed {
            outcome.aborted = true;
            outcome.abandoned = batches[i..].iter().map(|b| b.workers.len() as u32).sum();
            info!(
                remaining_batches = total - i,
                abandoned = outcome.abandoned,
                "shutdown requested, abandoning ramp"
            );
            break;
        }

        let len = batch.workers.len() as u32;
        previous_len = len;
        let names = batch.names();

        match gateway.apply(batch.host, batch.action, &names).await {
            Ok(()) => {
                for worker in &batch.workers {
                    outcome.confirm(inventory, worker, batch.action);
                }
                debug!(
                    host = batch.host,
                    action = %batch.action,
                    workers = ?names,
                    batch = i + 1,
                    total,
                    "batch applied"
                );
                on_change(inventory);
            }
            Err(e) if batch.workers.len() > 1 => {
                warn!(
                    host = batch.host,
                    action = %batch.action,
                    workers = ?names,
                    error = %e,
                    "batch failed, retrying workers one at a time"
                );
                let before = outcome.started + outcome.stopped;
                for worker in &batch.workers {
                    let single = std::slice::from_ref(&worker.name);
                    match gateway.apply(batch.host, batch.action, single).await {
                        Ok(()) => outcome.confirm(inventory, worker, batch.action),
                        Err(e) => {
                            outcome.failed += 1;
                            warn!(
                                host = batch.host,
                                action = %batch.action,
                                worker = %worker.name,
                                error = %e,
                                "worker call failed, worker keeps its previous state"
                            );
                        }
                    }
                }
                if outcome.started + outcome.stopped > before {
                    on_change(inventory);
                }
            }
            Err(e) => {
                outcome.failed += len;
                warn!(
                    host = batch.host,
                    action = %batch.action,
                    workers = ?names,
                    error = %e,
                    "batch failed, workers keep their previous state"
                );
            }
        }
    }

    outcome
}

/// Sleep for `delay` unless shutdown is signalled first.
///
/// Returns `false` if the ramp should stop.
async fn pace(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);
    loop {
        if *shutdown.borrow() {
            return false;
        }
        tokio::select! {
            _ = &mut sleep => return true,
            changed = shutdown.changed() => {
                if changed.is_err() {
                    // No one can signal shutdown any more.
                    (&mut sleep).await;
                    return true;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use botfleet_gateway::FakeGateway;
    use tokio::time::Instant;

    fn workers(pairs: &[(HostIndex, &str)]) -> Vec<WorkerId> {
        pairs.iter().map(|(h, n)| WorkerId::new(*h, *n)).collect()
    }

    #[test]
    fn pacing_spreads_operations_over_period() {
        assert_eq!(
            pacing_interval(Duration::from_millis(900_000), 10),
            Duration::from_millis(90_000)
        );
    }

    #[test]
    fn pacing_with_no_operations_is_full_period() {
        let period = Duration::from_secs(900);
        assert_eq!(pacing_interval(period, 0), period);
    }

    #[test]
    fn batches_are_grouped_and_chunked_per_host() {
        let ws = workers(&[(0, "a"), (1, "b"), (0, "c"), (0, "d")]);
        let batches = plan_batches(WorkerAction::Start, ws, 2);

        assert_eq!(batches.len(), 3);
        assert!(batches.iter().all(|b| b.workers.iter().all(|w| w.host == b.host)));
        assert!(batches.iter().all(|b| b.workers.len() <= 2));
    }

    #[test]
    fn hosts_are_visited_round_robin() {
        let ws = workers(&[(0, "a"), (0, "b"), (0, "c"), (1, "x"), (1, "y")]);
        let hosts: Vec<_> = plan_batches(WorkerAction::Stop, ws, 1)
            .iter()
            .map(|b| b.host)
            .collect();
        assert_eq!(hosts, vec![0, 1, 0, 1, 0]);
    }

    #[test]
    fn zero_max_batch_is_treated_as_one() {
        let ws = workers(&[(0, "a"), (0, "b")]);
        assert_eq!(plan_batches(WorkerAction::Start, ws, 0).len(), 2);
    }

    #[test]
    fn no_workers_no_batches() {
        assert!(plan_batches(WorkerAction::Start, Vec::new(), 5).is_empty());
    }

    #[tokio::test]
    async fn failed_batch_does_not_stop_the_ramp() {
        let gateway = FakeGateway::uniform(1, 5);
        gateway.fail_worker("bot-0-2");
        let all: Vec<_> = (0..5).map(|i| WorkerId::new(0, format!("bot-0-{i}"))).collect();
        let mut inventory = Inventory::new(all.clone());
        let (_tx, mut rx) = watch::channel(false);

        let batches = plan_batches(WorkerAction::Start, all, 1);
        let outcome = execute(&gateway, &mut inventory, batches, Duration::ZERO, &mut rx, |_| {}).await;

        assert_eq!(outcome.started, 4);
        assert_eq!(outcome.failed, 1);
        assert_eq!(inventory.running_count(), 4);
        assert!(!inventory.is_running(&WorkerId::new(0, "bot-0-2")));
        assert_eq!(gateway.calls().len(), 5);
    }

    #[tokio::test]
    async fn failed_batch_is_retried_per_worker() {
        let gateway = FakeGateway::uniform(1, 5);
        gateway.fail_worker("bot-0-3");
        let all: Vec<_> = (0..5).map(|i| WorkerId::new(0, format!("bot-0-{i}"))).collect();
        let mut inventory = Inventory::new(all.clone());
        let (_tx, mut rx) = watch::channel(false);

        let mut changes = 0;
        let batches = plan_batches(WorkerAction::Start, all, 5);
        assert_eq!(batches.len(), 1);
        let outcome = execute(&gateway, &mut inventory, batches, Duration::ZERO, &mut rx, |_| {
            changes += 1
        })
        .await;

        assert_eq!(outcome.started, 4);
        assert_eq!(outcome.failed, 1);
        assert_eq!(inventory.running_count(), 4);
        assert!(!inventory.is_running(&WorkerId::new(0, "bot-0-3")));
        // The whole batch once, then each worker on its own.
        assert_eq!(gateway.calls().len(), 6);
        assert_eq!(changes, 1);
    }

    #[tokio::test]
    async fn failed_host_fails_every_retried_worker() {
        let gateway = FakeGateway::uniform(2, 3);
        let all: Vec<_> = (0..3).map(|i| WorkerId::new(0, format!("bot-0-{i}"))).collect();
        for w in &all {
            gateway.fail_worker(&w.name);
        }
        let mut inventory = Inventory::new(all.clone());
        let (_tx, mut rx) = watch::channel(false);

        let batches = plan_batches(WorkerAction::Start, all, 5);
        let outcome = execute(&gateway, &mut inventory, batches, Duration::ZERO, &mut rx, |_| {}).await;

        assert_eq!(outcome.started, 0);
        assert_eq!(outcome.failed, 3);
        assert_eq!(inventory.running_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_after_each_batch_except_the_last() {
        let gateway = FakeGateway::uniform(1, 4);
        let all: Vec<_> = (0..4).map(|i| WorkerId::new(0, format!("bot-0-{i}"))).collect();
        let mut inventory = Inventory::new(all.clone());
        let (_tx, mut rx) = watch::channel(false);

        let begin = Instant::now();
        let batches = plan_batches(WorkerAction::Start, all, 1);
        execute(&gateway, &mut inventory, batches, Duration::from_secs(10), &mut rx, |_| {}).await;

        let elapsed = begin.elapsed();
        assert!(elapsed >= Duration::from_secs(30) && elapsed < Duration::from_secs(31));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_scales_with_batch_size() {
        let gateway = FakeGateway::uniform(1, 4);
        let all: Vec<_> = (0..4).map(|i| WorkerId::new(0, format!("bot-0-{i}"))).collect();
        let mut inventory = Inventory::new(all.clone());
        let (_tx, mut rx) = watch::channel(false);

        let begin = Instant::now();
        let batches = plan_batches(WorkerAction::Start, all, 3);
        execute(&gateway, &mut inventory, batches, Duration::from_secs(10), &mut rx, |_| {}).await;

        // One wait of 3 × interval between the batch of 3 and the batch of 1.
        let elapsed = begin.elapsed();
        assert!(elapsed >= Duration::from_secs(30) && elapsed < Duration::from_secs(31));
    }

    #[tokio::test]
    async fn shutdown_before_ramp_abandons_everything() {
        let gateway = FakeGateway::uniform(1, 3);
        let all: Vec<_> = (0..3).map(|i| WorkerId::new(0, format!("bot-0-{i}"))).collect();
        let mut inventory = Inventory::new(all.clone());
        let (_tx, mut rx) = watch::channel(true);

        let batches = plan_batches(WorkerAction::Start, all, 1);
        let outcome = execute(&gateway, &mut inventory, batches, Duration::from_secs(1), &mut rx, |_| {}).await;

        assert!(outcome.aborted);
        assert_eq!(outcome.abandoned, 3);
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn on_change_sees_each_confirmed_batch() {
        let gateway = FakeGateway::uniform(2, 1);
        let all = workers(&[(0, "bot-0-0"), (1, "bot-1-0")]);
        let mut inventory = Inventory::new(all.clone());
        let (_tx, mut rx) = watch::channel(false);

        let mut seen = Vec::new();
        let batches = plan_batches(WorkerAction::Start, all, 5);
        execute(&gateway, &mut inventory, batches, Duration::ZERO, &mut rx, |inv| {
            seen.push(inv.running_count())
        })
        .await;

        assert_eq!(seen, vec![1, 2]);
    }
}
