//! Fleet inventory — which known workers are running and which are not.
//!
//! The population is fixed once discovery completes. Every known worker is
//! in exactly one of `running` or `disabled`; a transition only moves a
//! worker between the two sets.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use botfleet_core::{HostIndex, WorkerAction, WorkerId};
use botfleet_gateway::HostGateway;

#[derive(Debug, Clone, Default)]
pub struct Inventory {
    running: BTreeSet<WorkerId>,
    disabled: BTreeSet<WorkerId>,
}

impl Inventory {
    /// Build an inventory with every worker initially disabled.
    pub fn new(workers: impl IntoIterator<Item = WorkerId>) -> Self {
        Self {
            running: BTreeSet::new(),
            disabled: workers.into_iter().collect(),
        }
    }

    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    pub fn disabled_count(&self) -> usize {
        self.disabled.len()
    }

    pub fn total(&self) -> usize {
        self.running.len() + self.disabled.len()
    }

    pub fn contains(&self, worker: &WorkerId) -> bool {
        self.running.contains(worker) || self.disabled.contains(worker)
    }

    pub fn is_running(&self, worker: &WorkerId) -> bool {
        self.running.contains(worker)
    }

    pub fn running(&self) -> impl Iterator<Item = &WorkerId> {
        self.running.iter()
    }

    pub fn disabled(&self) -> impl Iterator<Item = &WorkerId> {
        self.disabled.iter()
    }

    /// Move a worker to the set matching a confirmed `action`.
    ///
    /// Returns `true` if the worker changed sets. Repeating a transition
    /// is a no-op, and workers outside the inventory are ignored.
    pub fn record_transition(&mut self, worker: &WorkerId, action: WorkerAction) -> bool {
        let (from, to) = match action {
            WorkerAction::Start => (&mut self.disabled, &mut self.running),
            WorkerAction::Stop => (&mut self.running, &mut self.disabled),
        };

        if from.remove(worker) {
            to.insert(worker.clone());
            return true;
        }
        if !to.contains(worker) {
            warn!(%worker, %action, "transition for unknown worker ignored");
        }
        false
    }
}

// ── Discovery ──────────────────────────────────────────────────────

/// Result of enumerating workers on every host.
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    /// Discovered workers in host order.
    pub workers: Vec<WorkerId>,
    /// Hosts whose enumeration failed; they contribute no workers.
    pub failed_hosts: Vec<HostIndex>,
}

/// Enumerate workers on all hosts concurrently.
pub async fn discover(gateway: &Arc<dyn HostGateway>) -> Discovery {
    let host_count = gateway.host_count();
    let mut tasks = JoinSet::new();
    for host in 0..host_count {
        let gateway = gateway.clone();
        tasks.spawn(async move { (host, gateway.list_worker_names(host).await) });
    }

    let mut per_host: Vec<Option<Vec<String>>> = vec![None; host_count];
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((host, Ok(names))) => {
                debug!(host, workers = names.len(), "host enumerated");
                per_host[host] = Some(names);
            }
            Ok((host, Err(e))) => {
                warn!(host, error = %e, "worker discovery failed for host");
            }
            Err(e) => {
                warn!(error = %e, "discovery task aborted");
            }
        }
    }

    let mut discovery = Discovery::default();
    for (host, names) in per_host.into_iter().enumerate() {
        match names {
            Some(names) => discovery
                .workers
                .extend(names.into_iter().map(|name| WorkerId::new(host, name))),
            None => discovery.failed_hosts.push(host),
        }
    }

    info!(
        hosts = host_count,
        failed_hosts = discovery.failed_hosts.len(),
        workers = discovery.workers.len(),
        "worker discovery complete"
    );
    discovery
}
