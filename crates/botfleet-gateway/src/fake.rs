//! In-memory `HostGateway` for tests.
//!
//! Records every call, tracks which workers it believes are running, and
//! can be told to fail enumeration for whole hosts or start/stop calls for
//! specific worker names.

use std::collections::{BTreeSet, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use botfleet_core::{HostIndex, WorkerAction, WorkerId};

use crate::error::{GatewayError, GatewayResult};
use crate::gateway::HostGateway;

/// A start/stop call observed by the fake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayCall {
    pub host: HostIndex,
    pub action: WorkerAction,
    pub names: Vec<String>,
}

#[derive(Default)]
struct FakeState {
    calls: Vec<GatewayCall>,
    failing_hosts: HashSet<HostIndex>,
    failing_names: HashSet<String>,
    running: BTreeSet<WorkerId>,
}

pub struct FakeGateway {
    hosts: Vec<Vec<String>>,
    call_delay: Duration,
    state: Mutex<FakeState>,
}

impl FakeGateway {
    /// A fake with the given worker names per host.
    pub fn new(hosts: Vec<Vec<String>>) -> Self {
        Self {
            hosts,
            call_delay: Duration::ZERO,
            state: Mutex::new(FakeState::default()),
        }
    }

    /// `hosts` hosts with `per_host` workers each, named `bot-{host}-{i}`.
    pub fn uniform(hosts: usize, per_host: usize) -> Self {
        Self::new(
            (0..hosts)
                .map(|h| (0..per_host).map(|i| format!("bot-{h}-{i}")).collect())
                .collect(),
        )
    }

    /// Delay every start/stop call by `delay`.
    pub fn with_call_delay(mut self, delay: Duration) -> Self {
        self.call_delay = delay;
        self
    }

    /// Make worker enumeration fail for `host`.
    pub fn fail_host(&self, host: HostIndex) {
        self.state.lock().failing_hosts.insert(host);
    }

    /// Make any start/stop batch containing `name` fail.
    pub fn fail_worker(&self, name: &str) {
        self.state.lock().failing_names.insert(name.to_string());
    }

    /// Every start/stop call made so far, in order.
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.state.lock().calls.clone()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Workers the fake believes are running.
    pub fn running(&self) -> BTreeSet<WorkerId> {
        self.state.lock().running.clone()
    }
}

#[async_trait]
impl HostGateway for FakeGateway {
    fn host_count(&self) -> usize {
        self.hosts.len()
    }

    async fn list_worker_names(&self, host: HostIndex) -> GatewayResult<Vec<String>> {
        let names = self.hosts.get(host).ok_or(GatewayError::UnknownHost(host))?;
        if self.state.lock().failing_hosts.contains(&host) {
            return Err(GatewayError::DiscoveryFailure {
                host,
                cause: "connection refused".to_string(),
            });
        }
        Ok(names.clone())
    }

    async fn apply(
        &self,
        host: HostIndex,
        action: WorkerAction,
        names: &[String],
    ) -> GatewayResult<()> {
        if host >= self.hosts.len() {
            return Err(GatewayError::UnknownHost(host));
        }
        if !self.call_delay.is_zero() {
            tokio::time::sleep(self.call_delay).await;
        }

        let mut state = self.state.lock();
        state.calls.push(GatewayCall {
            host,
            action,
            names: names.to_vec(),
        });

        if let Some(bad) = names.iter().find(|n| state.failing_names.contains(*n)) {
            return Err(GatewayError::RemoteCallFailed {
                host,
                action,
                names: names.to_vec(),
                cause: format!("bot {bad} not found"),
            });
        }

        for name in names {
            let id = WorkerId::new(host, name.clone());
            match action {
                WorkerAction::Start => {
                    state.running.insert(id);
                }
                WorkerAction::Stop => {
                    state.running.remove(&id);
                }
            }
        }
        Ok(())
    }

    async fn host_status(&self, host: HostIndex) -> GatewayResult<serde_json::Value> {
        let names = self.hosts.get(host).ok_or(GatewayError::UnknownHost(host))?;
        Ok(serde_json::json!({ "host": host, "bots": names.len() }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_calls_and_running_set() {
        let gw = FakeGateway::uniform(2, 2);
        gw.start_workers(1, &["bot-1-0".to_string()]).await.unwrap();

        assert_eq!(gw.calls().len(), 1);
        assert!(gw.running().contains(&WorkerId::new(1, "bot-1-0")));

        gw.stop_workers(1, &["bot-1-0".to_string()]).await.unwrap();
        assert!(gw.running().is_empty());
    }

    #[tokio::test]
    async fn failing_worker_fails_whole_batch() {
        let gw = FakeGateway::uniform(1, 3);
        gw.fail_worker("bot-0-1");

        let names = vec!["bot-0-0".to_string(), "bot-0-1".to_string()];
        assert!(gw.start_workers(0, &names).await.is_err());
        assert!(gw.running().is_empty());
    }

    #[tokio::test]
    async fn failing_host_fails_enumeration() {
        let gw = FakeGateway::uniform(2, 1);
        gw.fail_host(0);
        assert!(gw.list_worker_names(0).await.is_err());
        assert_eq!(gw.list_worker_names(1).await.unwrap(), vec!["bot-1-0"]);
    }
}
