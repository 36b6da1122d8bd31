//! The `HostGateway` contract the controller depends on.

use std::sync::LazyLock;

use async_trait::async_trait;
use botfleet_core::{HostIndex, WorkerAction};
use regex::Regex;

use crate::error::GatewayResult;

/// Per-host capability to enumerate workers and start/stop them by name.
///
/// Implementations must be safe to call concurrently for different hosts;
/// discovery fans out across hosts in parallel.
#[async_trait]
pub trait HostGateway: Send + Sync {
    /// Number of hosts, fixed for the process lifetime.
    fn host_count(&self) -> usize;

    /// Names of all workers known to `host`, in the host's order.
    async fn list_worker_names(&self, host: HostIndex) -> GatewayResult<Vec<String>>;

    /// Start or stop a batch of named workers on one host.
    async fn apply(
        &self,
        host: HostIndex,
        action: WorkerAction,
        names: &[String],
    ) -> GatewayResult<()>;

    /// Raw status document for a host.
    async fn host_status(&self, host: HostIndex) -> GatewayResult<serde_json::Value>;

    async fn start_workers(&self, host: HostIndex, names: &[String]) -> GatewayResult<()> {
        self.apply(host, WorkerAction::Start, names).await
    }

    async fn stop_workers(&self, host: HostIndex, names: &[String]) -> GatewayResult<()> {
        self.apply(host, WorkerAction::Stop, names).await
    }
}

static WORKER_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<([^>]+)>").expect("worker name pattern is valid"));

/// Extract every `<name>` token from a free-text status response.
///
/// Order of first appearance is preserved; repeated names are dropped.
pub fn parse_worker_names(text: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for cap in WORKER_NAME.captures_iter(text) {
        let name = cap[1].trim();
        if !name.is_empty() && !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_bracketed_names_in_order() {
        let text = "<bot1> Bot is running.\n<bot2> Bot is not running.\n<bot3> Bot is paused.";
        assert_eq!(parse_worker_names(text), vec!["bot1", "bot2", "bot3"]);
    }

    #[test]
    fn ignores_text_without_tokens() {
        assert!(parse_worker_names("No bots are defined.").is_empty());
        assert!(parse_worker_names("").is_empty());
    }

    #[test]
    fn drops_duplicate_and_empty_tokens() {
        let text = "<a> one <b> two <a> again <> <  >";
        assert_eq!(parse_worker_names(text), vec!["a", "b"]);
    }

    #[test]
    fn tokens_do_not_span_closing_bracket() {
        assert_eq!(parse_worker_names("<x><y>"), vec!["x", "y"]);
    }
}
