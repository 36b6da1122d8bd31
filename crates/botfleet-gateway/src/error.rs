//! Host gateway error types.

use botfleet_core::{HostIndex, WorkerAction};
use thiserror::Error;

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Errors from talking to a bot host. None of them are fatal to the
/// controller; each one means "do less this cycle".
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("unknown host index {0}")]
    UnknownHost(HostIndex),

    #[error("host {host}: worker enumeration failed: {cause}")]
    DiscoveryFailure { host: HostIndex, cause: String },

    #[error("host {host}: {action} {names:?} failed: {cause}")]
    RemoteCallFailed {
        host: HostIndex,
        action: WorkerAction,
        names: Vec<String>,
        cause: String,
    },

    #[error("host {host}: status query failed: {cause}")]
    StatusQueryFailed { host: HostIndex, cause: String },
}
