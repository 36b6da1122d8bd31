//! Domain types for the fleet demand controller.
//!
//! Workers are discovered once at startup and never added or removed
//! afterwards; only their activity state changes. Decisions and samples
//! are derived per cycle and never persisted.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Index into the fixed, ordered list of backend hosts.
pub type HostIndex = usize;

// ── Worker ─────────────────────────────────────────────────────────

/// Identity of a remotely-hosted worker.
///
/// Names are only unique within a host, so the pair is the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkerId {
    pub host: HostIndex,
    pub name: String,
}

impl WorkerId {
    pub fn new(host: HostIndex, name: impl Into<String>) -> Self {
        Self {
            host,
            name: name.into(),
        }
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.host)
    }
}

/// A start or stop request for one or more workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerAction {
    Start,
    Stop,
}

impl WorkerAction {
    /// Path segment used by the host IPC API.
    pub fn as_path_segment(&self) -> &'static str {
        match self {
            Self::Start => "Start",
            Self::Stop => "Stop",
        }
    }
}

impl fmt::Display for WorkerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => f.write_str("start"),
            Self::Stop => f.write_str("stop"),
        }
    }
}

// ── Demand ─────────────────────────────────────────────────────────

/// A single observation of the demand signal (e.g. concurrent users).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemandSample {
    pub value: u64,
    pub observed_at: DateTime<Utc>,
}

impl DemandSample {
    pub fn new(value: u64, observed_at: DateTime<Utc>) -> Self {
        Self { value, observed_at }
    }
}

/// Current and previous demand samples as seen by one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DemandReading {
    pub current: Option<DemandSample>,
    pub previous: Option<DemandSample>,
    /// False when the latest sampling attempt failed and the last good
    /// sample was reused.
    pub fresh: bool,
}

impl DemandReading {
    /// `current - previous`, or `None` until two samples exist.
    pub fn delta(&self) -> Option<i64> {
        match (self.current, self.previous) {
            (Some(cur), Some(prev)) => Some(cur.value as i64 - prev.value as i64),
            _ => None,
        }
    }
}

// ── Decision ───────────────────────────────────────────────────────

/// Output of the scaling policy for one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScalingDecision {
    pub target_active: u32,
    pub current_active: u32,
    pub to_start: u32,
    pub to_stop: u32,
}

impl ScalingDecision {
    /// A decision that changes nothing.
    pub fn hold(current_active: u32) -> Self {
        Self {
            target_active: current_active,
            current_active,
            to_start: 0,
            to_stop: 0,
        }
    }

    /// Number of logical start/stop operations this decision asks for.
    pub fn operations(&self) -> u32 {
        self.to_start + self.to_stop
    }

    pub fn is_noop(&self) -> bool {
        self.operations() == 0
    }
}

// ── Cycle ──────────────────────────────────────────────────────────

/// Phase of the control cycle state machine.
///
/// `Idle → Sampling → Deciding → Ramping → Idle`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePhase {
    #[default]
    Idle,
    Sampling,
    Deciding,
    Ramping,
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Sampling => "sampling",
            Self::Deciding => "deciding",
            Self::Ramping => "ramping",
        };
        f.write_str(s)
    }
}
