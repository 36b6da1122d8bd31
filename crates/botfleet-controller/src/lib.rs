//! botfleet-controller — keeps the active worker count tracking demand.
//!
//! # Architecture
//!
//! ```text
//! Controller
//!   ├── CycleState (behind one async mutex: a cycle holds it end to end)
//!   │   ├── Inventory      running / disabled sets, fixed population
//!   │   ├── DemandSampler  optional, current + previous sample
//!   │   └── StdRng         candidate selection
//!   ├── Policy             (running, disabled, time, demand) → ScalingDecision
//!   ├── HostGateway        batched start/stop calls per host
//!   └── FleetStatus        watch channel, readable while a cycle runs
//! ```
//!
//! # Cycle
//!
//! `Idle → Sampling → Deciding → Ramping → Idle`. Ramping draws candidates
//! without replacement, groups them into per-host batches, and spaces the
//! calls `cycle_period / operations` apart per worker. The inventory only
//! changes after a host confirms a call.

pub mod candidates;
pub mod controller;
pub mod error;
pub mod inventory;
pub mod ramp;

pub use candidates::CandidatePool;
pub use controller::{
    BootstrapReport, Clock, Controller, ControllerConfig, CycleReport, FleetStatus, WorkerListing,
};
pub use error::{ControllerError, ControllerResult};
pub use inventory::{Discovery, Inventory, discover};
pub use ramp::{Batch, RampOutcome, pacing_interval, plan_batches};
