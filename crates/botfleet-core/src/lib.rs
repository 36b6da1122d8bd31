//! botfleet-core — shared domain types for the fleet demand controller.
//!
//! Every other botfleet crate speaks in these types: a worker is keyed by
//! `(host, name)`, demand is a timestamped scalar, and each control cycle
//! produces one `ScalingDecision`.

pub mod duration;
pub mod types;

pub use duration::parse_duration;
pub use types::*;
