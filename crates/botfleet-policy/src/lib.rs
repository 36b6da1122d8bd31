//! botfleet-policy — demand-to-target scaling policies.
//!
//! A `Policy` is a pure function of the inventory sizes, the time of day,
//! and (for the demand-driven variant) the latest demand delta. Every
//! variant returns a `ScalingDecision` whose counts are clamped so that
//! the running set never exceeds `max_workers` and never goes negative.
//!
//! # Variants
//!
//! ```text
//! hourly_curve         target = round(max * table[hour])
//! sinusoidal           target = lerp(s(hour), s(hour+1), minute/60)
//!                      s(h)   = round(max/2 + max/2 * sin(2π/24 * (h + shift)))
//! peak_dip             one-directional nudge from the hour's factor
//! demand_proportional  to_start/to_stop = |Δdemand| * multiplication_factor
//! ```

pub mod error;
pub mod policy;

pub use error::{PolicyError, PolicyResult};
pub use policy::{
    DemandProportionalConfig, HourlyCurveConfig, PeakDipConfig, Policy, PolicyInput,
    SinusoidalConfig,
};
