//! Scaling policy variants and the decision computation.

use std::f64::consts::TAU;

use botfleet_core::{DemandReading, DemandSample, ScalingDecision};
use serde::{Deserialize, Serialize};

use crate::error::{PolicyError, PolicyResult};

/// Inputs a policy sees for one cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolicyInput {
    /// Workers currently in the running set.
    pub running: u32,
    /// Workers currently in the disabled set.
    pub disabled: u32,
    /// Upper bound on the running set.
    pub max_workers: u32,
    /// Hour of day, 0..=23.
    pub hour: u32,
    /// Minute of hour, 0..=59.
    pub minute: u32,
    pub demand: DemandReading,
}

/// How the controller turns time and demand into a target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Policy {
    /// Fixed fraction of `max_workers` per hour of day.
    HourlyCurve(HourlyCurveConfig),
    /// Smooth daily sine wave, interpolated within the hour.
    Sinusoidal(SinusoidalConfig),
    /// Peak/dip hour classification producing a one-directional nudge.
    PeakDip(PeakDipConfig),
    /// Start or stop workers in proportion to the change in demand.
    DemandProportional(DemandProportionalConfig),
}

impl Default for Policy {
    fn default() -> Self {
        Self::Sinusoidal(SinusoidalConfig::default())
    }
}

/// Configuration for the hourly percentage curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HourlyCurveConfig {
    /// One fraction in `[0, 1]` per hour of day.
    pub table: [f64; 24],
}

impl Default for HourlyCurveConfig {
    fn default() -> Self {
        Self {
            table: [
                0.20, 0.15, 0.10, 0.10, 0.10, 0.15, 0.25, 0.35, // 00-07
                0.40, 0.45, 0.50, 0.55, 0.60, 0.60, 0.60, 0.65, // 08-15
                0.70, 0.80, 0.90, 1.00, 1.00, 0.90, 0.60, 0.35, // 16-23
            ],
        }
    }
}

/// Configuration for the sinusoidal time-of-day curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinusoidalConfig {
    /// Hours added to the clock before evaluating the sine.
    /// `-6` puts the trough at midnight and the crest at noon.
    pub phase_shift: f64,
}

impl Default for SinusoidalConfig {
    fn default() -> Self {
        Self { phase_shift: -6.0 }
    }
}

/// Configuration for the peak/dip multiplier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeakDipConfig {
    pub peak_hours: Vec<u32>,
    pub dip_hours: Vec<u32>,
    /// Factor applied during peak hours (expected > 1).
    pub peak_factor: f64,
    /// Factor applied during dip hours (expected < 1).
    pub dip_factor: f64,
    /// Spreads the nudge over several cycles.
    pub batch_divisor: f64,
}

impl Default for PeakDipConfig {
    fn default() -> Self {
        Self {
            peak_hours: (18..=23).collect(),
            dip_hours: (2..=7).collect(),
            peak_factor: 1.5,
            dip_factor: 0.5,
            batch_divisor: 4.0,
        }
    }
}

/// Configuration for demand-delta proportional scaling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemandProportionalConfig {
    /// Workers to start (or stop) per unit of demand change.
    pub multiplication_factor: f64,
}

impl Default for DemandProportionalConfig {
    fn default() -> Self {
        Self {
            multiplication_factor: 1.0,
        }
    }
}

impl Policy {
    /// Short name used in logs and status output.
    pub fn name(&self) -> &'static str {
        match self {
            Self::HourlyCurve(_) => "hourly_curve",
            Self::Sinusoidal(_) => "sinusoidal",
            Self::PeakDip(_) => "peak_dip",
            Self::DemandProportional(_) => "demand_proportional",
        }
    }

    /// Whether the controller must sample demand before deciding.
    pub fn needs_demand(&self) -> bool {
        matches!(self, Self::DemandProportional(_))
    }

    /// Reject configurations that would produce meaningless decisions.
    pub fn validate(&self) -> PolicyResult<()> {
        match self {
            Self::HourlyCurve(cfg) => {
                for (hour, &value) in cfg.table.iter().enumerate() {
                    if !(0.0..=1.0).contains(&value) {
                        return Err(PolicyError::TableValueOutOfRange { hour, value });
                    }
                }
                Ok(())
            }
            Self::Sinusoidal(cfg) => check_factor("phase_shift", cfg.phase_shift.abs()),
            Self::PeakDip(cfg) => {
                for &hour in cfg.peak_hours.iter().chain(&cfg.dip_hours) {
                    if hour > 23 {
                        return Err(PolicyError::HourOutOfRange(hour));
                    }
                }
                check_factor("peak_factor", cfg.peak_factor)?;
                check_factor("dip_factor", cfg.dip_factor)?;
                if !(cfg.batch_divisor.is_finite() && cfg.batch_divisor > 0.0) {
                    return Err(PolicyError::InvalidBatchDivisor(cfg.batch_divisor));
                }
                Ok(())
            }
            Self::DemandProportional(cfg) => {
                check_factor("multiplication_factor", cfg.multiplication_factor)
            }
        }
    }

    /// Compute this cycle's decision.
    pub fn decide(&self, input: &PolicyInput) -> ScalingDecision {
        match self {
            Self::HourlyCurve(cfg) => {
                let fraction = cfg.table[(input.hour % 24) as usize].clamp(0.0, 1.0);
                let target = (input.max_workers as f64 * fraction).round();
                toward_target(input, target)
            }
            Self::Sinusoidal(cfg) => {
                let target = sinusoidal_target(
                    input.max_workers,
                    input.hour,
                    input.minute,
                    cfg.phase_shift,
                );
                toward_target(input, target)
            }
            Self::PeakDip(cfg) => peak_dip_nudge(cfg, input),
            Self::DemandProportional(cfg) => demand_nudge(cfg, input),
        }
    }
}

fn check_factor(name: &'static str, value: f64) -> PolicyResult<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(PolicyError::InvalidFactor { name, value })
    }
}

/// Sinusoidal target at `hour:minute`, linearly interpolated between the
/// rounded targets of this hour and the next.
fn sinusoidal_target(max_workers: u32, hour: u32, minute: u32, phase_shift: f64) -> f64 {
    let at_hour = |h: u32| -> f64 {
        let baseline = max_workers as f64 / 2.0;
        let amplitude = baseline;
        let angle = TAU / 24.0 * (h as f64 + phase_shift);
        (baseline + amplitude * angle.sin()).round()
    };

    let hour = hour % 24;
    let current = at_hour(hour);
    let next = at_hour((hour + 1) % 24);
    let fraction = minute.min(59) as f64 / 60.0;
    (current + (next - current) * fraction).round()
}

/// Decision for absolute-target policies.
fn toward_target(input: &PolicyInput, target: f64) -> ScalingDecision {
    let target = clamp_count(target).min(input.max_workers);
    let to_start = target.saturating_sub(input.running);
    let to_stop = input.running.saturating_sub(target);
    clamp_decision(input, Some(target), to_start, to_stop)
}

fn peak_dip_nudge(cfg: &PeakDipConfig, input: &PolicyInput) -> ScalingDecision {
    let factor = if cfg.peak_hours.contains(&input.hour) {
        cfg.peak_factor
    } else if cfg.dip_hours.contains(&input.hour) {
        cfg.dip_factor
    } else {
        1.0
    };
    let divisor = if cfg.batch_divisor > 0.0 {
        cfg.batch_divisor
    } else {
        1.0
    };

    if factor >= 1.0 {
        let to_start = clamp_count((input.disabled as f64 * factor / divisor).ceil());
        clamp_decision(input, None, to_start, 0)
    } else {
        // `1 - factor` is only meaningful below 1; clamp rather than let a
        // negative multiplier through.
        let shrink = (1.0 - factor).clamp(0.0, 1.0);
        let to_stop = clamp_count((input.running as f64 * shrink / divisor).ceil());
        clamp_decision(input, None, 0, to_stop)
    }
}

fn demand_nudge(cfg: &DemandProportionalConfig, input: &PolicyInput) -> ScalingDecision {
    // A zero sample on either side means "unknown", not "nobody online".
    let known = |s: Option<DemandSample>| s.is_some_and(|s| s.value > 0);
    let delta = match input.demand.delta() {
        Some(d) if d != 0 && known(input.demand.current) && known(input.demand.previous) => d,
        _ => return ScalingDecision::hold(input.running),
    };

    let amount = clamp_count((delta.unsigned_abs() as f64 * cfg.multiplication_factor).round());
    if delta > 0 {
        clamp_decision(input, None, amount, 0)
    } else {
        clamp_decision(input, None, 0, amount)
    }
}

/// Convert a computed count to `u32`, mapping negatives and NaN to zero.
fn clamp_count(value: f64) -> u32 {
    if value.is_nan() || value <= 0.0 {
        0
    } else {
        value.min(u32::MAX as f64) as u32
    }
}

/// Apply the limits every policy shares: never start more than are
/// disabled, never exceed `max_workers`, never stop more than are running.
fn clamp_decision(
    input: &PolicyInput,
    target: Option<u32>,
    to_start: u32,
    to_stop: u32,
) -> ScalingDecision {
    let headroom = input.max_workers.saturating_sub(input.running);
    let to_start = to_start.min(input.disabled).min(headroom);
    let to_stop = to_stop.min(input.running);
    let target_active = target.unwrap_or_else(|| (input.running + to_start).saturating_sub(to_stop));

    ScalingDecision {
        target_active,
        current_active: input.running,
        to_start,
        to_stop,
    }
}
