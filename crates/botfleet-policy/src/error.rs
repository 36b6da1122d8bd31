//! Policy validation errors.

use thiserror::Error;

pub type PolicyResult<T> = Result<T, PolicyError>;

/// A policy configuration that cannot produce sane decisions.
#[derive(Debug, Error, PartialEq)]
pub enum PolicyError {
    #[error("hourly table value {value} for hour {hour} is outside [0, 1]")]
    TableValueOutOfRange { hour: usize, value: f64 },

    #[error("hour {0} is outside 0..=23")]
    HourOutOfRange(u32),

    #[error("{name} must be non-negative and finite, got {value}")]
    InvalidFactor { name: &'static str, value: f64 },

    #[error("batch divisor must be positive, got {0}")]
    InvalidBatchDivisor(f64),
}
