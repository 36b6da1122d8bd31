//! Demand sampling errors.

use thiserror::Error;

pub type DemandResult<T> = Result<T, DemandError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DemandError {
    /// The metric source is unreachable or returned an incomplete count.
    /// The caller keeps using the previous sample.
    #[error("demand sample unavailable: {0}")]
    SampleUnavailable(String),
}
