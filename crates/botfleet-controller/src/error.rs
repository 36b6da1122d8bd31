//! Controller error types.

use thiserror::Error;

pub type ControllerResult<T> = Result<T, ControllerError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControllerError {
    /// Another cycle (or bootstrap) holds the inventory.
    #[error("a control cycle is already in progress")]
    CycleOverlap,

    #[error("fleet inventory was already discovered")]
    AlreadyBootstrapped,
}
