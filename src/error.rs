use std::time::Duration;
use thiserror::Error;

/// Failures of a single policy inference call.
///
/// Every variant is handled the same way by the sequencer: the call is
/// treated as a failed inference and the previous joint targets are held.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PolicyError {
    #[error("Transport failed: {0}")]
    Transport(String),

    #[error("Deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),

    #[error("Inference rejected by server: {0}")]
    Rejected(String),

    #[error("Malformed response: {0}")]
    Malformed(String),
}

/// Control stack error types
#[derive(Error, Debug)]
pub enum ControlError {
    #[error("Observation length {actual} does not match contract length {expected}")]
    ObservationLength { expected: usize, actual: usize },

    #[error("Action length {actual} does not match joint count {expected}")]
    ActionLength { expected: usize, actual: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Policy error: {0}")]
    Policy(#[from] PolicyError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Result type for control operations
pub type ControlResult<T> = Result<T, ControlError>;
