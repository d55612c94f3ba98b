// Central Error Types for the Engine

use thiserror::Error;

/// Admission rejection (non-exceptional: surfaced as a return value,
/// fires no lifecycle event, leaves no trace in the queue)
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    #[error("command is locked")]
    Locked,

    #[error("parameter rejected by admission policy")]
    ValidationFailed,
}

/// Engine-level error type
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    #[error("Invalid capacity: {0} (must be >= 1)")]
    InvalidCapacity(usize),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;
