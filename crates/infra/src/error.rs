use thiserror::Error;

use meetpay_core::DomainError;
use meetpay_escrow::EscrowError;

use crate::store::StoreError;

/// Error returned by every lifecycle operation.
///
/// - `Validation` and `Authorization` are deterministic: never retry.
/// - `Conflict` means the invite moved underneath the caller: re-fetch it.
/// - `Escrow` aborted the transition; the invite kept its prior status.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("not authorized: {0}")]
    Authorization(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Escrow(#[from] EscrowError),

    /// The operation is not valid from the invite's current status.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("store failure: {0}")]
    Store(String),
}

impl EngineError {
    pub fn invalid_transition(msg: impl Into<String>) -> Self {
        EngineError::InvalidTransition(msg.into())
    }

    /// The caller should re-fetch the invite before deciding what to do.
    pub fn is_conflict(&self) -> bool {
        matches!(self, EngineError::Conflict(_))
    }
}

impl From<DomainError> for EngineError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => EngineError::Validation(msg),
            DomainError::NotFound(what) => EngineError::NotFound(what),
            DomainError::Unauthorized(msg) => EngineError::Authorization(msg),
            DomainError::Conflict(msg) => EngineError::Conflict(msg),
            DomainError::InvariantViolation(msg) => EngineError::InvalidTransition(msg),
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Concurrency(_) | StoreError::Constraint(_) | StoreError::Busy(_) => {
                EngineError::Conflict(value.to_string())
            }
            StoreError::InvalidChange(_) | StoreError::Backend(_) => EngineError::Store(value.to_string()),
        }
    }
}
