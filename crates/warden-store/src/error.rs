//! Store errors

use thiserror::Error;

/// Credential store errors
///
/// These are infrastructure failures; authentication outcomes (wrong password,
/// unknown user) are never reported through this type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Record not found for a write that requires it
    #[error("record not found")]
    NotFound,

    /// Uniqueness constraint violated
    #[error("conflict: {0}")]
    Conflict(String),

    /// Backend unreachable or failed
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Result alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;
