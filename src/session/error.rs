//! Session error types

use crate::storage::StorageError;
use thiserror::Error;

/// Errors from session mutations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;
