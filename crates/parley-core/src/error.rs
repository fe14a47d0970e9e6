//! Error types surfaced by the sessions.

use crate::services::ServiceError;
use crate::store::StoreError;
use thiserror::Error;

/// Errors returned by session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Input rejected before any state transition.
    #[error("invalid input: {0}")]
    Validation(String),
    /// Persistence failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    /// Assistant or enhancement service failed.
    #[error("service error: {0}")]
    Service(#[from] ServiceError),
    /// Anything else.
    #[error("unexpected error: {0}")]
    Unexpected(String),
}
