//! Error types for the configuration store.

use thiserror::Error;

/// Result type alias for configuration store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during configuration store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no tracker for destination: {0}")]
    NotFound(String),

    #[error("tracker already exists for destination: {0}")]
    AlreadyExists(String),

    #[error("refresh interval must be at least 1 minute, got {0}")]
    InvalidInterval(u32),

    #[error("failed to persist configuration: {0}")]
    Persist(String),

    #[error("serialization error: {0}")]
    Serialize(String),
}
