use common::IsTransient;
use thiserror::Error;

use crate::{AggregateId, Version};

/// Errors raised by a write repository.
#[derive(Debug, Error)]
pub enum WriteStoreError {
    /// The stored version did not match the expected version at write time.
    #[error(
        "Concurrency conflict for aggregate {aggregate_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        aggregate_id: AggregateId,
        expected: Version,
        actual: Version,
    },

    /// No record exists for the aggregate.
    #[error("Aggregate not found: {0}")]
    AggregateNotFound(AggregateId),

    /// The commit is malformed and was rejected before touching storage.
    #[error("Invalid commit: {0}")]
    InvalidCommit(String),

    /// The backing store could not be reached; nothing was written.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// The operation missed its deadline. Whether it took effect is unknown.
    #[error("Storage operation '{operation}' timed out")]
    Timeout { operation: &'static str },

    /// A state snapshot could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl IsTransient for WriteStoreError {
    fn is_transient(&self) -> bool {
        matches!(self, WriteStoreError::Unavailable(_))
    }
}

/// Result type for write repository operations.
pub type Result<T> = std::result::Result<T, WriteStoreError>;
