//! Domain error types.

use common::AggregateId;
use thiserror::Error;
use write_store::{EnvelopeError, Version, WriteStoreError};

/// A command payload is malformed. Raised before any aggregate is touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// An aggregate refused a command because an invariant would break.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{rule}: {message}")]
pub struct BusinessRuleViolation {
    /// Stable rule code, e.g. `InvalidTransition`.
    pub rule: &'static str,
    pub message: String,
}

/// Errors surfaced by command handling.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Business rule violated: {0}")]
    BusinessRule(#[from] BusinessRuleViolation),

    /// The aggregate moved on since the caller (or this handler) read it.
    #[error(
        "Concurrency conflict on aggregate {aggregate_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        aggregate_id: AggregateId,
        expected: Version,
        actual: Version,
    },

    #[error("Aggregate not found: {aggregate_type} with id {aggregate_id}")]
    AggregateNotFound {
        aggregate_type: &'static str,
        aggregate_id: AggregateId,
    },

    /// A write timed out; it may or may not have been applied.
    #[error("Outcome unknown: {0}")]
    OutcomeUnknown(String),

    /// Storage stayed unavailable after retries.
    #[error("Infrastructure error: {0}")]
    Infrastructure(WriteStoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Malformed event envelope: {0}")]
    Envelope(#[from] EnvelopeError),
}

impl DomainError {
    /// Stable code returned to command callers.
    pub fn error_code(&self) -> &'static str {
        match self {
            DomainError::Validation(_) => "ValidationError",
            DomainError::BusinessRule(violation) => violation.rule,
            DomainError::ConcurrencyConflict { .. } => "ConcurrencyConflict",
            DomainError::AggregateNotFound { .. } => "NotFound",
            DomainError::OutcomeUnknown(_) => "OutcomeUnknown",
            DomainError::Infrastructure(_)
            | DomainError::Serialization(_)
            | DomainError::Envelope(_) => "InfrastructureError",
        }
    }

    /// True for errors the caller caused and can fix by changing the request.
    pub fn is_business_facing(&self) -> bool {
        matches!(
            self,
            DomainError::Validation(_)
                | DomainError::BusinessRule(_)
                | DomainError::ConcurrencyConflict { .. }
                | DomainError::AggregateNotFound { .. }
        )
    }
}

impl From<WriteStoreError> for DomainError {
    fn from(err: WriteStoreError) -> Self {
        match err {
            WriteStoreError::ConcurrencyConflict {
                aggregate_id,
                expected,
                actual,
            } => DomainError::ConcurrencyConflict {
                aggregate_id,
                expected,
                actual,
            },
            WriteStoreError::AggregateNotFound(aggregate_id) => DomainError::AggregateNotFound {
                aggregate_type: "aggregate",
                aggregate_id,
            },
            WriteStoreError::Timeout { operation } => {
                DomainError::OutcomeUnknown(format!("{operation} did not finish before its deadline"))
            }
            WriteStoreError::Serialization(e) => DomainError::Serialization(e),
            other => DomainError::Infrastructure(other),
        }
    }
}
