//! Read side error types.

use common::AggregateId;
use event_bus::HandlerError;
use thiserror::Error;
use write_store::Version;

/// Errors that can occur during projection processing.
#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("Write store error: {0}")]
    WriteStore(#[from] write_store::WriteStoreError),

    #[error("Event deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// An event arrived for a view that was never created.
    #[error("No {view} view for aggregate {aggregate_id} (event version {version})")]
    MissingView {
        view: &'static str,
        aggregate_id: AggregateId,
        version: Version,
    },

    /// An event arrived before an earlier event of the same aggregate was
    /// applied. Redelivering the missing event first resolves it.
    #[error("{view} for aggregate {aggregate_id} expects version {expected}, got {actual}")]
    VersionGap {
        view: &'static str,
        aggregate_id: AggregateId,
        expected: Version,
        actual: Version,
    },

    /// The read store could not be reached.
    #[error("Read store unavailable: {0}")]
    Unavailable(String),

    #[error("Projection error: {0}")]
    Projection(String),
}

impl ProjectionError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ProjectionError::Unavailable(_))
    }
}

impl From<ProjectionError> for HandlerError {
    fn from(err: ProjectionError) -> Self {
        if err.is_transient() {
            HandlerError::Transient(err.to_string())
        } else {
            HandlerError::Permanent(err.to_string())
        }
    }
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;

/// Errors returned to query callers.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Not found: {0}")]
    NotFound(AggregateId),

    #[error("Invalid query: {0}")]
    InvalidFilter(String),

    #[error("Read store error: {0}")]
    ReadStore(#[from] ProjectionError),
}

impl QueryError {
    pub fn error_code(&self) -> &'static str {
        match self {
            QueryError::NotFound(_) => "NotFound",
            QueryError::InvalidFilter(_) => "ValidationError",
            QueryError::ReadStore(_) => "InfrastructureError",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::IsTransient;

    #[test]
    fn only_unavailable_is_retried_by_the_bus() {
        let transient = HandlerError::from(ProjectionError::Unavailable("down".into()));
        assert!(transient.is_transient());

        let permanent = HandlerError::from(ProjectionError::MissingView {
            view: "ProjectView",
            aggregate_id: AggregateId::new(),
            version: Version::new(2),
        });
        assert!(!permanent.is_transient());
    }

    #[test]
    fn query_error_codes() {
        assert_eq!(QueryError::NotFound(AggregateId::new()).error_code(), "NotFound");
        assert_eq!(
            QueryError::InvalidFilter("status".into()).error_code(),
            "ValidationError"
        );
    }
}
