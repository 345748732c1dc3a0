//! Gateway error type with stable error-code mapping.

use domain::DomainError;
use event_bus::BusError;
use projections::{ProjectionError, QueryError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Unknown command type '{0}'")]
    UnknownCommand(String),

    #[error("Unknown query type '{0}'")]
    UnknownQuery(String),

    #[error("Invalid payload for {kind}: {source}")]
    InvalidPayload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{0} requires an aggregateId")]
    MissingAggregateId(String),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("Event bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Projection error: {0}")]
    Projection(#[from] ProjectionError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GatewayError {
    /// Stable code reported to adapters.
    pub fn error_code(&self) -> &'static str {
        match self {
            GatewayError::UnknownCommand(_)
            | GatewayError::UnknownQuery(_)
            | GatewayError::InvalidPayload { .. }
            | GatewayError::MissingAggregateId(_) => "ValidationError",
            GatewayError::Domain(e) => e.error_code(),
            GatewayError::Query(e) => e.error_code(),
            GatewayError::Bus(_) | GatewayError::Projection(_) | GatewayError::Serialization(_) => {
                "InfrastructureError"
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use common::AggregateId;
    use domain::ValidationError;

    use super::*;

    #[test]
    fn contract_errors_are_validation_errors() {
        assert_eq!(
            GatewayError::UnknownCommand("Launch".into()).error_code(),
            "ValidationError"
        );
        assert_eq!(
            GatewayError::MissingAggregateId("LogWork".into()).error_code(),
            "ValidationError"
        );
    }

    #[test]
    fn wrapped_errors_keep_their_codes() {
        let domain = GatewayError::from(DomainError::from(ValidationError::new("name", "empty")));
        assert_eq!(domain.error_code(), "ValidationError");

        let query = GatewayError::from(QueryError::NotFound(AggregateId::new()));
        assert_eq!(query.error_code(), "NotFound");

        assert_eq!(GatewayError::from(BusError::Closed).error_code(), "InfrastructureError");
    }
}
