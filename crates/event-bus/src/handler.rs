//! Subscriber side of the bus.

use std::collections::BTreeSet;

use async_trait::async_trait;
use common::IsTransient;
use thiserror::Error;
use write_store::EventEnvelope;

/// Why a handler could not process an event.
#[derive(Debug, Clone, Error)]
pub enum HandlerError {
    /// Worth retrying, e.g. a store that is briefly unavailable.
    #[error("transient handler failure: {0}")]
    Transient(String),

    /// Retrying will not help. The event goes straight to dead letters.
    #[error("permanent handler failure: {0}")]
    Permanent(String),
}

impl IsTransient for HandlerError {
    fn is_transient(&self) -> bool {
        matches!(self, HandlerError::Transient(_))
    }
}

/// Receives events from the bus.
///
/// Delivery is at least once: the same event may arrive more than once, and
/// implementations must tolerate that. Events of one aggregate arrive in
/// version order.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Name used in logs, metrics and dead letters.
    fn name(&self) -> &str;

    async fn handle(&self, event: &EventEnvelope) -> Result<(), HandlerError>;
}

/// Which event types a subscription receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventFilter {
    All,
    Types(BTreeSet<String>),
}

impl EventFilter {
    pub fn single(event_type: impl Into<String>) -> Self {
        EventFilter::Types(BTreeSet::from([event_type.into()]))
    }

    pub fn types<I, T>(event_types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        EventFilter::Types(event_types.into_iter().map(Into::into).collect())
    }

    pub fn matches(&self, event_type: &str) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Types(types) => types.contains(event_type),
        }
    }
}
