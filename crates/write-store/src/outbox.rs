//! Outbox entries: events committed with their aggregate, awaiting handoff.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::EventEnvelope;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutboxStatus {
    /// Committed but not yet acknowledged by the bus.
    #[default]
    Pending,
    /// Accepted by the bus.
    Dispatched,
}

/// An event waiting in (or released from) the outbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEntry {
    /// Global commit order across all aggregates.
    pub sequence: u64,
    pub event: EventEnvelope,
    pub status: OutboxStatus,
    /// Failed handoff attempts so far.
    pub attempts: u32,
    pub last_error: Option<String>,
    pub enqueued_at: DateTime<Utc>,
    pub dispatched_at: Option<DateTime<Utc>>,
}

impl OutboxEntry {
    pub fn pending(sequence: u64, event: EventEnvelope) -> Self {
        Self {
            sequence,
            event,
            status: OutboxStatus::Pending,
            attempts: 0,
            last_error: None,
            enqueued_at: Utc::now(),
            dispatched_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == OutboxStatus::Pending
    }

    pub fn mark_dispatched(&mut self) {
        self.status = OutboxStatus::Dispatched;
        self.dispatched_at = Some(Utc::now());
    }

    /// Records a failed handoff. The entry stays pending.
    pub fn record_failure(&mut self, error: &str) {
        self.attempts += 1;
        self.last_error = Some(error.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AggregateId, Version};

    fn entry() -> OutboxEntry {
        let event = EventEnvelope::builder()
            .event_type("Created")
            .aggregate_id(AggregateId::new())
            .aggregate_type("Project")
            .version(Version::first())
            .payload_raw(serde_json::json!({}))
            .build()
            .unwrap();
        OutboxEntry::pending(0, event)
    }

    #[test]
    fn failures_keep_entry_pending() {
        let mut entry = entry();
        entry.record_failure("bus closed");
        entry.record_failure("bus closed");

        assert!(entry.is_pending());
        assert_eq!(entry.attempts, 2);
        assert_eq!(entry.last_error.as_deref(), Some("bus closed"));
    }

    #[test]
    fn dispatch_releases_entry() {
        let mut entry = entry();
        entry.mark_dispatched();

        assert!(!entry.is_pending());
        assert!(entry.dispatched_at.is_some());
    }
}
