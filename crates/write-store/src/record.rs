use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{AggregateId, EventEnvelope, Version};

/// Idempotency keys remembered per aggregate.
pub const MAX_IDEMPOTENCY_KEYS: usize = 256;

/// The durable write-side record of one aggregate.
///
/// Holds the latest state snapshot and the idempotency keys of the commands
/// that produced it. The full event history lives in the repository's log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateRecord {
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,
    pub version: Version,
    pub state: serde_json::Value,
    pub updated_at: DateTime<Utc>,

    /// Idempotency key -> version committed by the command carrying it.
    #[serde(default)]
    pub idempotency_keys: HashMap<String, Version>,
}

impl AggregateRecord {
    pub fn new(aggregate_id: AggregateId, aggregate_type: impl Into<String>) -> Self {
        Self {
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            version: Version::initial(),
            state: serde_json::Value::Null,
            updated_at: Utc::now(),
            idempotency_keys: HashMap::new(),
        }
    }

    /// Deserializes the state snapshot.
    pub fn state<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.state.clone())
    }

    /// Records the version a keyed command committed. Only the most recent
    /// [`MAX_IDEMPOTENCY_KEYS`] keys are kept; the oldest is forgotten first.
    pub fn remember_key(&mut self, key: String, version: Version) {
        self.idempotency_keys.insert(key, version);
        while self.idempotency_keys.len() > MAX_IDEMPOTENCY_KEYS {
            let oldest = self
                .idempotency_keys
                .iter()
                .min_by_key(|(_, version)| **version)
                .map(|(key, _)| key.clone());
            match oldest {
                Some(key) => self.idempotency_keys.remove(&key),
                None => break,
            };
        }
    }

    /// Version committed by the command with this idempotency key, if any.
    pub fn committed_version_for(&self, key: &str) -> Option<Version> {
        self.idempotency_keys.get(key).copied()
    }
}

/// One unit of work: the new state of an aggregate plus the events that got it there.
#[derive(Debug, Clone)]
pub struct Commit {
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,
    pub state: serde_json::Value,
    pub events: Vec<EventEnvelope>,
    pub idempotency_key: Option<String>,
}

impl Commit {
    pub fn new(
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        state: serde_json::Value,
    ) -> Self {
        Self {
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            state,
            events: Vec::new(),
            idempotency_key: None,
        }
    }

    /// Builds a commit from a serializable state.
    pub fn from_state<T: Serialize>(
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        state: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(
            aggregate_id,
            aggregate_type,
            serde_json::to_value(state)?,
        ))
    }

    pub fn with_events(mut self, events: Vec<EventEnvelope>) -> Self {
        self.events = events;
        self
    }

    pub fn with_idempotency_key(mut self, key: Option<String>) -> Self {
        self.idempotency_key = key;
        self
    }

    /// Version the aggregate will be at once this commit lands.
    pub fn last_version(&self) -> Option<Version> {
        self.events.last().map(|e| e.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Counter {
        value: u32,
    }

    #[test]
    fn record_state_roundtrips_through_commit() {
        let id = AggregateId::new();
        let commit = Commit::from_state(id, "Counter", &Counter { value: 3 }).unwrap();

        let mut record = AggregateRecord::new(id, "Counter");
        record.state = commit.state;

        let state: Counter = record.state().unwrap();
        assert_eq!(state, Counter { value: 3 });
    }

    #[test]
    fn oldest_idempotency_keys_are_forgotten() {
        let mut record = AggregateRecord::new(AggregateId::new(), "Counter");
        for v in 1..=(MAX_IDEMPOTENCY_KEYS as u64 + 2) {
            record.remember_key(format!("req-{v}"), Version::new(v));
        }

        assert_eq!(record.idempotency_keys.len(), MAX_IDEMPOTENCY_KEYS);
        assert_eq!(record.committed_version_for("req-1"), None);
        assert_eq!(record.committed_version_for("req-2"), None);
        assert_eq!(record.committed_version_for("req-3"), Some(Version::new(3)));
    }

    #[test]
    fn idempotency_lookup() {
        let mut record = AggregateRecord::new(AggregateId::new(), "Counter");
        record
            .idempotency_keys
            .insert("req-1".to_string(), Version::new(4));

        assert_eq!(record.committed_version_for("req-1"), Some(Version::new(4)));
        assert_eq!(record.committed_version_for("req-2"), None);
    }
}
