use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Notify, RwLock};

use crate::{
    AggregateId, AggregateRecord, Commit, EventEnvelope, EventId, OutboxEntry, Result, Version,
    WriteStoreError,
    store::{EventStream, WriteRepository, validate_commit},
};

#[derive(Default)]
struct Inner {
    records: HashMap<AggregateId, AggregateRecord>,
    log: Vec<EventEnvelope>,
    outbox: Vec<OutboxEntry>,
    next_sequence: u64,
}

/// In-process write repository.
///
/// The version check, log append, snapshot replacement and outbox enqueue of a
/// save all happen under one write lock, which gives the same atomicity as a
/// database transaction.
#[derive(Clone, Default)]
pub struct InMemoryWriteRepository {
    inner: Arc<RwLock<Inner>>,
    outage: Arc<AtomicU32>,
    signal: Arc<Notify>,
}

impl InMemoryWriteRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of committed events.
    pub async fn event_count(&self) -> usize {
        self.inner.read().await.log.len()
    }

    /// Number of outbox entries not yet acknowledged by the bus.
    pub async fn pending_count(&self) -> usize {
        self.inner
            .read()
            .await
            .outbox
            .iter()
            .filter(|e| e.is_pending())
            .count()
    }

    /// Number of entries held in the outbox, dispatched or not.
    pub async fn outbox_len(&self) -> usize {
        self.inner.read().await.outbox.len()
    }

    /// Makes the next `operations` calls fail with `Unavailable`.
    pub fn inject_outage(&self, operations: u32) {
        self.outage.store(operations, Ordering::SeqCst);
    }

    fn check_available(&self, operation: &str) -> Result<()> {
        let failing = self
            .outage
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            tracing::warn!(operation, "simulated storage outage");
            return Err(WriteStoreError::Unavailable(format!(
                "injected outage during {operation}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl WriteRepository for InMemoryWriteRepository {
    async fn load(&self, aggregate_id: AggregateId) -> Result<AggregateRecord> {
        self.check_available("load")?;
        self.inner
            .read()
            .await
            .records
            .get(&aggregate_id)
            .cloned()
            .ok_or(WriteStoreError::AggregateNotFound(aggregate_id))
    }

    async fn save(&self, commit: Commit, expected_version: Version) -> Result<Version> {
        self.check_available("save")?;
        validate_commit(&commit, expected_version)?;

        let aggregate_id = commit.aggregate_id;
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;

        let actual = inner
            .records
            .get(&aggregate_id)
            .map(|r| r.version)
            .unwrap_or(Version::initial());
        if actual != expected_version {
            metrics::counter!("write_store_conflicts_total").increment(1);
            return Err(WriteStoreError::ConcurrencyConflict {
                aggregate_id,
                expected: expected_version,
                actual,
            });
        }

        let new_version = commit.last_version().unwrap_or(expected_version);
        let record = inner
            .records
            .entry(aggregate_id)
            .or_insert_with(|| AggregateRecord::new(aggregate_id, commit.aggregate_type.clone()));
        record.version = new_version;
        record.state = commit.state;
        record.updated_at = Utc::now();
        if let Some(key) = commit.idempotency_key {
            record.remember_key(key, new_version);
        }

        for event in commit.events {
            let sequence = inner.next_sequence;
            inner.next_sequence += 1;
            inner.outbox.push(OutboxEntry::pending(sequence, event.clone()));
            inner.log.push(event);
        }
        drop(guard);

        self.signal.notify_one();
        tracing::debug!(%aggregate_id, version = %new_version, "commit saved");

        Ok(new_version)
    }

    async fn events_for(&self, aggregate_id: AggregateId) -> Result<Vec<EventEnvelope>> {
        self.check_available("events_for")?;
        let inner = self.inner.read().await;
        let mut events: Vec<_> = inner
            .log
            .iter()
            .filter(|e| e.aggregate_id == aggregate_id)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.version);
        Ok(events)
    }

    async fn stream_all_events(&self) -> Result<EventStream> {
        use futures_util::stream;

        self.check_available("stream_all_events")?;
        let events = self.inner.read().await.log.clone();
        Ok(Box::pin(stream::iter(events.into_iter().map(Ok))))
    }

    async fn pending_outbox(&self, limit: usize) -> Result<Vec<OutboxEntry>> {
        self.check_available("pending_outbox")?;
        let inner = self.inner.read().await;
        Ok(inner
            .outbox
            .iter()
            .filter(|e| e.is_pending())
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_dispatched(&self, event_ids: &[EventId]) -> Result<usize> {
        self.check_available("mark_dispatched")?;
        let ids: HashSet<_> = event_ids.iter().collect();
        let mut inner = self.inner.write().await;
        let mut changed = 0;
        for entry in inner.outbox.iter_mut() {
            if entry.is_pending() && ids.contains(&entry.event.event_id) {
                entry.mark_dispatched();
                changed += 1;
            }
        }
        // Dispatched entries are only needed until the bus has them.
        inner.outbox.retain(OutboxEntry::is_pending);
        Ok(changed)
    }

    async fn record_dispatch_failure(&self, event_ids: &[EventId], error: &str) -> Result<()> {
        self.check_available("record_dispatch_failure")?;
        let ids: HashSet<_> = event_ids.iter().collect();
        let mut inner = self.inner.write().await;
        for entry in inner.outbox.iter_mut() {
            if entry.is_pending() && ids.contains(&entry.event.event_id) {
                entry.record_failure(error);
            }
        }
        Ok(())
    }

    fn outbox_signal(&self) -> Option<Arc<Notify>> {
        Some(self.signal.clone())
    }
}
