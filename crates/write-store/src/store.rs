use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use common::Deadline;
use futures_core::Stream;
use tokio::sync::Notify;

use crate::{
    AggregateId, AggregateRecord, Commit, EventEnvelope, EventId, OutboxEntry, Result, Version,
    WriteStoreError,
};

/// A stream of committed events.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<EventEnvelope>> + Send>>;

/// Durable, transactional persistence of aggregate state and its events.
///
/// `save` is the only way to change an aggregate. It appends the commit's
/// events to the log, replaces the state snapshot, and enqueues the events in
/// the outbox as one atomic unit, guarded by a version comparison.
#[async_trait]
pub trait WriteRepository: Send + Sync {
    /// Loads the record of an aggregate.
    ///
    /// Fails with `AggregateNotFound` if it was never saved.
    async fn load(&self, aggregate_id: AggregateId) -> Result<AggregateRecord>;

    /// Saves a commit if the stored version still equals `expected_version`.
    ///
    /// Returns the committed version, or `ConcurrencyConflict` when another
    /// writer got there first. Nothing is written on any error.
    async fn save(&self, commit: Commit, expected_version: Version) -> Result<Version>;

    /// All events of one aggregate in version order.
    async fn events_for(&self, aggregate_id: AggregateId) -> Result<Vec<EventEnvelope>>;

    /// All events in commit order.
    async fn stream_all_events(&self) -> Result<EventStream>;

    /// Oldest pending outbox entries, in commit order.
    async fn pending_outbox(&self, limit: usize) -> Result<Vec<OutboxEntry>>;

    /// Marks entries as accepted by the bus. Returns how many changed.
    async fn mark_dispatched(&self, event_ids: &[EventId]) -> Result<usize>;

    /// Records a failed handoff attempt; the entries stay pending.
    async fn record_dispatch_failure(&self, event_ids: &[EventId], error: &str) -> Result<()>;

    /// Notified after every successful save, if the implementation supports it.
    fn outbox_signal(&self) -> Option<Arc<Notify>> {
        None
    }
}

#[async_trait]
impl<T: WriteRepository + ?Sized> WriteRepository for Arc<T> {
    async fn load(&self, aggregate_id: AggregateId) -> Result<AggregateRecord> {
        (**self).load(aggregate_id).await
    }

    async fn save(&self, commit: Commit, expected_version: Version) -> Result<Version> {
        (**self).save(commit, expected_version).await
    }

    async fn events_for(&self, aggregate_id: AggregateId) -> Result<Vec<EventEnvelope>> {
        (**self).events_for(aggregate_id).await
    }

    async fn stream_all_events(&self) -> Result<EventStream> {
        (**self).stream_all_events().await
    }

    async fn pending_outbox(&self, limit: usize) -> Result<Vec<OutboxEntry>> {
        (**self).pending_outbox(limit).await
    }

    async fn mark_dispatched(&self, event_ids: &[EventId]) -> Result<usize> {
        (**self).mark_dispatched(event_ids).await
    }

    async fn record_dispatch_failure(&self, event_ids: &[EventId], error: &str) -> Result<()> {
        (**self).record_dispatch_failure(event_ids, error).await
    }

    fn outbox_signal(&self) -> Option<Arc<Notify>> {
        (**self).outbox_signal()
    }
}

/// Deadline-aware and convenience wrappers.
#[async_trait]
pub trait WriteRepositoryExt: WriteRepository {
    /// `load` bounded by a deadline.
    async fn load_within(
        &self,
        aggregate_id: AggregateId,
        deadline: Deadline,
    ) -> Result<AggregateRecord> {
        deadline
            .run(self.load(aggregate_id))
            .await
            .map_err(|_| WriteStoreError::Timeout { operation: "load" })?
    }

    /// `save` bounded by a deadline. A timeout leaves the outcome unknown.
    async fn save_within(
        &self,
        commit: Commit,
        expected_version: Version,
        deadline: Deadline,
    ) -> Result<Version> {
        deadline
            .run(self.save(commit, expected_version))
            .await
            .map_err(|_| WriteStoreError::Timeout { operation: "save" })?
    }

    /// `load` that maps a missing aggregate to `None`.
    async fn load_optional(&self, aggregate_id: AggregateId) -> Result<Option<AggregateRecord>> {
        match self.load(aggregate_id).await {
            Ok(record) => Ok(Some(record)),
            Err(WriteStoreError::AggregateNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Current version, `None` for an unknown aggregate.
    async fn current_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>> {
        Ok(self.load_optional(aggregate_id).await?.map(|r| r.version))
    }
}

impl<T: WriteRepository + ?Sized> WriteRepositoryExt for T {}

/// Checks that a commit can be applied on top of `expected_version`.
///
/// A commit must carry at least one event, every event must belong to the
/// commit's aggregate, and versions must run consecutively from
/// `expected_version + 1`.
pub fn validate_commit(commit: &Commit, expected_version: Version) -> Result<()> {
    if commit.events.is_empty() {
        return Err(WriteStoreError::InvalidCommit(
            "commit carries no events".to_string(),
        ));
    }

    let mut next = expected_version.next();
    for event in &commit.events {
        if event.aggregate_id != commit.aggregate_id {
            return Err(WriteStoreError::InvalidCommit(format!(
                "event {} belongs to aggregate {}, not {}",
                event.event_id, event.aggregate_id, commit.aggregate_id
            )));
        }
        if event.aggregate_type != commit.aggregate_type {
            return Err(WriteStoreError::InvalidCommit(format!(
                "event {} has aggregate type {}, expected {}",
                event.event_id, event.aggregate_type, commit.aggregate_type
            )));
        }
        if event.version != next {
            return Err(WriteStoreError::InvalidCommit(format!(
                "event versions must be consecutive: expected {}, got {}",
                next, event.version
            )));
        }
        next = next.next();
    }

    Ok(())
}
