//! Outbox relay: the dispatcher between the write repository and the bus.

use std::time::Duration;

use common::Deadline;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use write_store::{EventEnvelope, EventId, WriteRepository};

use crate::bus::EventBus;
use crate::error::RelayError;

#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Outbox entries handed to the bus per round.
    pub batch_size: usize,

    /// Fallback wake-up when no commit signal arrives.
    pub poll_interval: Duration,

    /// Deadline for the bus to accept one batch.
    pub publish_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            batch_size: 256,
            poll_interval: Duration::from_millis(100),
            publish_timeout: Duration::from_secs(2),
        }
    }
}

/// Publishes pending outbox entries and marks them dispatched once the bus
/// has accepted them.
///
/// An entry is only marked after the bus acknowledged it, so a crash or a
/// failed mark leads to republishing, never to loss.
pub struct OutboxRelay<S> {
    store: S,
    bus: EventBus,
    config: RelayConfig,
}

impl<S> OutboxRelay<S>
where
    S: WriteRepository + 'static,
{
    pub fn new(store: S, bus: EventBus, config: RelayConfig) -> Self {
        Self { store, bus, config }
    }

    /// Publishes one batch. Returns how many entries were dispatched.
    #[tracing::instrument(skip(self))]
    pub async fn dispatch_batch(&self) -> Result<usize, RelayError> {
        let entries = self.store.pending_outbox(self.config.batch_size).await?;
        if entries.is_empty() {
            return Ok(0);
        }

        let events: Vec<EventEnvelope> = entries.iter().map(|e| e.event.clone()).collect();
        let ids: Vec<EventId> = events.iter().map(|e| e.event_id).collect();

        match self
            .bus
            .publish_within(&events, Deadline::after(self.config.publish_timeout))
            .await
        {
            Ok(()) => {
                let marked = self.store.mark_dispatched(&ids).await?;
                metrics::counter!("outbox_dispatched_total").increment(marked as u64);
                tracing::debug!(dispatched = marked, "outbox batch dispatched");
                Ok(marked)
            }
            Err(e) => {
                metrics::counter!("outbox_dispatch_failures_total").increment(1);
                tracing::warn!(error = %e, entries = ids.len(), "outbox batch not accepted by bus");
                self.store
                    .record_dispatch_failure(&ids, &e.to_string())
                    .await?;
                Err(e.into())
            }
        }
    }

    /// Dispatches until the outbox is empty or a batch fails.
    pub async fn dispatch_pending(&self) -> Result<usize, RelayError> {
        let mut total = 0;
        loop {
            let dispatched = self.dispatch_batch().await?;
            total += dispatched;
            if dispatched < self.config.batch_size {
                return Ok(total);
            }
        }
    }

    /// Runs until `shutdown` flips to `true`, then makes a final pass.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let signal = self.store.outbox_signal();
        tracing::info!(
            batch_size = self.config.batch_size,
            poll_ms = self.config.poll_interval.as_millis() as u64,
            signalled = signal.is_some(),
            "outbox relay started"
        );

        loop {
            if let Err(e) = self.dispatch_pending().await {
                tracing::error!(error = %e, "outbox dispatch failed, entries stay pending");
            }

            let commit = async {
                match &signal {
                    Some(notify) => notify.notified().await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                _ = commit => {}
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        if let Err(e) = self.dispatch_pending().await {
            tracing::error!(error = %e, "final outbox dispatch failed");
        }
        tracing::info!("outbox relay stopped");
    }

    /// Spawns [`OutboxRelay::run`] on the runtime.
    pub fn spawn(self) -> RelayHandle {
        let (tx, rx) = watch::channel(false);
        RelayHandle {
            shutdown: tx,
            task: tokio::spawn(self.run(rx)),
        }
    }
}

/// Handle to a spawned relay.
pub struct RelayHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RelayHandle {
    /// Asks the relay to stop and waits for its final pass.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "outbox relay panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use common::{AggregateId, RetryConfig};
    use tokio::sync::Mutex;
    use write_store::{Commit, InMemoryWriteRepository, Version};

    use super::*;
    use crate::bus::BusConfig;
    use crate::handler::{EventFilter, EventHandler, HandlerError};

    #[derive(Default)]
    struct Collect {
        seen: Mutex<Vec<EventId>>,
    }

    #[async_trait]
    impl EventHandler for Collect {
        fn name(&self) -> &str {
            "collect"
        }

        async fn handle(&self, event: &EventEnvelope) -> Result<(), HandlerError> {
            self.seen.lock().await.push(event.event_id);
            Ok(())
        }
    }

    fn bus() -> EventBus {
        EventBus::new(BusConfig {
            partitions: 2,
            channel_capacity: 16,
            delivery_retry: RetryConfig::none(),
        })
    }

    async fn commit_events(store: &InMemoryWriteRepository, count: u64) -> AggregateId {
        let id = AggregateId::new();
        let events = (1..=count)
            .map(|v| {
                EventEnvelope::builder()
                    .aggregate_id(id)
                    .aggregate_type("Project")
                    .event_type("WorkLogged")
                    .version(Version::new(v))
                    .payload_raw(serde_json::json!({}))
                    .build()
                    .unwrap()
            })
            .collect();
        store
            .save(
                Commit::new(id, "Project", serde_json::json!({})).with_events(events),
                Version::initial(),
            )
            .await
            .unwrap();
        id
    }

    fn config(batch_size: usize) -> RelayConfig {
        RelayConfig {
            batch_size,
            poll_interval: Duration::from_millis(10),
            publish_timeout: Duration::from_millis(200),
        }
    }

    #[tokio::test]
    async fn dispatches_in_batches_until_empty() {
        let store = InMemoryWriteRepository::new();
        let bus = bus();
        let collect = Arc::new(Collect::default());
        bus.subscribe(EventFilter::All, collect.clone()).await.unwrap();
        commit_events(&store, 5).await;

        let relay = OutboxRelay::new(store.clone(), bus.clone(), config(2));
        assert_eq!(relay.dispatch_pending().await.unwrap(), 5);
        assert_eq!(store.pending_count().await, 0);

        bus.wait_idle().await;
        assert_eq!(collect.seen.lock().await.len(), 5);
    }

    #[tokio::test]
    async fn failed_publish_keeps_entries_pending() {
        let store = InMemoryWriteRepository::new();
        let bus = bus();
        commit_events(&store, 2).await;
        bus.shutdown().await;

        let relay = OutboxRelay::new(store.clone(), bus, config(10));
        let result = relay.dispatch_batch().await;
        assert!(matches!(result, Err(RelayError::Publish(_))));

        let pending = store.pending_outbox(10).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert!(pending.iter().all(|e| e.attempts == 1 && e.last_error.is_some()));
    }

    #[tokio::test]
    async fn spawned_relay_follows_commits_and_stops() {
        let store = InMemoryWriteRepository::new();
        let bus = bus();
        let collect = Arc::new(Collect::default());
        bus.subscribe(EventFilter::All, collect.clone()).await.unwrap();

        let handle = OutboxRelay::new(store.clone(), bus.clone(), config(16)).spawn();
        commit_events(&store, 3).await;
        commit_events(&store, 1).await;

        tokio::time::timeout(Duration::from_secs(5), async {
            while store.pending_count().await > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("relay did not drain the outbox");

        handle.shutdown().await;
        bus.wait_idle().await;
        assert_eq!(collect.seen.lock().await.len(), 4);
    }
}
