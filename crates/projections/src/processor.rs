//! Projection processor: catch-up and rebuild from the event log.

use std::sync::Arc;

use futures_util::StreamExt;
use write_store::WriteRepository;

use crate::Result;
use crate::projection::Replay;

/// Replays the write store's event log into projections.
///
/// Updaters skip events they already applied, so catch-up can run at any
/// time, including while the bus is delivering.
pub struct ProjectionProcessor<S: WriteRepository> {
    store: S,
    projections: Vec<Arc<dyn Replay>>,
}

impl<S: WriteRepository> ProjectionProcessor<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            projections: Vec::new(),
        }
    }

    pub fn register(&mut self, projection: Arc<dyn Replay>) {
        self.projections.push(projection);
    }

    pub fn projection_count(&self) -> usize {
        self.projections.len()
    }

    /// Streams the whole log through every projection. Returns the number of
    /// events read.
    #[tracing::instrument(skip(self))]
    pub async fn run_catch_up(&self) -> Result<u64> {
        let mut stream = self.store.stream_all_events().await?;
        let mut events_read: u64 = 0;

        while let Some(result) = stream.next().await {
            let event = result?;
            events_read += 1;
            for projection in &self.projections {
                projection.replay(&event).await?;
            }
        }

        tracing::info!(events_read, "catch-up complete");
        Ok(events_read)
    }

    /// Resets all projections and replays the log from the start.
    #[tracing::instrument(skip(self))]
    pub async fn rebuild_all(&self) -> Result<u64> {
        for projection in &self.projections {
            projection.reset().await?;
        }
        metrics::counter!("projection_rebuilds_total").increment(1);
        self.run_catch_up().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::ProjectionPosition;
    use async_trait::async_trait;
    use common::AggregateId;
    use tokio::sync::RwLock;
    use write_store::{Commit, EventEnvelope, InMemoryWriteRepository, Version};

    /// A simple counting projection for testing.
    #[derive(Default)]
    struct CountingProjection {
        count: RwLock<u64>,
        resets: RwLock<u32>,
    }

    #[async_trait]
    impl Replay for CountingProjection {
        fn name(&self) -> &'static str {
            "CountingProjection"
        }

        async fn replay(&self, _event: &EventEnvelope) -> Result<()> {
            *self.count.write().await += 1;
            Ok(())
        }

        async fn reset(&self) -> Result<()> {
            *self.count.write().await = 0;
            *self.resets.write().await += 1;
            Ok(())
        }

        async fn position(&self) -> ProjectionPosition {
            ProjectionPosition {
                events_applied: *self.count.read().await,
                duplicates_skipped: 0,
            }
        }
    }

    async fn store_with_events(count: u64) -> InMemoryWriteRepository {
        let store = InMemoryWriteRepository::new();
        let id = AggregateId::new();
        let events = (1..=count)
            .map(|v| {
                EventEnvelope::builder()
                    .aggregate_id(id)
                    .aggregate_type("Project")
                    .event_type("TestEvent")
                    .version(Version::new(v))
                    .payload_raw(serde_json::json!({"test": true}))
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
        store
    }

    #[tokio::test]
    async fn catch_up_processes_all_events() {
        let projection = Arc::new(CountingProjection::default());
        let mut processor = ProjectionProcessor::new(store_with_events(3).await);
        processor.register(projection.clone());

        assert_eq!(processor.run_catch_up().await.unwrap(), 3);
        assert_eq!(projection.position().await.events_applied, 3);
    }

    #[tokio::test]
    async fn rebuild_resets_before_replay() {
        let projection = Arc::new(CountingProjection::default());
        let mut processor = ProjectionProcessor::new(store_with_events(2).await);
        processor.register(projection.clone());
        assert_eq!(processor.projection_count(), 1);

        processor.run_catch_up().await.unwrap();
        processor.rebuild_all().await.unwrap();

        assert_eq!(*projection.count.read().await, 2);
        assert_eq!(*projection.resets.read().await, 1);
    }
}
