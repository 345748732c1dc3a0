//! Views and their storage.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use common::AggregateId;
use tokio::sync::RwLock;
use write_store::Version;

use crate::{ProjectionError, Result};

/// A denormalized, query-optimized record derived from one aggregate's events.
pub trait View: Clone + Send + Sync + 'static {
    fn id(&self) -> AggregateId;

    /// Version of the last event folded into this view.
    fn last_applied_version(&self) -> Version;

    fn set_last_applied_version(&mut self, version: Version);
}

/// Storage for views. Only projection updaters write to it.
#[async_trait]
pub trait ReadRepository<V: View>: Send + Sync {
    async fn get(&self, id: AggregateId) -> Result<Option<V>>;

    async fn list(&self) -> Result<Vec<V>>;

    /// Stores `view` unless the stored view is already at the same or a later
    /// version. Returns whether it was written.
    async fn upsert(&self, view: V) -> Result<bool>;

    /// Drops every view.
    async fn reset(&self) -> Result<()>;

    async fn count(&self) -> Result<usize>;
}

#[async_trait]
impl<V: View, T: ReadRepository<V> + ?Sized> ReadRepository<V> for Arc<T> {
    async fn get(&self, id: AggregateId) -> Result<Option<V>> {
        (**self).get(id).await
    }

    async fn list(&self) -> Result<Vec<V>> {
        (**self).list().await
    }

    async fn upsert(&self, view: V) -> Result<bool> {
        (**self).upsert(view).await
    }

    async fn reset(&self) -> Result<()> {
        (**self).reset().await
    }

    async fn count(&self) -> Result<usize> {
        (**self).count().await
    }
}

/// In-memory read repository.
#[derive(Clone)]
pub struct InMemoryReadRepository<V> {
    views: Arc<RwLock<HashMap<AggregateId, V>>>,
    outage: Arc<AtomicU32>,
}

impl<V: View> InMemoryReadRepository<V> {
    pub fn new() -> Self {
        Self {
            views: Arc::new(RwLock::new(HashMap::new())),
            outage: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Makes the next `operations` calls fail as unavailable.
    pub fn inject_outage(&self, operations: u32) {
        self.outage.store(operations, Ordering::SeqCst);
    }

    fn check_available(&self, operation: &str) -> Result<()> {
        let failing = self
            .outage
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ProjectionError::Unavailable(format!(
                "{operation}: injected outage"
            )));
        }
        Ok(())
    }
}

impl<V: View> Default for InMemoryReadRepository<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<V: View> ReadRepository<V> for InMemoryReadRepository<V> {
    async fn get(&self, id: AggregateId) -> Result<Option<V>> {
        self.check_available("get")?;
        Ok(self.views.read().await.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<V>> {
        self.check_available("list")?;
        Ok(self.views.read().await.values().cloned().collect())
    }

    async fn upsert(&self, view: V) -> Result<bool> {
        self.check_available("upsert")?;
        let mut views = self.views.write().await;
        if let Some(existing) = views.get(&view.id())
            && existing.last_applied_version() >= view.last_applied_version()
        {
            return Ok(false);
        }
        views.insert(view.id(), view);
        Ok(true)
    }

    async fn reset(&self) -> Result<()> {
        self.check_available("reset")?;
        self.views.write().await.clear();
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.views.read().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Counter {
        id: AggregateId,
        value: u32,
        version: Version,
    }

    impl View for Counter {
        fn id(&self) -> AggregateId {
            self.id
        }

        fn last_applied_version(&self) -> Version {
            self.version
        }

        fn set_last_applied_version(&mut self, version: Version) {
            self.version = version;
        }
    }

    fn counter(id: AggregateId, value: u32, version: u64) -> Counter {
        Counter {
            id,
            value,
            version: Version::new(version),
        }
    }

    #[tokio::test]
    async fn upsert_only_moves_forward() {
        let repo = InMemoryReadRepository::new();
        let id = AggregateId::new();

        assert!(repo.upsert(counter(id, 1, 1)).await.unwrap());
        assert!(repo.upsert(counter(id, 2, 2)).await.unwrap());
        assert!(!repo.upsert(counter(id, 99, 2)).await.unwrap());
        assert!(!repo.upsert(counter(id, 99, 1)).await.unwrap());

        assert_eq!(repo.get(id).await.unwrap(), Some(counter(id, 2, 2)));
    }

    #[tokio::test]
    async fn reset_clears_views() {
        let repo = InMemoryReadRepository::new();
        repo.upsert(counter(AggregateId::new(), 1, 1)).await.unwrap();
        repo.upsert(counter(AggregateId::new(), 1, 1)).await.unwrap();
        assert_eq!(repo.count().await.unwrap(), 2);

        repo.reset().await.unwrap();
        assert_eq!(repo.count().await.unwrap(), 0);
        assert!(repo.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn injected_outage_is_unavailable() {
        let repo: InMemoryReadRepository<Counter> = InMemoryReadRepository::new();
        repo.inject_outage(1);
        assert!(matches!(
            repo.get(AggregateId::new()).await,
            Err(ProjectionError::Unavailable(_))
        ));
        assert!(repo.get(AggregateId::new()).await.unwrap().is_none());
    }
}
