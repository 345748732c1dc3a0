//! Dead letters: deliveries that exhausted their retries.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;
use write_store::EventEnvelope;

use crate::bus::SubscriptionId;

/// An event a subscription gave up on, kept for inspection and redrive.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    pub id: Uuid,
    pub subscription: SubscriptionId,
    pub handler: String,
    pub event: EventEnvelope,
    pub error_message: String,
    pub failure_count: u32,
    pub first_failed_at: DateTime<Utc>,
    pub last_failed_at: DateTime<Utc>,
}

/// Storage for dead letters.
#[async_trait]
pub trait DeadLetterQueue: Send + Sync {
    async fn push(&self, letter: DeadLetter);

    /// Oldest first, at most `limit`.
    async fn list(&self, limit: usize) -> Vec<DeadLetter>;

    /// Removes and returns every letter of one subscription.
    async fn take_for(&self, subscription: SubscriptionId) -> Vec<DeadLetter>;

    async fn len(&self) -> usize;

    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryDeadLetterQueue {
    letters: Arc<RwLock<Vec<DeadLetter>>>,
}

impl InMemoryDeadLetterQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeadLetterQueue for InMemoryDeadLetterQueue {
    async fn push(&self, letter: DeadLetter) {
        tracing::error!(
            event_id = %letter.event.event_id,
            event_type = %letter.event.event_type,
            aggregate_id = %letter.event.aggregate_id,
            handler = %letter.handler,
            failure_count = letter.failure_count,
            error = %letter.error_message,
            "event moved to dead letters"
        );
        metrics::counter!("dead_letters_total", "handler" => letter.handler.clone()).increment(1);
        self.letters.write().await.push(letter);
    }

    async fn list(&self, limit: usize) -> Vec<DeadLetter> {
        self.letters.read().await.iter().take(limit).cloned().collect()
    }

    async fn take_for(&self, subscription: SubscriptionId) -> Vec<DeadLetter> {
        let mut letters = self.letters.write().await;
        let (taken, kept) = letters
            .drain(..)
            .partition(|letter| letter.subscription == subscription);
        *letters = kept;
        taken
    }

    async fn len(&self) -> usize {
        self.letters.read().await.len()
    }
}
