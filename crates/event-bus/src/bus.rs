//! Partitioned in-process event bus.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use chrono::Utc;
use common::{AggregateId, Deadline, IsTransient, RetryConfig};
use serde::Serialize;
use tokio::sync::{Notify, RwLock, mpsc};
use tokio::task::JoinHandle;
use uuid::Uuid;
use write_store::EventEnvelope;

use crate::dead_letter::{DeadLetter, DeadLetterQueue, InMemoryDeadLetterQueue};
use crate::error::BusError;
use crate::handler::{EventFilter, EventHandler};

/// Identifies one subscription on a bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Bus tuning.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Workers per subscription. Events are routed by aggregate, so one
    /// aggregate always lands on the same worker.
    pub partitions: usize,

    /// Queue length per worker. A full queue makes `publish` wait.
    pub channel_capacity: usize,

    /// Delivery attempts and backoff before an event is dead-lettered.
    pub delivery_retry: RetryConfig,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            partitions: 4,
            channel_capacity: 1024,
            delivery_retry: RetryConfig {
                max_attempts: 5,
                initial_delay: Duration::from_millis(50),
                max_delay: Duration::from_secs(2),
                multiplier: 2.0,
            },
        }
    }
}

/// Picks the worker for an aggregate.
pub fn partition_for(aggregate_id: &AggregateId, partitions: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    aggregate_id.hash(&mut hasher);
    (hasher.finish() % partitions.max(1) as u64) as usize
}

/// Subscription-based event bus with at-least-once delivery.
///
/// `publish` returns once every event is queued for every matching
/// subscription; that is the acknowledgment the outbox relay waits for.
/// Handlers then run on per-subscription workers. A failing handler is
/// retried with backoff and, when retries run out, the event goes to the
/// dead-letter queue. Events of one aggregate are handled in publish order.
///
/// Cloning is cheap; clones share subscriptions.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

struct BusInner {
    config: BusConfig,
    subscriptions: RwLock<Vec<Subscription>>,
    dead_letters: Arc<dyn DeadLetterQueue>,
    tracker: Arc<InFlight>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

struct Subscription {
    id: SubscriptionId,
    filter: EventFilter,
    handler: Arc<dyn EventHandler>,
    senders: Vec<mpsc::Sender<Arc<EventEnvelope>>>,
    workers: Vec<JoinHandle<()>>,
}

impl Subscription {
    fn sender_for(&self, event: &EventEnvelope) -> &mpsc::Sender<Arc<EventEnvelope>> {
        &self.senders[partition_for(&event.aggregate_id, self.senders.len())]
    }
}

/// Counts events queued or being handled.
#[derive(Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    fn start(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
        metrics::gauge!("bus_in_flight").increment(1.0);
    }

    fn finish(&self) {
        metrics::gauge!("bus_in_flight").decrement(1.0);
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }

    fn current(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.current() == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl EventBus {
    pub fn new(config: BusConfig) -> Self {
        Self::with_dead_letters(config, Arc::new(InMemoryDeadLetterQueue::new()))
    }

    pub fn with_dead_letters(config: BusConfig, dead_letters: Arc<dyn DeadLetterQueue>) -> Self {
        Self {
            inner: Arc::new(BusInner {
                config,
                subscriptions: RwLock::new(Vec::new()),
                dead_letters,
                tracker: Arc::new(InFlight::default()),
                next_id: AtomicU64::new(1),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &BusConfig {
        &self.inner.config
    }

    pub fn dead_letters(&self) -> Arc<dyn DeadLetterQueue> {
        Arc::clone(&self.inner.dead_letters)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Events queued or being handled right now.
    pub fn in_flight(&self) -> usize {
        self.inner.tracker.current()
    }

    pub async fn subscription_count(&self) -> usize {
        self.inner.subscriptions.read().await.len()
    }

    /// Registers a handler for the event types `filter` selects.
    ///
    /// Only events published after this call are delivered.
    pub async fn subscribe(
        &self,
        filter: EventFilter,
        handler: Arc<dyn EventHandler>,
    ) -> Result<SubscriptionId, BusError> {
        let mut subscriptions = self.inner.subscriptions.write().await;
        if self.is_closed() {
            return Err(BusError::Closed);
        }

        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        let partitions = self.inner.config.partitions.max(1);
        let mut senders = Vec::with_capacity(partitions);
        let mut workers = Vec::with_capacity(partitions);

        for partition in 0..partitions {
            let (tx, rx) = mpsc::channel(self.inner.config.channel_capacity.max(1));
            let worker = Worker {
                subscription: id,
                partition,
                handler: Arc::clone(&handler),
                retry: self.inner.config.delivery_retry.clone(),
                dead_letters: Arc::clone(&self.inner.dead_letters),
                tracker: Arc::clone(&self.inner.tracker),
            };
            senders.push(tx);
            workers.push(tokio::spawn(worker.run(rx)));
        }

        tracing::info!(
            subscription = %id,
            handler = handler.name(),
            ?filter,
            partitions,
            max_stall_ms = self.inner.config.delivery_retry.total_delay().as_millis() as u64,
            "subscription registered"
        );

        subscriptions.push(Subscription {
            id,
            filter,
            handler,
            senders,
            workers,
        });
        Ok(id)
    }

    /// Removes a subscription. Events already queued for it are still handled.
    pub async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), BusError> {
        let mut subscriptions = self.inner.subscriptions.write().await;
        let position = subscriptions
            .iter()
            .position(|s| s.id == id)
            .ok_or(BusError::UnknownSubscription(id))?;
        let removed = subscriptions.remove(position);
        tracing::info!(subscription = %id, handler = removed.handler.name(), "subscription removed");
        Ok(())
    }

    /// Queues events for every matching subscription.
    ///
    /// Waits while a worker queue is full. On error some events may already
    /// be queued; publishing them again is safe because delivery is at least
    /// once anyway.
    pub async fn publish(&self, events: &[EventEnvelope]) -> Result<(), BusError> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }

        let subscriptions = self.inner.subscriptions.read().await;
        for event in events {
            let shared = Arc::new(event.clone());
            for subscription in subscriptions
                .iter()
                .filter(|s| s.filter.matches(&event.event_type))
            {
                self.enqueue(subscription, Arc::clone(&shared)).await?;
            }
            tracing::trace!(
                event_id = %event.event_id,
                event_type = %event.event_type,
                aggregate_id = %event.aggregate_id,
                "event published"
            );
        }
        Ok(())
    }

    /// `publish` bounded by a deadline.
    pub async fn publish_within(
        &self,
        events: &[EventEnvelope],
        deadline: Deadline,
    ) -> Result<(), BusError> {
        deadline
            .run(self.publish(events))
            .await
            .map_err(|_| BusError::Timeout)?
    }

    /// Puts a subscription's dead letters back on its queues.
    ///
    /// Returns how many events were requeued.
    pub async fn redrive_dead_letters(&self, id: SubscriptionId) -> Result<usize, BusError> {
        let subscriptions = self.inner.subscriptions.read().await;
        let subscription = subscriptions
            .iter()
            .find(|s| s.id == id)
            .ok_or(BusError::UnknownSubscription(id))?;

        let letters = self.inner.dead_letters.take_for(id).await;
        let count = letters.len();
        for letter in letters {
            self.enqueue(subscription, Arc::new(letter.event)).await?;
        }

        tracing::info!(subscription = %id, count, "dead letters redriven");
        Ok(count)
    }

    /// Resolves once nothing is queued or being handled.
    pub async fn wait_idle(&self) {
        self.inner.tracker.wait_idle().await
    }

    /// `wait_idle` bounded by a deadline.
    pub async fn wait_idle_within(&self, deadline: Deadline) -> Result<(), BusError> {
        deadline
            .run(self.wait_idle())
            .await
            .map_err(|_| BusError::Timeout)
    }

    /// Stops accepting events, lets workers finish their queues, and waits
    /// for them to exit.
    pub async fn shutdown(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        let subscriptions = std::mem::take(&mut *self.inner.subscriptions.write().await);

        let mut workers = Vec::new();
        for subscription in subscriptions {
            // Dropping the senders ends each worker after its queue drains.
            drop(subscription.senders);
            workers.extend(subscription.workers);
        }
        for worker in workers {
            if let Err(e) = worker.await {
                tracing::error!(error = %e, "bus worker panicked");
            }
        }
        tracing::info!("event bus shut down");
    }

    async fn enqueue(
        &self,
        subscription: &Subscription,
        event: Arc<EventEnvelope>,
    ) -> Result<(), BusError> {
        self.inner.tracker.start();
        if subscription.sender_for(&event).send(event).await.is_err() {
            self.inner.tracker.finish();
            return Err(BusError::Closed);
        }
        Ok(())
    }
}

/// Handles one partition of one subscription.
struct Worker {
    subscription: SubscriptionId,
    partition: usize,
    handler: Arc<dyn EventHandler>,
    retry: RetryConfig,
    dead_letters: Arc<dyn DeadLetterQueue>,
    tracker: Arc<InFlight>,
}

impl Worker {
    async fn run(self, mut rx: mpsc::Receiver<Arc<EventEnvelope>>) {
        while let Some(event) = rx.recv().await {
            self.deliver(&event).await;
            self.tracker.finish();
        }
        tracing::debug!(
            subscription = %self.subscription,
            partition = self.partition,
            "partition worker stopped"
        );
    }

    #[tracing::instrument(
        skip(self, event),
        fields(
            handler = self.handler.name(),
            event_id = %event.event_id,
            event_type = %event.event_type,
            aggregate_id = %event.aggregate_id,
        )
    )]
    async fn deliver(&self, event: &EventEnvelope) {
        let handler = self.handler.name().to_string();
        let max_attempts = self.retry.max_attempts.max(1);
        let mut first_failed_at = None;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let error = match self.handler.handle(event).await {
                Ok(()) => {
                    if attempt > 1 {
                        tracing::info!(attempt, "delivery succeeded after retry");
                    }
                    metrics::counter!(
                        "bus_deliveries_total",
                        "handler" => handler,
                        "outcome" => "delivered"
                    )
                    .increment(1);
                    return;
                }
                Err(error) => error,
            };

            let now = Utc::now();
            let first = *first_failed_at.get_or_insert(now);

            if !error.is_transient() || attempt >= max_attempts {
                metrics::counter!(
                    "bus_deliveries_total",
                    "handler" => handler.clone(),
                    "outcome" => "dead_lettered"
                )
                .increment(1);
                self.dead_letters
                    .push(DeadLetter {
                        id: Uuid::new_v4(),
                        subscription: self.subscription,
                        handler,
                        event: event.clone(),
                        error_message: error.to_string(),
                        failure_count: attempt,
                        first_failed_at: first,
                        last_failed_at: now,
                    })
                    .await;
                return;
            }

            let delay = self.retry.delay_after(attempt);
            tracing::warn!(
                attempt,
                error = %error,
                delay_ms = delay.as_millis() as u64,
                "delivery failed, retrying after delay"
            );
            metrics::counter!("bus_delivery_retries_total", "handler" => handler.clone())
                .increment(1);
            tokio::time::sleep(delay).await;
        }
    }
}
