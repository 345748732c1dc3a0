//! Assembles the engine: write store, outbox relay, event bus, projection
//! updater, read store and the gateway in front of them.

use std::sync::Arc;
use std::time::Duration;

use common::Deadline;
use domain::ProjectService;
use event_bus::{EventBus, OutboxRelay, RelayHandle, SubscriptionId};
use projections::{
    InMemoryReadRepository, ProjectProjector, ProjectQueryHandler, ProjectView,
    ProjectionProcessor, ProjectionUpdater, Projector,
};
use write_store::InMemoryWriteRepository;

use crate::config::Config;
use crate::error::GatewayError;
use crate::gateway::Gateway;

pub type Views = Arc<InMemoryReadRepository<ProjectView>>;
pub type EngineGateway = Gateway<InMemoryWriteRepository, Views>;

/// A running engine.
pub struct Runtime {
    store: InMemoryWriteRepository,
    views: Views,
    bus: EventBus,
    updater: Arc<ProjectionUpdater<Views, ProjectProjector>>,
    subscription: SubscriptionId,
    relay: RelayHandle,
    gateway: Arc<EngineGateway>,
}

impl Runtime {
    /// Wires the components and starts the relay and bus workers.
    pub async fn start(config: &Config) -> Result<Self, GatewayError> {
        let store = InMemoryWriteRepository::new();
        let views: Views = Arc::new(InMemoryReadRepository::new());
        let bus = EventBus::new(config.bus_config());

        let updater = Arc::new(ProjectionUpdater::new(Arc::clone(&views), ProjectProjector));
        let subscription = bus
            .subscribe(ProjectProjector.filter(), updater.clone())
            .await?;

        let relay = OutboxRelay::new(store.clone(), bus.clone(), config.relay_config()).spawn();

        let gateway = Arc::new(Gateway::new(
            ProjectService::with_config(store.clone(), config.handler_config()),
            ProjectQueryHandler::new(Arc::clone(&views), config.query_config()),
        ));

        tracing::info!(
            partitions = config.bus_partitions,
            subscription = %subscription,
            "engine started"
        );

        Ok(Self {
            store,
            views,
            bus,
            updater,
            subscription,
            relay,
            gateway,
        })
    }

    pub fn gateway(&self) -> Arc<EngineGateway> {
        Arc::clone(&self.gateway)
    }

    pub fn store(&self) -> &InMemoryWriteRepository {
        &self.store
    }

    pub fn views(&self) -> &Views {
        &self.views
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Waits until every committed event has been relayed and handled.
    pub async fn settle(&self, timeout: Duration) -> Result<(), GatewayError> {
        let deadline = Deadline::after(timeout);
        deadline
            .run(async {
                while self.store.pending_count().await > 0 {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            })
            .await
            .map_err(|_| event_bus::BusError::Timeout)?;
        self.bus.wait_idle_within(deadline).await?;
        Ok(())
    }

    /// Requeues the projection's dead letters.
    pub async fn redrive_dead_letters(&self) -> Result<usize, GatewayError> {
        Ok(self.bus.redrive_dead_letters(self.subscription).await?)
    }

    /// Drops every view and replays the write store's event log.
    pub async fn rebuild_projections(&self) -> Result<u64, GatewayError> {
        let mut processor = ProjectionProcessor::new(self.store.clone());
        processor.register(self.updater.clone());
        Ok(processor.rebuild_all().await?)
    }

    /// Stops the relay after a final outbox pass, then drains the bus.
    pub async fn shutdown(self) {
        self.relay.shutdown().await;
        self.bus.shutdown().await;
        tracing::info!("engine stopped");
    }
}
