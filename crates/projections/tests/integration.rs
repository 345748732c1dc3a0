//! Integration tests: ProjectService commands → outbox relay → event bus →
//! projection updater → query handler.

use std::sync::Arc;
use std::time::Duration;

use common::{AggregateId, RetryConfig};
use domain::{
    CancelProject, CreateProject, DomainError, LogWork, ProjectService, ProjectStatus,
};
use event_bus::{
    BusConfig, DeadLetterQueue, EventBus, OutboxRelay, RelayConfig, SubscriptionId,
};
use projections::{
    InMemoryReadRepository, ProjectProjector, ProjectQuery, ProjectQueryHandler, ProjectView,
    ProjectionProcessor, ProjectionUpdater, Projector, QueryConfig, QueryResult, ReadRepository,
};
use write_store::{InMemoryWriteRepository, Version, WriteRepository};

type Views = Arc<InMemoryReadRepository<ProjectView>>;

struct Pipeline {
    store: InMemoryWriteRepository,
    service: Arc<ProjectService<InMemoryWriteRepository>>,
    bus: EventBus,
    views: Views,
    updater: Arc<ProjectionUpdater<Views, ProjectProjector>>,
    subscription: SubscriptionId,
    relay: OutboxRelay<InMemoryWriteRepository>,
    queries: ProjectQueryHandler<Views>,
}

impl Pipeline {
    async fn new() -> Self {
        let store = InMemoryWriteRepository::new();
        let bus = EventBus::new(BusConfig {
            partitions: 4,
            channel_capacity: 256,
            delivery_retry: RetryConfig {
                max_attempts: 4,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(10),
                multiplier: 2.0,
            },
        });
        let views: Views = Arc::new(InMemoryReadRepository::new());
        let updater = Arc::new(ProjectionUpdater::new(Arc::clone(&views), ProjectProjector));
        let subscription = bus
            .subscribe(ProjectProjector.filter(), updater.clone())
            .await
            .unwrap();

        let relay = OutboxRelay::new(
            store.clone(),
            bus.clone(),
            RelayConfig {
                batch_size: 64,
                poll_interval: Duration::from_millis(10),
                publish_timeout: Duration::from_secs(1),
            },
        );
        let queries = ProjectQueryHandler::new(
            Arc::clone(&views),
            QueryConfig {
                read_wait_timeout: Duration::from_secs(2),
                poll_interval: Duration::from_millis(5),
            },
        );

        Self {
            service: Arc::new(ProjectService::new(store.clone())),
            store,
            bus,
            views,
            updater,
            subscription,
            relay,
            queries,
        }
    }

    /// Drains the outbox and waits for every delivery.
    async fn sync(&self) {
        self.relay.dispatch_pending().await.unwrap();
        self.bus.wait_idle().await;
    }

    async fn create(&self, budget_hours: Option<u32>) -> AggregateId {
        self.service
            .create_project(CreateProject {
                name: "Apollo".into(),
                budget_hours,
            })
            .await
            .unwrap()
            .aggregate_id
    }

    async fn view(&self, id: AggregateId) -> Option<ProjectView> {
        self.views.get(id).await.unwrap()
    }
}

#[tokio::test]
async fn activation_emits_one_event_and_reaches_the_view() {
    let p = Pipeline::new().await;
    let id = p.create(None).await;

    let outcome = p.service.activate(id, None).await.unwrap();
    assert_eq!(outcome.new_version, Version::new(2));
    assert_eq!(outcome.aggregate.status(), ProjectStatus::Active);
    assert_eq!(outcome.events.len(), 1);
    assert_eq!(
        domain::DomainEvent::event_type(&outcome.events[0].event),
        "Activated"
    );

    p.sync().await;
    let view = p.view(id).await.unwrap();
    assert_eq!(view.status, ProjectStatus::Active);
    assert_eq!(view.last_applied_version, Version::new(2));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_activations_on_stale_version_one_wins() {
    let p = Pipeline::new().await;
    let id = p.create(None).await;

    let first = {
        let service = Arc::clone(&p.service);
        tokio::spawn(async move { service.activate(id, Some(Version::first())).await })
    };
    let second = {
        let service = Arc::clone(&p.service);
        tokio::spawn(async move { service.activate(id, Some(Version::first())).await })
    };
    let results = [first.await.unwrap(), second.await.unwrap()];

    let wins: Vec<Version> = results
        .iter()
        .filter_map(|r| r.as_ref().ok().map(|o| o.new_version))
        .collect();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(DomainError::ConcurrencyConflict { .. })))
        .count();
    assert_eq!(wins, vec![Version::new(2)]);
    assert_eq!(conflicts, 1);

    p.sync().await;
    assert_eq!(p.store.event_count().await, 2);
    assert_eq!(p.view(id).await.unwrap().last_applied_version, Version::new(2));
}

#[tokio::test]
async fn invalid_transition_leaves_both_sides_unchanged() {
    let p = Pipeline::new().await;
    let id = p.create(None).await;
    p.sync().await;

    let err = p.service.complete(id, None).await.unwrap_err();
    assert_eq!(err.error_code(), "InvalidTransition");

    p.sync().await;
    let project = p.service.get_project(id).await.unwrap().unwrap();
    assert_eq!(domain::Aggregate::version(&project), Version::first());
    let view = p.view(id).await.unwrap();
    assert_eq!(view.status, ProjectStatus::Created);
    assert_eq!(view.last_applied_version, Version::first());
}

#[tokio::test]
async fn redelivered_events_do_not_double_count() {
    let p = Pipeline::new().await;
    let id = p.create(Some(40)).await;
    p.service.activate(id, None).await.unwrap();
    for hours in [3, 5] {
        p.service
            .log_work(id, LogWork { hours, note: None }, None)
            .await
            .unwrap();
    }
    p.sync().await;
    let before = p.view(id).await.unwrap();
    assert_eq!(before.hours_logged, 8);

    let history = p.store.events_for(id).await.unwrap();
    p.bus.publish(&history).await.unwrap();
    p.bus.publish(&history[2..]).await.unwrap();
    p.bus.wait_idle().await;

    let after = p.view(id).await.unwrap();
    assert_eq!(after, before);
    assert_eq!(after.work_entries, 2);
    assert!(p.bus.dead_letters().is_empty().await);
}

#[tokio::test]
async fn query_after_command_catches_up_within_bounded_wait() {
    let p = Pipeline::new().await;
    let id = p.create(None).await;
    p.sync().await;

    let outcome = p.service.activate(id, None).await.unwrap();

    // Nothing has been relayed yet: the read side still shows the old state.
    let stale = p.queries.get(id, None).await.unwrap();
    assert_eq!(stale.status, ProjectStatus::Created);

    let handle = p.relay.spawn();

    let fresh = p
        .queries
        .execute(ProjectQuery::Get {
            id,
            min_version: Some(outcome.new_version),
        })
        .await
        .unwrap();
    let QueryResult::Project(fresh) = fresh else {
        panic!("expected a single project");
    };
    assert_eq!(fresh.status, ProjectStatus::Active);
    assert_eq!(fresh.last_applied_version, Version::new(2));

    handle.shutdown().await;
}

#[tokio::test]
async fn cancelled_projects_disappear_from_queries() {
    let p = Pipeline::new().await;
    let kept = p.create(None).await;
    let dropped = p.create(None).await;
    p.service
        .cancel(dropped, CancelProject { reason: None }, None)
        .await
        .unwrap();
    p.sync().await;

    assert_eq!(
        p.queries.get(dropped, None).await.unwrap_err().error_code(),
        "NotFound"
    );
    let visible = p.queries.list(None, false).await.unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].id, kept);
    assert_eq!(p.queries.list(None, true).await.unwrap().len(), 2);
}

#[tokio::test]
async fn transient_read_store_outage_is_retried() {
    let p = Pipeline::new().await;
    let id = p.create(None).await;

    p.views.inject_outage(2);
    p.sync().await;

    assert_eq!(p.view(id).await.unwrap().status, ProjectStatus::Created);
    assert!(p.bus.dead_letters().is_empty().await);
}

#[tokio::test]
async fn events_after_a_dead_letter_wait_for_its_redrive() {
    let p = Pipeline::new().await;
    let id = p.create(None).await;
    p.sync().await;

    // Every delivery attempt of Activated fails, so it is dead-lettered.
    p.views.inject_outage(4);
    p.service.activate(id, None).await.unwrap();
    p.sync().await;

    // WorkLogged must not overtake the missing Activated.
    p.service
        .log_work(id, LogWork { hours: 2, note: None }, None)
        .await
        .unwrap();
    p.sync().await;

    let view = p.view(id).await.unwrap();
    assert_eq!(view.status, ProjectStatus::Created);
    assert_eq!(view.last_applied_version, Version::first());
    assert_eq!(p.bus.dead_letters().len().await, 2);

    assert_eq!(p.bus.redrive_dead_letters(p.subscription).await.unwrap(), 2);
    p.bus.wait_idle().await;

    let view = p.view(id).await.unwrap();
    assert_eq!(view.status, ProjectStatus::Active);
    assert_eq!(view.hours_logged, 2);
    assert_eq!(view.last_applied_version, Version::new(3));
    assert!(p.bus.dead_letters().is_empty().await);
}

#[tokio::test]
async fn rebuild_reproduces_live_views() {
    let p = Pipeline::new().await;
    let mut ids = Vec::new();
    for budget in [None, Some(10), Some(20)] {
        let id = p.create(budget).await;
        p.service.activate(id, None).await.unwrap();
        p.service
            .log_work(id, LogWork { hours: 4, note: None }, None)
            .await
            .unwrap();
        ids.push(id);
    }
    p.service.complete(ids[1], None).await.unwrap();
    p.sync().await;

    let mut live = p.views.list().await.unwrap();
    live.sort_by_key(|v| v.id);

    let mut processor = ProjectionProcessor::new(p.store.clone());
    processor.register(p.updater.clone());
    assert_eq!(processor.rebuild_all().await.unwrap(), 10);

    let mut rebuilt = p.views.list().await.unwrap();
    rebuilt.sort_by_key(|v| v.id);
    assert_eq!(rebuilt, live);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn views_converge_to_write_side_state() {
    let p = Pipeline::new().await;
    let handle = OutboxRelay::new(
        p.store.clone(),
        p.bus.clone(),
        RelayConfig {
            batch_size: 8,
            poll_interval: Duration::from_millis(5),
            publish_timeout: Duration::from_secs(1),
        },
    )
    .spawn();

    let mut tasks = Vec::new();
    for n in 0..8u32 {
        let service = Arc::clone(&p.service);
        tasks.push(tokio::spawn(async move {
            let id = service
                .create_project(CreateProject {
                    name: format!("project-{n}"),
                    budget_hours: None,
                })
                .await?
                .aggregate_id;
            service.activate(id, None).await?;
            for _ in 0..=n {
                service
                    .log_work(id, LogWork { hours: 1, note: None }, None)
                    .await?;
            }
            if n % 3 == 0 {
                service.cancel(id, CancelProject::default(), None).await?;
            }
            Ok::<_, DomainError>(id)
        }));
    }

    let mut ids = Vec::new();
    for task in tasks {
        ids.push(task.await.unwrap().unwrap());
    }

    handle.shutdown().await;
    p.sync().await;

    for id in ids {
        let project = p.service.get_project(id).await.unwrap().unwrap();
        let view = p.view(id).await.unwrap();
        assert_eq!(view.status, project.status());
        assert_eq!(view.hours_logged, project.hours_logged());
        assert_eq!(
            view.last_applied_version,
            domain::Aggregate::version(&project)
        );
        assert_eq!(view.tombstoned, project.status() == ProjectStatus::Cancelled);
    }
    assert_eq!(p.store.pending_count().await, 0);
}
