use std::sync::Arc;

use criterion::{Criterion, criterion_group, criterion_main};
use domain::{CreateProject, LogWork, ProjectService};
use projections::{
    InMemoryReadRepository, ProjectProjector, ProjectView, ProjectionProcessor, ProjectionUpdater,
};
use write_store::{InMemoryWriteRepository, WriteRepository};

/// Populates a store with N projects, each created, activated and given one work entry.
async fn populate_store(store: &InMemoryWriteRepository, n: usize) {
    let service = ProjectService::new(store.clone());
    for i in 0..n {
        let id = service
            .create_project(CreateProject {
                name: format!("project-{i}"),
                budget_hours: None,
            })
            .await
            .unwrap()
            .aggregate_id;
        service.activate(id, None).await.unwrap();
        service
            .log_work(id, LogWork { hours: 2, note: None }, None)
            .await
            .unwrap();
    }
}

fn updater() -> Arc<ProjectionUpdater<Arc<InMemoryReadRepository<ProjectView>>, ProjectProjector>> {
    Arc::new(ProjectionUpdater::new(
        Arc::new(InMemoryReadRepository::new()),
        ProjectProjector,
    ))
}

fn bench_catch_up(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    for projects in [100, 1000] {
        let store = InMemoryWriteRepository::new();
        rt.block_on(populate_store(&store, projects));

        c.bench_function(&format!("projections/catch_up_{}_events", projects * 3), |b| {
            b.iter(|| {
                rt.block_on(async {
                    let mut processor = ProjectionProcessor::new(store.clone());
                    processor.register(updater());
                    processor.run_catch_up().await.unwrap();
                });
            });
        });
    }
}

fn bench_duplicate_delivery(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryWriteRepository::new();
    rt.block_on(populate_store(&store, 1));

    let updater = updater();
    let events = rt.block_on(async {
        let mut processor = ProjectionProcessor::new(store.clone());
        processor.register(updater.clone());
        processor.run_catch_up().await.unwrap();

        let mut stream = store.stream_all_events().await.unwrap();
        let mut events = Vec::new();
        while let Some(event) = futures_util::StreamExt::next(&mut stream).await {
            events.push(event.unwrap());
        }
        events
    });

    c.bench_function("projections/skip_duplicate_event", |b| {
        b.iter(|| {
            rt.block_on(async {
                updater.apply(&events[1]).await.unwrap();
            });
        });
    });
}

criterion_group!(benches, bench_catch_up, bench_duplicate_delivery);
criterion_main!(benches);
