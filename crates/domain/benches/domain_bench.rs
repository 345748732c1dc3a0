use common::AggregateId;
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{
    Aggregate, CreateProject, LogWork, Project, ProjectCommand, ProjectService,
};
use write_store::InMemoryWriteRepository;

fn bench_create_project(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("domain/create_project", |b| {
        b.iter(|| {
            rt.block_on(async {
                let service = ProjectService::new(InMemoryWriteRepository::new());
                service
                    .create_project(CreateProject {
                        name: "Bench".to_string(),
                        budget_hours: None,
                    })
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_log_work(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let service = ProjectService::new(InMemoryWriteRepository::new());
    let id = rt.block_on(async {
        let id = service
            .create_project(CreateProject {
                name: "Bench".to_string(),
                budget_hours: None,
            })
            .await
            .unwrap()
            .aggregate_id;
        service.activate(id, None).await.unwrap();
        id
    });

    c.bench_function("domain/log_work", |b| {
        b.iter(|| {
            rt.block_on(async {
                service
                    .log_work(id, LogWork { hours: 1, note: None }, None)
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_process_in_memory(c: &mut Criterion) {
    let id = AggregateId::new();
    let project = Project::default()
        .process(
            id,
            &ProjectCommand::Create(CreateProject {
                name: "Bench".to_string(),
                budget_hours: Some(1_000_000),
            }),
        )
        .unwrap()
        .state;
    let project = project.process(id, &ProjectCommand::Activate).unwrap().state;
    let command = ProjectCommand::LogWork(LogWork {
        hours: 1,
        note: None,
    });

    c.bench_function("domain/process_log_work", |b| {
        b.iter(|| project.process(id, &command).unwrap());
    });
}

criterion_group!(
    benches,
    bench_create_project,
    bench_log_work,
    bench_process_in_memory
);
criterion_main!(benches);
