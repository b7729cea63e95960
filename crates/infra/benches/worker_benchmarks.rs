use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use std::sync::Arc;

use courier_events::{Event, EventBase, EventConfig, EventRegistry, EventService, EventType};
use courier_infra::{
    InMemoryWorkerRepository, QUEUE_DRIVER, QueueableDriver, RepositoryModelFactory,
    WorkerFilter, WorkerModelFactory, WorkerOptions, WorkerRepository, WorkerService,
};
use serde_json::json;

struct BenchEvent {
    base: EventBase,
}

impl Event for BenchEvent {
    fn base(&self) -> &EventBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut EventBase {
        &mut self.base
    }
}

impl EventType for BenchEvent {
    const NAME: &'static str = "BenchEvent";
    const QUEUE: &'static str = "bench";

    fn from_base(base: EventBase) -> Self {
        Self { base }
    }
}

fn setup() -> (Arc<InMemoryWorkerRepository>, Arc<EventService>, WorkerService) {
    let repo = Arc::new(InMemoryWorkerRepository::new());
    let repository: Arc<dyn WorkerRepository> = repo.clone();
    let factory: Arc<dyn WorkerModelFactory> =
        Arc::new(RepositoryModelFactory::new(Arc::clone(&repository)));

    let config = EventConfig::builder()
        .default_driver(QueueableDriver::constructor(Arc::clone(&factory)))
        .driver(QUEUE_DRIVER, QueueableDriver::constructor(Arc::clone(&factory)))
        .build();
    let registry = EventRegistry::new();
    registry.register_type::<BenchEvent>();
    let events = Arc::new(EventService::new(config, Arc::new(registry)));
    events.register_config();

    let worker = WorkerService::new()
        .with_worker_repository(repository)
        .with_worker_factory(factory)
        .with_event_service(Arc::clone(&events));

    (repo, events, worker)
}

fn bench_dispatch(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("queue_dispatch");

    for count in [10usize, 100, 1000] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.to_async(&runtime).iter(|| async move {
                let (_, events, _) = setup();
                for n in 0..count {
                    let event = BenchEvent::build(&json!({"n": n})).unwrap();
                    events.dispatch(black_box(&event)).await.unwrap();
                }
            });
        });
    }

    group.finish();
}

fn bench_drain(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("worker_drain");
    let options = WorkerOptions::new("bench", 3);

    for count in [10usize, 100, 1000] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            let options = options.clone();
            b.to_async(&runtime).iter(|| {
                let options = options.clone();
                async move {
                    let (repo, events, worker) = setup();
                    for n in 0..count {
                        let event = BenchEvent::build(&json!({"n": n})).unwrap();
                        events.dispatch(&event).await.unwrap();
                    }
                    let report = worker.run_worker(&options).await.unwrap();
                    assert_eq!(report.succeeded, count);
                    black_box(repo.get_workers(&WorkerFilter::all()).await.unwrap());
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_dispatch, bench_drain);
criterion_main!(benches);
