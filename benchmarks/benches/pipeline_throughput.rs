use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use futures::StreamExt;
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;
use vote_pipeline::config::VoteSettings;
use vote_pipeline::pipeline::{
    CounterStore, InMemoryCounterStore, InMemoryTransport, QueueSpec, QueueTransport,
    ReconnectPolicy, TallyReader, VoteConsumer, VotePublisher,
};
use vote_pipeline::telemetry::{CompositePropagator, Sampler, TraceContext, VoteMetrics};
use vote_pipeline::types::{Candidate, RequestMetadata};

/// Publish and consume throughput over the in-memory transport
fn bench_publish_consume(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    let mut group = c.benchmark_group("publish_consume");
    group.warm_up_time(Duration::from_millis(100));

    let transport = Arc::new(InMemoryTransport::new());
    let store = Arc::new(InMemoryCounterStore::new());
    let propagator = Arc::new(CompositePropagator::default());
    let queue = QueueSpec::new("votes-bench");

    let publisher = VotePublisher::new(
        transport.clone(),
        queue.clone(),
        propagator.clone(),
        Sampler::AlwaysOn,
        Arc::new(VoteMetrics::new()),
    );
    let meta = RequestMetadata::new("criterion", "localhost");

    group.bench_function("cast_vote", |b| {
        b.to_async(&rt).iter(|| async {
            let event = publisher
                .cast_vote(
                    black_box(Candidate::One),
                    black_box(&TraceContext::empty()),
                    black_box(&meta),
                )
                .await
                .unwrap();
            black_box(event);
        })
    });

    // Separate broker so the cast_vote backlog is not drained here
    let transport = Arc::new(InMemoryTransport::new());
    let publisher = VotePublisher::new(
        transport.clone(),
        queue.clone(),
        propagator.clone(),
        Sampler::AlwaysOn,
        Arc::new(VoteMetrics::new()),
    );
    let consumer = VoteConsumer::new(
        transport.clone(),
        store.clone(),
        queue.clone(),
        propagator,
        Sampler::AlwaysOn,
        ReconnectPolicy::default(),
    );
    let subscription = rt.block_on(async {
        transport.declare_queue(&queue).await.unwrap();
        transport.subscribe(&queue.name, true).await.unwrap()
    });
    let subscription = tokio::sync::Mutex::new(subscription);

    for batch in [1usize, 16, 128] {
        group.bench_with_input(
            BenchmarkId::new("cast_and_handle", batch),
            &batch,
            |b, &batch| {
                b.to_async(&rt).iter(|| async {
                    let mut subscription = subscription.lock().await;
                    for _ in 0..batch {
                        publisher
                            .cast_vote(Candidate::Two, &TraceContext::empty(), &meta)
                            .await
                            .unwrap();
                    }
                    for _ in 0..batch {
                        let delivery = subscription.next().await.unwrap().unwrap();
                        black_box(consumer.handle_delivery(&delivery).await);
                    }
                })
            },
        );
    }

    group.finish();
}

fn bench_tally(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    let mut group = c.benchmark_group("tally");
    group.warm_up_time(Duration::from_millis(100));

    let store = Arc::new(InMemoryCounterStore::new());
    let reader = TallyReader::new(store.clone(), VoteSettings::default(), Sampler::AlwaysOn);

    group.bench_function("increment", |b| {
        let key = Candidate::One.counter_key();
        b.to_async(&rt)
            .iter(|| async { black_box(store.increment(&key).await.unwrap()) })
    });

    group.bench_function("read", |b| {
        b.to_async(&rt)
            .iter(|| async { black_box(reader.read(&TraceContext::empty()).await.unwrap()) })
    });

    group.finish();
}

criterion_group!(benches, bench_publish_consume, bench_tally);
criterion_main!(benches);
