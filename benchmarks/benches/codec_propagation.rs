use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;
use vote_pipeline::pipeline::{Delivery, MessageHeaders, VoteCodec, codec};
use vote_pipeline::telemetry::{
    BaggagePropagator, CompositePropagator, Sampler, TextMapPropagator, TraceContext,
    TraceContextPropagator,
};
use vote_pipeline::types::{Candidate, VoteEvent};

/// Payload encoding and header propagation on the publish/consume hot path
fn bench_payload_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("payload_codec");
    group.warm_up_time(Duration::from_millis(100));

    group.bench_function("encode", |b| {
        b.iter(|| black_box(codec::encode(black_box(Candidate::Two))))
    });

    let payload = codec::encode(Candidate::One);
    group.bench_function("decode", |b| {
        b.iter(|| black_box(codec::decode(black_box(&payload)).unwrap()))
    });

    let malformed = [1u8, 2, 3];
    group.bench_function("decode_malformed", |b| {
        b.iter(|| black_box(codec::decode(black_box(&malformed)).is_err()))
    });

    group.finish();
}

fn context_with_baggage(entries: usize) -> TraceContext {
    (0..entries).fold(TraceContext::new_root(&Sampler::AlwaysOn), |cx, i| {
        cx.with_baggage(format!("key{i}"), format!("value with spaces {i}"))
    })
}

fn bench_propagation(c: &mut Criterion) {
    let mut group = c.benchmark_group("propagation");
    group.warm_up_time(Duration::from_millis(100));

    let cx = context_with_baggage(2);
    let trace_context = TraceContextPropagator::new();
    group.bench_function("traceparent_inject", |b| {
        b.iter(|| {
            let mut headers = MessageHeaders::new();
            trace_context.inject(black_box(&cx), &mut headers);
            black_box(headers)
        })
    });

    let mut headers = MessageHeaders::new();
    trace_context.inject(&cx, &mut headers);
    group.bench_function("traceparent_extract", |b| {
        b.iter(|| black_box(trace_context.extract(black_box(&headers))))
    });

    let baggage = BaggagePropagator::new();
    for entries in [1usize, 8, 64] {
        let cx = context_with_baggage(entries);
        let mut headers = MessageHeaders::new();
        baggage.inject(&cx, &mut headers);

        group.bench_with_input(
            BenchmarkId::new("baggage_extract", entries),
            &headers,
            |b, headers| b.iter(|| black_box(baggage.extract(black_box(headers)))),
        );
    }

    group.finish();
}

fn bench_vote_messages(c: &mut Criterion) {
    let mut group = c.benchmark_group("vote_messages");
    group.warm_up_time(Duration::from_millis(100));

    let codec = VoteCodec::new(Arc::new(CompositePropagator::default()));
    let event = VoteEvent::new(
        Candidate::One,
        context_with_baggage(0)
            .with_baggage("ClientUserAgent", "Mozilla/5.0 (X11; Linux x86_64)")
            .with_baggage("ClientHost", "vote-web-1"),
    );

    group.bench_function("encode_event", |b| {
        b.iter(|| black_box(codec.encode_event(black_box(&event))))
    });

    let message = codec.encode_event(&event);
    let delivery = Delivery {
        delivery_tag: 1,
        payload: message.payload,
        headers: message.headers,
        message_id: message.message_id,
        timestamp: message.timestamp,
        redelivered: false,
    };
    group.bench_function("decode_delivery", |b| {
        b.iter(|| black_box(codec.decode_delivery(black_box(&delivery))))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_payload_codec,
    bench_propagation,
    bench_vote_messages
);
criterion_main!(benches);
