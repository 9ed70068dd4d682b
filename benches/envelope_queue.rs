//! Envelope codec and outbound queue benchmarks.
//!
//! Run with: cargo bench --bench envelope_queue
//! Results saved to: target/criterion/

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use realtime_socket::transport::OutboundQueue;
use realtime_socket::{Envelope, MessageId};
use serde_json::json;
use std::hint::black_box;

// ============================================================================
// Benchmark Parameters
// ============================================================================

const QUEUE_CAPACITIES: &[usize] = &[16, 100, 1_000];

// ============================================================================
// Benchmark: Envelope Codec
// ============================================================================

fn bench_envelope_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("envelope_codec");

    let envelope = Envelope::request(json!({
        "op": "subscribe",
        "channels": ["trades", "book", "ticker"],
        "depth": 25,
    }));
    let text = envelope.to_text().expect("encode");

    group.throughput(Throughput::Bytes(text.len() as u64));

    group.bench_function("encode", |b| {
        b.iter(|| black_box(&envelope).to_text().expect("encode"));
    });

    group.bench_function("decode", |b| {
        b.iter(|| Envelope::from_text(black_box(&text)).expect("decode"));
    });

    group.bench_function("reply", |b| {
        b.iter(|| Envelope::response(MessageId::new("r-1"), black_box(json!({ "ok": true }))));
    });

    group.finish();
}

// ============================================================================
// Benchmark: Queue Churn
// ============================================================================

fn bench_queue_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_churn");

    for &capacity in QUEUE_CAPACITIES {
        let pushes = capacity * 4;
        group.throughput(Throughput::Elements(pushes as u64));

        group.bench_with_input(
            BenchmarkId::new("push_overflow_drain", capacity),
            &capacity,
            |b, &capacity| {
                b.iter(|| {
                    let mut queue = OutboundQueue::new(capacity);
                    for n in 0..pushes {
                        black_box(queue.push(Envelope::message(json!(n))));
                    }
                    queue.drain().count()
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_envelope_codec, bench_queue_churn);
criterion_main!(benches);
