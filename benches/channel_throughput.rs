//! Benchmarks for the per-message hot path: framing, JSON codec, event model
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rtt_plot::channel::{encode_frame, FrameDecoder};
use rtt_plot::types::{
    decode, encode, ArgKind, ArgValue, EventRecord, EventTypeDescription, EventTypeRegistry,
};

fn sample_event(i: u64) -> EventRecord {
    EventRecord::new(
        2,
        i as f64 * 0.001,
        vec![ArgValue::Text("sensor".to_string()), ArgValue::Int((i % 200) as i64)],
    )
}

fn bench_frame_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_codec");

    for size in [64usize, 1024, 16 * 1024].iter() {
        let payload = vec![0xA5u8; *size];
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::new("encode", size), &payload, |b, payload| {
            b.iter(|| encode_frame(black_box(payload)).unwrap())
        });

        let frame = encode_frame(&payload).unwrap();
        group.bench_with_input(BenchmarkId::new("decode_split", size), &frame, |b, frame| {
            let mut decoder = FrameDecoder::new();
            b.iter(|| {
                let (head, tail) = frame.split_at(frame.len() / 2);
                decoder.push(head);
                decoder.push(tail);
                black_box(decoder.next_frame().unwrap())
            })
        });
    }

    group.finish();
}

fn bench_message_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("message_codec");
    let event = sample_event(42);
    let payload = encode(&event).unwrap();

    group.bench_function("encode_event", |b| b.iter(|| encode(black_box(&event)).unwrap()));
    group.bench_function("decode_event", |b| {
        b.iter(|| decode::<EventRecord>(black_box(&payload)).unwrap())
    });

    group.finish();
}

fn bench_registry(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_registry");
    group.throughput(Throughput::Elements(1));

    let mut registry = EventTypeRegistry::new();
    registry
        .register(
            EventTypeDescription::new(2, "task_switch")
                .with_arg("task", ArgKind::String)
                .with_arg("priority", ArgKind::U8),
        )
        .unwrap();

    let mut i = 0u64;
    group.bench_function("admit_known", |b| {
        b.iter(|| {
            i += 1;
            black_box(registry.admit(sample_event(i)))
        })
    });

    group.finish();
}

criterion_group!(benches, bench_frame_codec, bench_message_codec, bench_registry);
criterion_main!(benches);
