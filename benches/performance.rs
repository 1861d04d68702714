//! Performance benchmarks for the event poller.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use transport_poller::{
    Event, EventKind, EventPoller, GroupId, InMemoryEventSource, Listener, ListenerRegistry,
    PollerConfig, StreamId,
};

fn counting_listener(kind: EventKind, stream: i64, counter: &Arc<AtomicUsize>) -> Listener {
    let counter = Arc::clone(counter);
    Listener::builder(kind, move |e: &Event| {
        counter.fetch_add(black_box(e.timestamp.0) as usize & 1, Ordering::Relaxed);
        false
    })
    .stream(StreamId(stream))
    .build()
}

/// Benchmark a full tick over a fresh history with varying listener counts.
///
/// Each iteration registers a fresh poller so every tick replays the history.
fn bench_tick_by_listeners(c: &mut Criterion) {
    let mut group = c.benchmark_group("tick_by_listeners");
    let kinds = [EventKind::Echo, EventKind::Process, EventKind::CpuUsage, EventKind::MemoryUsage];

    let source = Arc::new(InMemoryEventSource::new());
    for ts in 0..1_000i64 {
        let kind = kinds[(ts % 4) as usize];
        source.push(Event::new(StreamId(ts % 8), kind, ts).with_group(GroupId(ts % 3)));
    }

    for listeners in [1, 10, 100] {
        group.bench_with_input(BenchmarkId::new("listeners", listeners), &listeners, |b, &n| {
            let counter = Arc::new(AtomicUsize::new(0));
            b.iter(|| {
                let poller = EventPoller::create(source.clone(), PollerConfig::manual()).unwrap();
                for i in 0..n {
                    poller
                        .register_listener(&counting_listener(kinds[i % 4], (i % 8) as i64, &counter))
                        .unwrap();
                }
                black_box(poller.poll_now().unwrap());
                poller.stop();
            });
        });
    }

    group.finish();
}

/// Benchmark a steady-state tick: history already delivered, a small batch of
/// new events per tick.
fn bench_incremental_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("incremental_tick");

    for batch in [1usize, 10, 100] {
        group.bench_with_input(BenchmarkId::new("batch", batch), &batch, |b, &batch| {
            let source = Arc::new(InMemoryEventSource::new());
            let poller = EventPoller::create(source.clone(), PollerConfig::manual()).unwrap();
            let counter = Arc::new(AtomicUsize::new(0));
            for stream in 0..4 {
                poller
                    .register_listener(&counting_listener(EventKind::Echo, stream, &counter))
                    .unwrap();
            }

            let mut ts = 0i64;
            b.iter(|| {
                for _ in 0..batch {
                    source.push(Event::new(StreamId(ts % 4), EventKind::Echo, ts));
                    ts += 1;
                }
                black_box(poller.poll_now().unwrap());
            });
            poller.stop();
        });
    }

    group.finish();
}

/// Benchmark registry snapshots under a large listener set.
fn bench_registry_snapshot(c: &mut Criterion) {
    let registry = ListenerRegistry::new();
    let counter = Arc::new(AtomicUsize::new(0));
    for i in 0..1_000 {
        registry.add(&counting_listener(EventKind::Echo, i, &counter));
    }

    c.bench_function("registry_snapshot_1000", |b| {
        b.iter(|| black_box(registry.snapshot().len()))
    });

    c.bench_function("registry_add_remove_1000", |b| {
        let listener = counting_listener(EventKind::Echo, 0, &counter);
        b.iter(|| {
            registry.add(&listener);
            black_box(registry.remove(&listener));
        })
    });
}

criterion_group!(
    benches,
    bench_tick_by_listeners,
    bench_incremental_tick,
    bench_registry_snapshot
);
criterion_main!(benches);
