//! Router fan-out benchmark suite.
//!
//! Measures inbound frame handling at different subscriber counts:
//! - Subscribers per type: 1, 10, 100, 1000
//! - Raw `Value` callbacks vs typed `PriceUpdate` callbacks
//!
//! Run with: cargo bench --bench dispatch
//! Results saved to: target/criterion/

use std::hint::black_box;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use market_feed::{MessageRouter, PriceUpdate, Subscription, SubscriptionRegistry};
use serde_json::Value;

// ============================================================================
// Benchmark Parameters
// ============================================================================

const SUBSCRIBER_COUNTS: &[usize] = &[1, 10, 100, 1000];

const PRICE_FRAME: &str = r#"{"type":"price_update","payload":{"symbol":"AAPL","price":178.45,"change":2.34,"changePercent":1.33,"volume":45234567,"timestamp":"2025-01-01T00:00:00Z"},"timestamp":"2025-01-01T00:00:00Z"}"#;

// ============================================================================
// Benchmark: Raw Fan-out
// ============================================================================

fn bench_raw_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("raw_fanout");

    for &count in SUBSCRIBER_COUNTS {
        let (router, _subs, hits) = raw_router(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("route_text", count), &count, |b, _| {
            b.iter(|| router.route_text(black_box(PRICE_FRAME)));
        });
        black_box(hits.load(Ordering::Relaxed));
    }

    group.finish();
}

// ============================================================================
// Benchmark: Typed Fan-out
// ============================================================================

fn bench_typed_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("typed_fanout");

    for &count in SUBSCRIBER_COUNTS {
        let (router, _subs, volume) = typed_router(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("route_text", count), &count, |b, _| {
            b.iter(|| router.route_text(black_box(PRICE_FRAME)));
        });
        black_box(volume.load(Ordering::Relaxed));
    }

    group.finish();
}

// ============================================================================
// Benchmark: Miss
// ============================================================================

fn bench_unsubscribed_type(c: &mut Criterion) {
    let (router, _subs, _) = raw_router(100);
    let frame = PRICE_FRAME.replace("price_update", "trade_update");

    c.bench_function("route_text_no_subscribers", |b| {
        b.iter(|| router.route_text(black_box(&frame)));
    });
}

// ============================================================================
// Helper Functions
// ============================================================================

fn raw_router(count: usize) -> (MessageRouter, Vec<Subscription>, Arc<AtomicU64>) {
    let router = MessageRouter::new(SubscriptionRegistry::new());
    let hits = Arc::new(AtomicU64::new(0));

    let subs = (0..count)
        .map(|_| {
            let hits = Arc::clone(&hits);
            router.registry().subscribe("price_update", move |payload: &Value| {
                if payload.get("symbol").is_some() {
                    hits.fetch_add(1, Ordering::Relaxed);
                }
            })
        })
        .collect();

    (router, subs, hits)
}

fn typed_router(count: usize) -> (MessageRouter, Vec<Subscription>, Arc<AtomicU64>) {
    let router = MessageRouter::new(SubscriptionRegistry::new());
    let volume = Arc::new(AtomicU64::new(0));

    let subs = (0..count)
        .map(|_| {
            let volume = Arc::clone(&volume);
            router
                .registry()
                .subscribe_typed("price_update", move |update: PriceUpdate| {
                    volume.fetch_add(update.volume, Ordering::Relaxed);
                })
        })
        .collect();

    (router, subs, volume)
}

// ============================================================================
// Criterion Setup
// ============================================================================

criterion_group!(
    benches,
    bench_raw_fanout,
    bench_typed_fanout,
    bench_unsubscribed_type
);
criterion_main!(benches);
