//! Cross-response hot path: directive lookup must stay trivially cheap
//! next to the network call it gates.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ladder_core::exec::CrossResponder;
use ladder_core::{Layer, Side};

fn bench_directive_lookup(c: &mut Criterion) {
    let mut responder = CrossResponder::new(50);
    responder.precompute(0.12);

    c.bench_function("cross_directive_cached", |b| {
        b.iter(|| {
            let d = responder.directive(
                black_box(Side::Buy),
                black_box(Layer::L0),
                black_box(0.12),
            );
            black_box(d)
        })
    });
}

fn bench_directive_rebuild(c: &mut Criterion) {
    let mut responder = CrossResponder::new(50);
    let mut flip = false;

    c.bench_function("cross_directive_regime_flip", |b| {
        b.iter(|| {
            // Alternate regimes so every call rebuilds the entry.
            flip = !flip;
            let imbalance = if flip { 0.15 } else { 0.01 };
            let d = responder.directive(Side::Sell, Layer::L1, black_box(imbalance));
            black_box(d)
        })
    });
}

fn bench_latency_tracking(c: &mut Criterion) {
    let mut responder = CrossResponder::new(50);

    c.bench_function("cross_latency_record", |b| {
        let mut t = 0.0;
        b.iter(|| {
            t += 0.01;
            responder.record_latency(black_box(5.0 + t % 3.0));
        })
    });
}

criterion_group!(
    benches,
    bench_directive_lookup,
    bench_directive_rebuild,
    bench_latency_tracking
);
criterion_main!(benches);
