//! Benchmarks for the FM ring patch.
//!
//! Every block drains the queues, evaluates sixteen scheduled parameters plus
//! three modulation sums, and walks fifteen units.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion};
use saavy_patch::patch::{FmPatch, PatchConfig};

use crate::BLOCK_SIZES;

pub fn bench_fm_ring(c: &mut Criterion) {
    let mut group = c.benchmark_group("scenarios/fm_ring");

    for &size in BLOCK_SIZES {
        let mut buffer = vec![0.0f32; size];

        // === IDLE: ring running, nothing triggered ===
        let (_patch, mut renderer) = FmPatch::build(&PatchConfig::default()).unwrap();
        group.bench_with_input(BenchmarkId::new("idle", size), &size, |b, _| {
            b.iter(|| renderer.render_block(black_box(&mut buffer)))
        });

        // === PLAYING: retriggered every iteration, all envelopes decaying ===
        let (mut patch, mut renderer) = FmPatch::build(&PatchConfig::default()).unwrap();
        group.bench_with_input(BenchmarkId::new("retriggered", size), &size, |b, _| {
            b.iter(|| {
                patch.play().unwrap();
                renderer.render_block(black_box(&mut buffer));
            })
        });
    }

    group.finish();
}
