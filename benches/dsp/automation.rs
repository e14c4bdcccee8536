//! Benchmarks for automation timeline evaluation.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion};
use saavy_patch::engine::automation::AutomationTimeline;

use crate::BLOCK_SIZES;

pub fn bench_automation(c: &mut Criterion) {
    let mut group = c.benchmark_group("dsp/automation");

    for &size in BLOCK_SIZES {
        let mut buffer = vec![0.0f32; size];

        // Held value - fast path, no events
        let held = AutomationTimeline::new(0.5);
        group.bench_with_input(BenchmarkId::new("held", size), &size, |b, _| {
            b.iter(|| held.render(black_box(&mut buffer), 0, 48_000.0))
        });

        // Exponential decay spanning the whole block
        let mut decay = AutomationTimeline::new(1e-4);
        decay.set_value_at_time(1.0, 0.0);
        let _ = decay.exponential_ramp_to_value_at_time(1e-4, 0.8);
        group.bench_with_input(BenchmarkId::new("exponential", size), &size, |b, _| {
            b.iter(|| decay.render(black_box(&mut buffer), 4_800, 48_000.0))
        });
    }

    group.finish();
}
