//! Benchmarks for oscillator waveform generation with per-sample frequency.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion};
use saavy_patch::dsp::oscillator::{OscillatorBlock, Waveform};

use crate::BLOCK_SIZES;

pub fn bench_oscillator(c: &mut Criterion) {
    let mut group = c.benchmark_group("dsp/oscillator");

    for &size in BLOCK_SIZES {
        let mut buffer = vec![0.0f32; size];
        // A frequency that moves every sample, as under FM
        let frequency: Vec<f32> = (0..size)
            .map(|i| 440.0 + 100.0 * (i as f32 / size as f32))
            .collect();

        for waveform in Waveform::ALL {
            let mut osc = OscillatorBlock::new(waveform);
            group.bench_with_input(BenchmarkId::new(waveform.name(), size), &size, |b, _| {
                b.iter(|| {
                    osc.render(black_box(&mut buffer), black_box(&frequency), 48_000.0);
                })
            });
        }
    }

    group.finish();
}
