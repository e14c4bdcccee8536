//! Benchmarks for complete patches.

mod fm_ring;

pub use fm_ring::bench_fm_ring;
