//! Low-level DSP primitives.
//!
//! These operate on plain `f32` slices and know nothing about ports, units or
//! scheduling. The render engine composes them into unit processors.

/// Multiplication for VCAs, DCAs and envelope shaping.
pub mod amplify;
/// Summing for buses, parameter inputs and the mixer.
pub mod mix;
/// Phase-accumulator oscillator with per-sample frequency.
pub mod oscillator;
