//! Signal multiplication primitives shared by VCAs, DCAs and envelopes.

/*
Gain Stages
===========

Three units in the patch are "just" multiplication, told apart only by the
range of the number they multiply with:

  VCA         audio × gain          gain in [0, 1]      loudness
  Envelope    input × level         level in [ε, 1]     shape over time
  DCA         signal × depth        depth in [0, 1000]  unit conversion

The DCA is the interesting one. An envelope or oscillator produces values
around ±1, but an oscillator's frequency input expects Hz. Multiplying by a
depth of 100 turns a 0..1 envelope into a 0..100 Hz deviation, which is then
added to the carrier's base frequency:

    envelope:  [1.00, 0.50, 0.25, ...]
    × depth:   100
    = Hz:      [100,  50,   25,   ...]   summed onto 722 Hz base


The Math
--------

For each sample index i:

    output[i] = signal[i] × gain[i]

Gain is itself a per-sample buffer so scheduled automation (steps and
exponential ramps) lands on the exact sample it was scheduled for.
*/

/// Multiply two signal buffers sample-by-sample into `out`.
#[inline]
pub fn multiply(signal: &[f32], modulator: &[f32], out: &mut [f32]) {
    debug_assert_eq!(signal.len(), modulator.len());
    debug_assert_eq!(signal.len(), out.len());

    for ((o, &s), &m) in out.iter_mut().zip(signal.iter()).zip(modulator.iter()) {
        *o = s * m;
    }
}
