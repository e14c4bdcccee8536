#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use std::f32::consts::TAU;

/*
Phase-Accumulator Oscillator
============================

Every oscillator in the patch is a phase accumulator: a number that walks
from 0.0 to 1.0 once per cycle and wraps. The waveform is a pure function of
that phase, so changing the frequency never causes a discontinuity - only the
SPEED of the walk changes.

    phase[n+1] = fract(phase[n] + frequency[n] / sample_rate)

Frequency is read per sample from a buffer rather than a single number. That
is what makes frequency modulation possible: another oscillator's (scaled)
output is added to the base frequency sample by sample before it reaches this
block.


Waveforms
---------

  Sine       sin(2π·phase)                 pure tone, the classic FM carrier
  Sawtooth   2·phase - 1                   all harmonics, bright
  Square     +1 for phase < ½, else -1     odd harmonics, hollow
  Triangle   1 - 4·|phase - ½|             odd harmonics, soft

No band-limiting is applied. Saw and square alias at high fundamentals.


Negative Frequencies
--------------------

Deep FM can push the instantaneous frequency below zero. The phase then walks
backwards, which is still well defined because the wrap uses floor():

    fract(-0.25) = -0.25 - floor(-0.25) = 0.75
*/

/// Oscillator waveform shape.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Waveform {
    #[default]
    Sine,
    Sawtooth,
    Square,
    Triangle,
}

impl Waveform {
    pub const ALL: [Waveform; 4] = [
        Waveform::Sine,
        Waveform::Sawtooth,
        Waveform::Square,
        Waveform::Triangle,
    ];

    /// Next shape in the cycle (used by the terminal surface's radio group).
    pub fn next(self) -> Self {
        match self {
            Waveform::Sine => Waveform::Sawtooth,
            Waveform::Sawtooth => Waveform::Square,
            Waveform::Square => Waveform::Triangle,
            Waveform::Triangle => Waveform::Sine,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Waveform::Sine => "sine",
            Waveform::Sawtooth => "sawtooth",
            Waveform::Square => "square",
            Waveform::Triangle => "triangle",
        }
    }

    #[inline]
    fn shape(self, phase: f32) -> f32 {
        match self {
            Waveform::Sine => (TAU * phase).sin(),
            Waveform::Sawtooth => 2.0 * phase - 1.0,
            Waveform::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Waveform::Triangle => 1.0 - 4.0 * (phase - 0.5).abs(),
        }
    }
}

pub struct OscillatorBlock {
    waveform: Waveform,
    phase: f32, // normalized, always in [0, 1)
}

impl OscillatorBlock {
    pub fn new(waveform: Waveform) -> Self {
        Self {
            waveform,
            phase: 0.0,
        }
    }

    /// Switch shape without resetting phase, so the change is click-free for
    /// shapes that agree at the current phase.
    pub fn set_waveform(&mut self, waveform: Waveform) {
        self.waveform = waveform;
    }

    /// Produce one sample at `frequency` Hz, then advance the phase.
    #[inline]
    pub fn next_sample(&mut self, frequency: f32, sample_rate: f32) -> f32 {
        let out = self.waveform.shape(self.phase);
        let next = self.phase + frequency / sample_rate;
        self.phase = next - next.floor();
        out
    }

    /// Fill `out`, reading the instantaneous frequency for each sample from
    /// `frequency`.
    pub fn render(&mut self, out: &mut [f32], frequency: &[f32], sample_rate: f32) {
        debug_assert_eq!(out.len(), frequency.len());

        for (o, &f) in out.iter_mut().zip(frequency.iter()) {
            *o = self.next_sample(f, sample_rate);
        }
    }
}
