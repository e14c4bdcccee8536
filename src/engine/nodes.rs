//! Render-side processors, one per signal unit.
//!
//! A processor sees its inputs already summed and its parameters already
//! evaluated per sample (scheduled value plus every modulation connection).
//! It only has to combine them into its output block.

use crate::dsp::{
    amplify::multiply,
    mix::{normalization, sum_scaled_in_place},
    oscillator::{OscillatorBlock, Waveform},
};

/// Context passed to processors for each block.
///
/// - sample_rate: Audio sample rate (e.g., 48000.0)
/// - start_frame: Render-clock frame of the block's first sample
pub struct RenderCtx {
    pub sample_rate: f32,
    pub start_frame: u64,
}

impl RenderCtx {
    pub fn new(sample_rate: f32, start_frame: u64) -> Self {
        Self {
            sample_rate,
            start_frame,
        }
    }

    /// Render-clock time of sample `offset` in this block.
    #[inline]
    pub fn time_at(&self, offset: usize) -> f64 {
        (self.start_frame + offset as u64) as f64 / self.sample_rate as f64
    }

    pub fn nyquist(&self) -> f32 {
        self.sample_rate * 0.5
    }
}

/// Inputs and parameters for one block, indexed like the unit's ports.
pub struct ProcessIo<'a> {
    pub inputs: &'a [Vec<f32>],
    pub input_connected: &'a [bool],
    pub params: &'a [Vec<f32>],
}

impl ProcessIo<'_> {
    #[inline]
    pub fn input(&self, index: usize, len: usize) -> &[f32] {
        &self.inputs[index][..len]
    }

    #[inline]
    pub fn param(&self, index: usize, len: usize) -> &[f32] {
        &self.params[index][..len]
    }
}

/// Lifecycle and shape commands for source units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SourceCommand {
    Start(f64),
    Stop(f64),
    SetWaveform(Waveform),
}

/// Core trait for render-side unit processors.
pub trait RenderNode: Send {
    fn process(&mut self, io: &ProcessIo, out: &mut [f32], ctx: &RenderCtx);

    /// Apply a lifecycle command. Default: ignore (non-source units).
    fn handle(&mut self, _command: SourceCommand) {}
}

impl RenderNode for Box<dyn RenderNode> {
    fn process(&mut self, io: &ProcessIo, out: &mut [f32], ctx: &RenderCtx) {
        (**self).process(io, out, ctx)
    }

    fn handle(&mut self, command: SourceCommand) {
        (**self).handle(command)
    }
}

/// Sample-accurate start/stop window of a source.
#[derive(Debug, Default, Clone, Copy)]
struct SourceGate {
    start: Option<f64>,
    stop: Option<f64>,
}

impl SourceGate {
    fn handle(&mut self, command: SourceCommand) {
        match command {
            SourceCommand::Start(t) => self.start = Some(t),
            SourceCommand::Stop(t) => self.stop = Some(t),
            SourceCommand::SetWaveform(_) => {}
        }
    }

    #[inline]
    fn is_playing(&self, time: f64) -> bool {
        match self.start {
            Some(start) => time >= start && self.stop.map_or(true, |stop| time < stop),
            None => false,
        }
    }
}

pub struct OscillatorNode {
    osc: OscillatorBlock,
    gate: SourceGate,
}

impl OscillatorNode {
    pub const FREQUENCY: usize = 0;

    pub fn new(waveform: Waveform) -> Self {
        Self {
            osc: OscillatorBlock::new(waveform),
            gate: SourceGate::default(),
        }
    }
}

impl RenderNode for OscillatorNode {
    fn process(&mut self, io: &ProcessIo, out: &mut [f32], ctx: &RenderCtx) {
        let frequency = io.param(Self::FREQUENCY, out.len());
        // Deep feedback can run away; beyond Nyquist the pitch is meaningless.
        let nyquist = ctx.nyquist();

        for (i, (o, &f)) in out.iter_mut().zip(frequency.iter()).enumerate() {
            *o = if self.gate.is_playing(ctx.time_at(i)) {
                self.osc.next_sample(f.clamp(-nyquist, nyquist), ctx.sample_rate)
            } else {
                0.0
            };
        }
    }

    fn handle(&mut self, command: SourceCommand) {
        match command {
            SourceCommand::SetWaveform(waveform) => self.osc.set_waveform(waveform),
            other => self.gate.handle(other),
        }
    }
}

pub struct ConstantNode {
    gate: SourceGate,
}

impl ConstantNode {
    pub const OFFSET: usize = 0;

    pub fn new() -> Self {
        Self {
            gate: SourceGate::default(),
        }
    }
}

impl Default for ConstantNode {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderNode for ConstantNode {
    fn process(&mut self, io: &ProcessIo, out: &mut [f32], ctx: &RenderCtx) {
        let offset = io.param(Self::OFFSET, out.len());
        for (i, (o, &v)) in out.iter_mut().zip(offset.iter()).enumerate() {
            *o = if self.gate.is_playing(ctx.time_at(i)) { v } else { 0.0 };
        }
    }

    fn handle(&mut self, command: SourceCommand) {
        self.gate.handle(command);
    }
}

/// `out = in × gain`. Serves both VCAs and modulation scalers.
pub struct GainNode;

impl GainNode {
    pub const INPUT: usize = 0;
    pub const GAIN: usize = 0;
}

impl RenderNode for GainNode {
    fn process(&mut self, io: &ProcessIo, out: &mut [f32], _ctx: &RenderCtx) {
        let len = out.len();
        multiply(io.input(Self::INPUT, len), io.param(Self::GAIN, len), out);
    }
}

/// Summing bus: every connection into the input is already added up.
pub struct BusNode;

impl RenderNode for BusNode {
    fn process(&mut self, io: &ProcessIo, out: &mut [f32], _ctx: &RenderCtx) {
        let len = out.len();
        out.copy_from_slice(io.input(0, len));
    }
}

/// Envelope level, applied to the input when one is connected.
pub struct EnvelopeNode;

impl EnvelopeNode {
    pub const INPUT: usize = 0;
    pub const LEVEL: usize = 0;
}

impl RenderNode for EnvelopeNode {
    fn process(&mut self, io: &ProcessIo, out: &mut [f32], _ctx: &RenderCtx) {
        let len = out.len();
        let level = io.param(Self::LEVEL, len);

        if io.input_connected[Self::INPUT] {
            multiply(io.input(Self::INPUT, len), level, out);
        } else {
            out.copy_from_slice(level);
        }
    }
}

/// N channels, each scaled by its level, summed and normalized by 1/N.
pub struct MixerNode {
    channels: usize,
}

impl MixerNode {
    pub fn new(channels: usize) -> Self {
        Self { channels }
    }
}

impl RenderNode for MixerNode {
    fn process(&mut self, io: &ProcessIo, out: &mut [f32], _ctx: &RenderCtx) {
        let len = out.len();
        out.fill(0.0);

        for channel in 0..self.channels {
            sum_scaled_in_place(out, io.input(channel, len), io.param(channel, len));
        }

        let norm = normalization(self.channels);
        for o in out.iter_mut() {
            *o *= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(
        node: &mut dyn RenderNode,
        inputs: &[Vec<f32>],
        params: &[Vec<f32>],
        len: usize,
    ) -> Vec<f32> {
        let connected = vec![true; inputs.len()];
        let io = ProcessIo {
            inputs,
            input_connected: &connected,
            params,
        };
        let mut out = vec![0.0; len];
        node.process(&io, &mut out, &RenderCtx::new(1_000.0, 0));
        out
    }

    #[test]
    fn oscillator_is_silent_until_started() {
        let mut osc = OscillatorNode::new(Waveform::Square);
        let params = vec![vec![100.0; 8]];

        assert!(run(&mut osc, &[], &params, 8).iter().all(|&s| s == 0.0));

        osc.handle(SourceCommand::Start(0.004));
        let out = run(&mut osc, &[], &params, 8);
        assert_eq!(&out[..4], &[0.0; 4]);
        assert_eq!(out[4], 1.0);
    }

    #[test]
    fn stop_is_sample_accurate() {
        let mut constant = ConstantNode::new();
        constant.handle(SourceCommand::Start(0.0));
        constant.handle(SourceCommand::Stop(0.002));

        let out = run(&mut constant, &[], &[vec![0.5; 4]], 4);
        assert_eq!(out, vec![0.5, 0.5, 0.0, 0.0]);
    }

    #[test]
    fn mixer_normalizes_by_channel_count() {
        let mut mixer = MixerNode::new(3);
        let inputs = vec![vec![0.3; 4], vec![0.6; 4], vec![0.9; 4]];
        let params = vec![vec![1.0; 4]; 3];

        let out = run(&mut mixer, &inputs, &params, 4);
        assert!(out.iter().all(|&s| (s - 0.6).abs() < 1e-6));
    }

    #[test]
    fn unconnected_envelope_emits_its_level() {
        let mut env = EnvelopeNode;
        let io = ProcessIo {
            inputs: &[vec![0.0; 4]],
            input_connected: &[false],
            params: &[vec![0.25; 4]],
        };
        let mut out = vec![0.0; 4];
        env.process(&io, &mut out, &RenderCtx::new(1_000.0, 0));
        assert_eq!(out, vec![0.25; 4]);
    }
}
