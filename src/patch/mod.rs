//! The FM ring patch: configuration, operators and the assembly routine.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    control::{ControlBinding, ControlEvent, ControlMap},
    dsp::oscillator::Waveform,
    engine::{clock::RenderClock, render::Renderer, scheduler::PARAM_QUEUE_CAPACITY},
    graph::{
        dca::GAIN, EnvelopeId, MixerId, ParamRange, PatchGraph, PatchGraphBuilder, ScalerId, UnitId,
    },
    PatchError, EPSILON_FLOOR, MIN_TIME,
};

/*
FM Ring
=======

Each operator is an oscillator with two outputs: an audible one through a VCA
and a modulating one through its own decay envelope and a depth scaler. The
modulating output of every operator drives the frequency of the next, and the
last one wraps around to the first:

    ┌──────────────────────────────────────────────────────────────┐
    │                                                              │
    ▼ frequency                                                    │
  op1.osc ──▶ op1.env ──▶ op1.dca ──▶ op2.osc ──▶ … ──▶ op3.dca ───┘
    │                                   │
    ▼                                   ▼
  op1.vca ───────────────┐          op2.vca ──┐         op3.vca ──┐
                         ▼                    ▼                   ▼
                        mix.in0             mix.in1             mix.in2
                         └───────────────── mix ──▶ amp ──▶ destination

One gain control per operator sets both outputs: the VCA to g (0 to 1) and the
depth scaler to g × modulation scale, so a louder operator also modulates
harder. The trigger group "play" restarts the amplitude envelope and every
operator envelope on the same sample.
*/

/// Name of the trigger group that plays the patch.
pub const PLAY: &str = "play";

/// Settings for [`FmPatch::build`].
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct PatchConfig {
    pub sample_rate: f32,
    /// One operator per entry, in ring order.
    pub frequencies: Vec<f32>,
    pub frequency_range: ParamRange,
    pub waveform: Waveform,
    /// Initial operator gain, 0 to 1.
    pub operator_gain: f32,
    /// Depth, in hertz, of a full-scale operator gain.
    pub modulation_scale: f32,
    pub decay: f32,
    pub decay_range: ParamRange,
    /// Level every envelope rests at. Must be positive.
    pub floor: f32,
    /// Mixer arity; raised to the operator count if smaller.
    pub mixer_channels: usize,
    /// Automation events per parameter in flight between blocks.
    pub queue_capacity: usize,
}

impl Default for PatchConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000.0,
            frequencies: vec![722.0, 500.0, 310.0],
            frequency_range: ParamRange::new(1.0, 4_000.0),
            waveform: Waveform::Sine,
            operator_gain: 0.2,
            modulation_scale: 1_000.0,
            decay: 0.8,
            decay_range: ParamRange::new(MIN_TIME, 10.0),
            floor: EPSILON_FLOOR,
            mixer_channels: 3,
            queue_capacity: PARAM_QUEUE_CAPACITY,
        }
    }
}

impl PatchConfig {
    pub fn with_sample_rate(mut self, sample_rate: f32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_frequencies(mut self, frequencies: impl Into<Vec<f32>>) -> Self {
        self.frequencies = frequencies.into();
        self
    }

    pub fn with_waveform(mut self, waveform: Waveform) -> Self {
        self.waveform = waveform;
        self
    }

    pub fn with_operator_gain(mut self, gain: f32) -> Self {
        self.operator_gain = gain;
        self
    }

    pub fn with_modulation_scale(mut self, scale: f32) -> Self {
        self.modulation_scale = scale;
        self
    }

    pub fn with_decay(mut self, seconds: f32) -> Self {
        self.decay = seconds;
        self
    }

    pub fn with_floor(mut self, floor: f32) -> Self {
        self.floor = floor;
        self
    }

    pub fn with_mixer_channels(mut self, channels: usize) -> Self {
        self.mixer_channels = channels;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    fn validate(&self) -> Result<(), PatchError> {
        if !(self.sample_rate > 0.0 && self.sample_rate.is_finite()) {
            return Err(PatchError::invalid_automation(format!(
                "sample rate must be positive, got {}",
                self.sample_rate
            )));
        }
        if !(self.modulation_scale >= 0.0 && self.modulation_scale.is_finite()) {
            return Err(PatchError::invalid_automation(format!(
                "modulation scale must be non-negative, got {}",
                self.modulation_scale
            )));
        }
        Ok(())
    }
}

/// Oscillator, VCA, modulation envelope and depth scaler.
#[derive(Debug, Clone, PartialEq)]
pub struct Operator {
    name: String,
    pub oscillator: UnitId,
    pub vca: UnitId,
    pub envelope: EnvelopeId,
    pub dca: ScalerId,
    scale: f32,
}

impl Operator {
    fn add(
        builder: &mut PatchGraphBuilder,
        name: String,
        frequency: f32,
        config: &PatchConfig,
    ) -> Result<Self, PatchError> {
        let gain_range = ParamRange::new(0.0, 1.0);
        let gain = gain_range.clamp(config.operator_gain);

        let oscillator = builder.add_oscillator(
            format!("{name}.osc"),
            config.waveform,
            config.frequency_range,
            frequency,
        );
        let vca = builder.add_gain(format!("{name}.vca"), gain_range, gain);
        let envelope = builder.add_envelope(
            format!("{name}.env"),
            config.floor,
            config.decay,
            config.decay_range,
        )?;
        let dca = builder.add_scaler(
            format!("{name}.dca"),
            config.modulation_scale,
            gain * config.modulation_scale,
        );

        builder.connect(builder.output(oscillator)?, builder.input(vca, "in")?)?;
        builder.connect(builder.output(oscillator)?, builder.input(envelope, "in")?)?;
        builder.connect(builder.output(envelope)?, builder.input(dca, "in")?)?;

        Ok(Self {
            name,
            oscillator,
            vca,
            envelope,
            dca,
            scale: config.modulation_scale,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn modulation_scale(&self) -> f32 {
        self.scale
    }

    fn gain_binding(&self) -> ControlBinding {
        ControlBinding::OperatorGain {
            vca: self.vca,
            dca: self.dca,
            scale: self.scale,
        }
    }

    /// Current scheduled gain, 0 to 1.
    pub fn gain(&self, graph: &PatchGraph) -> Result<f32, PatchError> {
        Ok(graph.unit(self.vca)?.param(GAIN)?.current_value())
    }

    pub fn frequency(&self, graph: &PatchGraph) -> Result<f32, PatchError> {
        Ok(graph.unit(self.oscillator)?.param("frequency")?.current_value())
    }

    pub fn waveform(&self, graph: &PatchGraph) -> Result<Waveform, PatchError> {
        Ok(graph.unit(self.oscillator)?.waveform().unwrap_or_default())
    }
}

/// A built FM ring with its control map.
pub struct FmPatch {
    graph: PatchGraph,
    operators: Vec<Operator>,
    mixer: MixerId,
    amplitude: EnvelopeId,
    controls: ControlMap,
    config: PatchConfig,
}

impl FmPatch {
    /// Assemble the ring, start every source and hand back the renderer.
    pub fn build(config: &PatchConfig) -> Result<(FmPatch, Renderer), PatchError> {
        config.validate()?;

        let clock = RenderClock::new(config.sample_rate);
        let mut builder = PatchGraph::builder_with_capacity(clock, config.queue_capacity);

        let operators = config
            .frequencies
            .iter()
            .enumerate()
            .map(|(i, &hz)| Operator::add(&mut builder, format!("op{}", i + 1), hz, config))
            .collect::<Result<Vec<_>, _>>()?;

        let channels = config.mixer_channels.max(operators.len()).max(1);
        let mixer = builder.add_mixer("mix", channels, ParamRange::new(0.0, 1.0), 1.0);
        let amplitude =
            builder.add_envelope("amp", config.floor, config.decay, config.decay_range)?;

        let count = operators.len();
        for (i, op) in operators.iter().enumerate() {
            let next = &operators[(i + 1) % count];
            builder.connect(
                builder.output(op.dca)?,
                builder.input(next.oscillator, "frequency")?,
            )?;
            builder.connect(builder.output(op.vca)?, mixer.input(i))?;
        }
        builder.connect(builder.output(mixer)?, builder.input(amplitude, "in")?)?;
        builder.connect(
            builder.output(amplitude)?,
            builder.input(builder.destination(), "in")?,
        )?;

        let mut play = vec![amplitude];
        play.extend(operators.iter().map(|op| op.envelope));
        builder.add_trigger_group(PLAY, &play)?;

        let (mut graph, renderer) = builder.build();
        graph.start_sources(None);

        let controls = control_map(&operators, mixer, amplitude, channels);
        info!(
            operators = count,
            sample_rate = config.sample_rate,
            "fm patch built"
        );

        let patch = FmPatch {
            graph,
            operators,
            mixer,
            amplitude,
            controls,
            config: config.clone(),
        };
        Ok((patch, renderer))
    }

    pub fn graph(&self) -> &PatchGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut PatchGraph {
        &mut self.graph
    }

    pub fn operators(&self) -> &[Operator] {
        &self.operators
    }

    pub fn operator(&self, index: usize) -> Option<&Operator> {
        self.operators.get(index)
    }

    pub fn mixer(&self) -> MixerId {
        self.mixer
    }

    pub fn amplitude_envelope(&self) -> EnvelopeId {
        self.amplitude
    }

    pub fn controls(&self) -> &ControlMap {
        &self.controls
    }

    pub fn config(&self) -> &PatchConfig {
        &self.config
    }

    pub fn clock(&self) -> &RenderClock {
        self.graph.clock()
    }

    /// Route a control event through the patch's control map.
    pub fn handle(&mut self, event: &ControlEvent) -> Result<Option<f64>, PatchError> {
        self.controls.dispatch(&mut self.graph, event)
    }

    /// Fire the "play" group now.
    pub fn play(&mut self) -> Result<f64, PatchError> {
        self.graph.fire(PLAY, None)
    }
}

/// Control names: `opN.{frequency,gain,decay,depth,waveform}`, `mix.levelN`,
/// `amp.decay`, `patch.decay` (every envelope) and the `play` trigger.
fn control_map(
    operators: &[Operator],
    mixer: MixerId,
    amplitude: EnvelopeId,
    channels: usize,
) -> ControlMap {
    let mut builder = ControlMap::builder().trigger(PLAY, PLAY);

    for op in operators {
        builder = builder
            .bind(
                op.name(),
                "frequency",
                ControlBinding::Parameter {
                    unit: op.oscillator,
                    param: "frequency".into(),
                },
            )
            .bind(op.name(), "gain", op.gain_binding())
            .bind(op.name(), "decay", ControlBinding::DecayTime(vec![op.envelope]))
            .bind(op.name(), "depth", ControlBinding::Depth(op.dca))
            .bind(op.name(), "waveform", ControlBinding::Waveform(op.oscillator));
    }
    for channel in 0..channels {
        builder = builder.bind(
            "mix",
            format!("level{channel}"),
            ControlBinding::Level { mixer, channel },
        );
    }

    let mut all = vec![amplitude];
    all.extend(operators.iter().map(|op| op.envelope));
    debug!(envelopes = all.len(), "control map built");

    builder
        .bind("amp", "decay", ControlBinding::DecayTime(vec![amplitude]))
        .bind("patch", "decay", ControlBinding::DecayTime(all))
        .build()
}
