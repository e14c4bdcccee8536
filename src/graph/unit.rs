use rtrb::{Consumer, Producer, RingBuffer};
use tracing::{debug, warn};

use crate::{
    dsp::oscillator::Waveform,
    engine::{
        clock::RenderClock,
        nodes::{
            BusNode, ConstantNode, EnvelopeNode, GainNode, MixerNode, OscillatorNode, RenderNode,
            SourceCommand,
        },
        scheduler::{ParamHandle, ParamRange, ParamTimeline},
    },
    graph::node::{Port, PortKind, PortRef, UnitId, UnitKind},
    PatchError,
};

/*
Signal Unit
===========

A signal unit is the control-side face of one render processor: a name, a
set of typed ports, and one scheduling handle per parameter input. It holds
no audio. Everything it "changes" is a request sent to the renderer.

    ┌──────────────── SignalUnit "op1.osc" ────────────────┐
    │                                                      │
    │  ParameterInput  frequency  [1, 4000]  base 722 Hz ──┼──▶ ParamHandle ──▶ rtrb
    │  AudioOutput     out                                 │
    │  lifecycle       Unstarted → Running → Stopped     ──┼──▶ rtrb (commands)
    └──────────────────────────────────────────────────────┘

Every unit has exactly one output, named "out". Inputs are either audio
("in", "in0", ...) or parameters ("frequency", "gain", "level0", ...).

Start and stop only mean something for sources (oscillators and constants).
Calling them in the wrong state, or on a non-source, does nothing: a UI that
double-fires a button must not crash the patch.
*/

/// Events per source unit that may be in flight before the renderer drains them.
const COMMAND_QUEUE_CAPACITY: usize = 16;

/// Name of the single output port every unit has.
pub const OUTPUT: &str = "out";

/// Lifecycle of a source unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    Unstarted,
    Running,
    Stopped,
}

/// Declarative description of a unit before it is registered.
pub struct UnitTemplate {
    kind: UnitKind,
    audio_inputs: Vec<String>,
    params: Vec<(String, ParamRange, f32)>,
    node: Box<dyn RenderNode>,
    waveform: Option<Waveform>,
}

impl UnitTemplate {
    pub fn oscillator(waveform: Waveform, range: ParamRange, frequency: f32) -> Self {
        Self {
            kind: UnitKind::Oscillator,
            audio_inputs: Vec::new(),
            params: vec![("frequency".into(), range, frequency)],
            node: Box::new(OscillatorNode::new(waveform)),
            waveform: Some(waveform),
        }
    }

    pub fn gain(range: ParamRange, gain: f32) -> Self {
        Self {
            kind: UnitKind::Gain,
            audio_inputs: vec!["in".into()],
            params: vec![("gain".into(), range, gain)],
            node: Box::new(GainNode),
            waveform: None,
        }
    }

    pub fn constant(range: ParamRange, offset: f32) -> Self {
        Self {
            kind: UnitKind::Constant,
            audio_inputs: Vec::new(),
            params: vec![("offset".into(), range, offset)],
            node: Box::new(ConstantNode::new()),
            waveform: None,
        }
    }

    pub fn bus() -> Self {
        Self {
            kind: UnitKind::Bus,
            audio_inputs: vec!["in".into()],
            params: Vec::new(),
            node: Box::new(BusNode),
            waveform: None,
        }
    }

    /// Level rests at `floor` until triggered.
    pub fn envelope(floor: f32) -> Self {
        Self {
            kind: UnitKind::Envelope,
            audio_inputs: vec!["in".into()],
            params: vec![("level".into(), ParamRange::new(floor, 1.0), floor)],
            node: Box::new(EnvelopeNode),
            waveform: None,
        }
    }

    pub fn scaler(max_depth: f32, depth: f32) -> Self {
        Self {
            kind: UnitKind::Scaler,
            audio_inputs: vec!["in".into()],
            params: vec![("gain".into(), ParamRange::new(0.0, max_depth), depth)],
            node: Box::new(GainNode),
            waveform: None,
        }
    }

    pub fn mixer(channels: usize, level_range: ParamRange, level: f32) -> Self {
        Self {
            kind: UnitKind::Mixer,
            audio_inputs: (0..channels).map(|c| format!("in{c}")).collect(),
            params: (0..channels)
                .map(|c| (format!("level{c}"), level_range, level))
                .collect(),
            node: Box::new(MixerNode::new(channels)),
            waveform: None,
        }
    }

    pub fn kind(&self) -> UnitKind {
        self.kind
    }
}

/// Render-side pieces of a unit, handed to the renderer when the graph is built.
pub(crate) struct UnitRenderParts {
    pub node: Box<dyn RenderNode>,
    pub params: Vec<ParamTimeline>,
    pub commands: Option<Consumer<SourceCommand>>,
    pub audio_inputs: usize,
}

struct SourceControl {
    state: SourceState,
    tx: Producer<SourceCommand>,
}

pub struct SignalUnit {
    id: UnitId,
    name: String,
    kind: UnitKind,
    ports: Vec<Port>,
    params: Vec<ParamHandle>,
    source: Option<SourceControl>,
    waveform: Option<Waveform>,
    clock: RenderClock,
}

impl SignalUnit {
    pub(crate) fn new(
        id: UnitId,
        name: impl Into<String>,
        template: UnitTemplate,
        clock: RenderClock,
        queue_capacity: usize,
    ) -> (Self, UnitRenderParts) {
        let name = name.into();
        let UnitTemplate {
            kind,
            audio_inputs,
            params,
            node,
            waveform,
        } = template;

        let mut ports = vec![Port::audio_output(OUTPUT, 0)];
        ports.extend(
            audio_inputs
                .iter()
                .enumerate()
                .map(|(slot, input)| Port::audio_input(input.clone(), slot)),
        );

        let mut handles = Vec::with_capacity(params.len());
        let mut timelines = Vec::with_capacity(params.len());
        for (slot, (param, range, default)) in params.into_iter().enumerate() {
            ports.push(Port::parameter(param.clone(), slot, range, default));
            let (handle, timeline) = ParamHandle::new(
                format!("{name}.{param}"),
                range,
                default,
                clock.clone(),
                queue_capacity,
            );
            handles.push(handle);
            timelines.push(timeline);
        }

        // Sources get a command queue for lifecycle and waveform changes.
        let (source, rx) = if kind.is_source() {
            let (tx, rx) = RingBuffer::<SourceCommand>::new(COMMAND_QUEUE_CAPACITY);
            let control = SourceControl {
                state: SourceState::Unstarted,
                tx,
            };
            (Some(control), Some(rx))
        } else {
            (None, None)
        };

        let unit = Self {
            id,
            name,
            kind,
            ports,
            params: handles,
            source,
            waveform,
            clock,
        };
        let parts = UnitRenderParts {
            node,
            params: timelines,
            commands: rx,
            audio_inputs: audio_inputs.len(),
        };

        (unit, parts)
    }

    pub fn id(&self) -> UnitId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> UnitKind {
        self.kind
    }

    pub fn ports(&self) -> &[Port] {
        &self.ports
    }

    /// Resolve an output port by name.
    pub fn output_port(&self, name: &str) -> Result<PortRef, PatchError> {
        self.find_port(name, |kind| kind == PortKind::AudioOutput)
            .ok_or_else(|| self.port_not_found(name, "output"))
    }

    /// Resolve an audio or parameter input by name.
    pub fn input_port(&self, name: &str) -> Result<PortRef, PatchError> {
        self.find_port(name, PortKind::is_input)
            .ok_or_else(|| self.port_not_found(name, "input"))
    }

    /// The unit's single output.
    pub fn output(&self) -> PortRef {
        PortRef {
            unit: self.id,
            kind: PortKind::AudioOutput,
            slot: 0,
        }
    }

    fn find_port(&self, name: &str, accept: impl Fn(PortKind) -> bool) -> Option<PortRef> {
        self.ports
            .iter()
            .find(|p| p.name == name && accept(p.kind))
            .map(|p| PortRef {
                unit: self.id,
                kind: p.kind,
                slot: p.slot,
            })
    }

    fn port_not_found(&self, port: &str, direction: &'static str) -> PatchError {
        PatchError::PortNotFound {
            unit: self.name.clone(),
            port: port.to_string(),
            direction,
        }
    }

    /// Scheduling handle for a parameter input.
    pub fn param(&self, name: &str) -> Result<&ParamHandle, PatchError> {
        let slot = self.param_slot(name)?;
        Ok(&self.params[slot])
    }

    pub fn param_mut(&mut self, name: &str) -> Result<&mut ParamHandle, PatchError> {
        let slot = self.param_slot(name)?;
        Ok(&mut self.params[slot])
    }

    pub fn params(&self) -> &[ParamHandle] {
        &self.params
    }

    pub(crate) fn name_and_params_mut(&mut self) -> (&str, &mut [ParamHandle]) {
        (&self.name, &mut self.params)
    }

    fn param_slot(&self, name: &str) -> Result<usize, PatchError> {
        self.ports
            .iter()
            .find(|p| p.kind == PortKind::ParameterInput && p.name == name)
            .map(|p| p.slot)
            .ok_or_else(|| self.port_not_found(name, "parameter"))
    }

    /// Schedule a step change on a parameter input. Out-of-range values are
    /// clamped. Returns the timestamp the change was scheduled for.
    pub fn set_parameter(
        &mut self,
        port: &str,
        value: f32,
        at: Option<f64>,
    ) -> Result<f64, PatchError> {
        self.param_mut(port)?.set_value(value, at)
    }

    pub fn source_state(&self) -> Option<SourceState> {
        self.source.as_ref().map(|s| s.state)
    }

    /// Start a source. No-op when already started or not a source.
    pub fn start(&mut self, at: Option<f64>) {
        let time = at.map_or_else(|| self.clock.now(), |t| t.max(0.0));
        let Some(source) = self.source.as_mut() else {
            debug!(unit = %self.name, "start ignored on non-source unit");
            return;
        };
        if source.state != SourceState::Unstarted {
            debug!(unit = %self.name, state = ?source.state, "start ignored");
            return;
        }

        source.state = SourceState::Running;
        send(&mut source.tx, &self.name, SourceCommand::Start(time));
    }

    /// Stop a running source. No-op in any other state.
    pub fn stop(&mut self, at: Option<f64>) {
        let time = at.map_or_else(|| self.clock.now(), |t| t.max(0.0));
        let Some(source) = self.source.as_mut() else {
            debug!(unit = %self.name, "stop ignored on non-source unit");
            return;
        };
        if source.state != SourceState::Running {
            debug!(unit = %self.name, state = ?source.state, "stop ignored");
            return;
        }

        source.state = SourceState::Stopped;
        send(&mut source.tx, &self.name, SourceCommand::Stop(time));
    }

    pub fn waveform(&self) -> Option<Waveform> {
        self.waveform
    }

    /// Change an oscillator's shape at the next block boundary.
    pub fn set_waveform(&mut self, waveform: Waveform) {
        let (Some(current), Some(source)) = (self.waveform.as_mut(), self.source.as_mut()) else {
            debug!(unit = %self.name, "waveform ignored on non-oscillator unit");
            return;
        };

        *current = waveform;
        send(&mut source.tx, &self.name, SourceCommand::SetWaveform(waveform));
    }
}

fn send(tx: &mut Producer<SourceCommand>, unit: &str, command: SourceCommand) {
    if tx.push(command).is_err() {
        warn!(unit, ?command, "command queue full, command dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::node::GraphId;

    fn unit(template: UnitTemplate) -> (SignalUnit, UnitRenderParts) {
        let id = UnitId {
            graph: GraphId::next(),
            index: 0,
        };
        SignalUnit::new(id, "unit", template, RenderClock::new(48_000.0), 32)
    }

    #[test]
    fn resolves_ports_by_name() {
        let (osc, _) = unit(UnitTemplate::oscillator(
            Waveform::Sine,
            ParamRange::new(1.0, 4_000.0),
            500.0,
        ));

        assert_eq!(osc.output_port("out").unwrap().kind, PortKind::AudioOutput);
        assert_eq!(
            osc.input_port("frequency").unwrap().kind,
            PortKind::ParameterInput
        );
        assert!(matches!(
            osc.input_port("gain"),
            Err(PatchError::PortNotFound { .. })
        ));
        assert!(osc.output_port("frequency").is_err());
    }

    #[test]
    fn set_parameter_clamps_to_range() {
        let (mut vca, _) = unit(UnitTemplate::gain(ParamRange::new(0.0, 1.0), 0.2));

        vca.set_parameter("gain", 7.0, Some(0.0)).unwrap();

        let gain = vca.param("gain").unwrap();
        assert_eq!(gain.events().last().unwrap().value, 1.0);
    }

    #[test]
    fn unknown_parameter_is_port_not_found() {
        let (mut vca, _) = unit(UnitTemplate::gain(ParamRange::new(0.0, 1.0), 0.2));
        assert!(matches!(
            vca.set_parameter("frequency", 1.0, None),
            Err(PatchError::PortNotFound { .. })
        ));
    }

    #[test]
    fn start_and_stop_are_idempotent() {
        let (mut osc, mut parts) = unit(UnitTemplate::oscillator(
            Waveform::Sine,
            ParamRange::new(1.0, 4_000.0),
            500.0,
        ));

        osc.stop(None); // before start: ignored
        osc.start(None);
        osc.start(None);
        assert_eq!(osc.source_state(), Some(SourceState::Running));
        osc.stop(None);
        osc.stop(None);
        osc.start(None); // after stop: ignored
        assert_eq!(osc.source_state(), Some(SourceState::Stopped));

        let rx = parts.commands.as_mut().unwrap();
        let mut sent = Vec::new();
        while let Ok(cmd) = rx.pop() {
            sent.push(cmd);
        }
        assert_eq!(sent, vec![SourceCommand::Start(0.0), SourceCommand::Stop(0.0)]);
    }

    #[test]
    fn start_on_non_source_is_a_no_op() {
        let (mut bus, parts) = unit(UnitTemplate::bus());
        bus.start(None);
        assert_eq!(bus.source_state(), None);
        assert!(parts.commands.is_none());
    }

    #[test]
    fn mixer_exposes_numbered_channels() {
        let (mixer, parts) = unit(UnitTemplate::mixer(3, ParamRange::new(0.0, 1.0), 1.0));
        assert!(mixer.input_port("in2").is_ok());
        assert!(mixer.input_port("level2").is_ok());
        assert!(mixer.input_port("in3").is_err());
        assert_eq!(parts.audio_inputs, 3);
        assert_eq!(parts.params.len(), 3);
    }
}
