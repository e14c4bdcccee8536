use tracing::debug;

use crate::{
    dsp::oscillator::Waveform,
    engine::{
        clock::RenderClock,
        render::{Renderer, Wire},
        scheduler::{ParamRange, PARAM_QUEUE_CAPACITY},
    },
    graph::{
        dca::{ModulationScaler, ScalerId, GAIN},
        envelope::{DecayShape, EnvelopeGenerator, EnvelopeId, EnvelopeState, LEVEL},
        mix::{Mixer, MixerId},
        node::{GraphId, Port, PortKind, PortRef, UnitId, UnitKind},
        trigger::TriggerBroadcaster,
        unit::{SignalUnit, UnitRenderParts, UnitTemplate},
    },
    PatchError,
};

/*
Patch Graph
===========

A patch is declared once and then only played. The builder collects units,
connections and trigger groups; `build()` seals the topology and splits it in
two:

    PatchGraphBuilder ──build()──▶ PatchGraph  (control thread)
                                   Renderer    (render thread)

The PatchGraph keeps every unit's scheduling handles. The Renderer keeps
every processor and the wiring, and nothing can be connected afterwards.

Connection rules
----------------

    source                      destination          allowed when
    ────────────────────────    ─────────────────    ───────────────────────────
    AudioOutput                 AudioInput           no audio-only loop results
    AudioOutput of a scaler     ParameterInput       always
    AudioOutput of anything     ParameterInput       never (TypeMismatch)
    an input                    anything             never (TypeMismatch)

Audio-only loops have no sample to start from and are rejected. Loops that
pass through a parameter input are the point of FM feedback and are kept;
the renderer breaks them with one block of delay.

Several connections into the same input sum.
*/

/// A directed edge from an output to an input.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Connection {
    pub source: PortRef,
    pub dest: PortRef,
}

/// Read-only description of one unit.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitSummary {
    pub id: UnitId,
    pub name: String,
    pub kind: UnitKind,
    pub ports: Vec<Port>,
}

/// Read-only description of a whole patch, for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct TopologySnapshot {
    pub units: Vec<UnitSummary>,
    pub connections: Vec<Connection>,
    pub groups: Vec<(String, Vec<EnvelopeId>)>,
    pub destination: UnitId,
}

impl TopologySnapshot {
    pub fn unit(&self, name: &str) -> Option<&UnitSummary> {
        self.units.iter().find(|u| u.name == name)
    }

    pub fn connections_into(&self, unit: UnitId) -> impl Iterator<Item = &Connection> + '_ {
        self.connections.iter().filter(move |c| c.dest.unit == unit)
    }
}

/// Units of one graph, plus the decay settings of its envelopes.
pub(crate) struct UnitTable {
    graph: GraphId,
    units: Vec<SignalUnit>,
    shapes: Vec<Option<DecayShape>>,
}

impl UnitTable {
    fn new(graph: GraphId) -> Self {
        Self {
            graph,
            units: Vec::new(),
            shapes: Vec::new(),
        }
    }

    fn push(&mut self, unit: SignalUnit, shape: Option<DecayShape>) {
        self.units.push(unit);
        self.shapes.push(shape);
    }

    fn next_id(&self) -> UnitId {
        UnitId {
            graph: self.graph,
            index: self.units.len(),
        }
    }

    fn index(&self, id: UnitId) -> Result<usize, PatchError> {
        if id.graph != self.graph || id.index >= self.units.len() {
            return Err(PatchError::UnknownUnit(id.to_string()));
        }
        Ok(id.index)
    }

    pub(crate) fn get(&self, id: UnitId) -> Result<&SignalUnit, PatchError> {
        let index = self.index(id)?;
        Ok(&self.units[index])
    }

    pub(crate) fn get_mut(&mut self, id: UnitId) -> Result<&mut SignalUnit, PatchError> {
        let index = self.index(id)?;
        Ok(&mut self.units[index])
    }

    fn find(&self, name: &str) -> Option<UnitId> {
        self.units.iter().find(|u| u.name() == name).map(SignalUnit::id)
    }

    fn shape(&self, id: EnvelopeId) -> Result<&DecayShape, PatchError> {
        let index = self.index(id.0)?;
        self.shapes[index]
            .as_ref()
            .ok_or_else(|| PatchError::UnknownUnit(id.0.to_string()))
    }

    fn interrupt_ramp(&mut self, id: UnitId, at: f64) {
        if let Some(Some(shape)) = self.shapes.get_mut(id.index) {
            shape.interrupt(at);
        }
    }

    pub(crate) fn envelope(&mut self, id: EnvelopeId) -> Result<EnvelopeGenerator<'_>, PatchError> {
        let index = self.index(id.0)?;
        let shape = self.shapes[index]
            .as_mut()
            .ok_or_else(|| PatchError::UnknownUnit(id.0.to_string()))?;
        let level = self.units[index].param_mut(LEVEL)?;
        Ok(EnvelopeGenerator::new(id, shape, level))
    }

    fn scaler(&mut self, id: ScalerId) -> Result<ModulationScaler<'_>, PatchError> {
        let unit = self.get_mut(id.0)?;
        if unit.kind() != UnitKind::Scaler {
            return Err(PatchError::UnknownUnit(id.0.to_string()));
        }
        Ok(ModulationScaler::new(unit.param_mut(GAIN)?))
    }

    fn mixer(&mut self, id: MixerId) -> Result<Mixer<'_>, PatchError> {
        let unit = self.get_mut(id.0)?;
        if unit.kind() != UnitKind::Mixer {
            return Err(PatchError::UnknownUnit(id.0.to_string()));
        }
        let (name, levels) = unit.name_and_params_mut();
        Ok(Mixer::new(name, levels))
    }

    /// `unit.port` for a port reference, checking the port exists.
    fn label(&self, port: PortRef) -> Result<String, PatchError> {
        let unit = self.get(port.unit)?;
        unit.ports()
            .iter()
            .find(|p| p.kind == port.kind && p.slot == port.slot)
            .map(|p| format!("{}.{}", unit.name(), p.name))
            .ok_or_else(|| PatchError::PortNotFound {
                unit: unit.name().to_string(),
                port: format!("{:?}#{}", port.kind, port.slot),
                direction: if port.kind.is_input() { "input" } else { "output" },
            })
    }

    fn summaries(&self) -> Vec<UnitSummary> {
        self.units
            .iter()
            .map(|u| UnitSummary {
                id: u.id(),
                name: u.name().to_string(),
                kind: u.kind(),
                ports: u.ports().to_vec(),
            })
            .collect()
    }
}

pub struct PatchGraphBuilder {
    clock: RenderClock,
    units: UnitTable,
    render_parts: Vec<(UnitRenderParts, Vec<String>)>,
    connections: Vec<Connection>,
    groups: Vec<TriggerBroadcaster>,
    queue_capacity: usize,
    destination: UnitId,
}

impl PatchGraphBuilder {
    fn new(clock: RenderClock, queue_capacity: usize) -> Self {
        let units = UnitTable::new(GraphId::next());
        let destination = units.next_id();

        let mut builder = Self {
            clock,
            units,
            render_parts: Vec::new(),
            connections: Vec::new(),
            groups: Vec::new(),
            queue_capacity,
            destination,
        };
        builder.add_unit("destination", UnitTemplate::bus());
        builder
    }

    pub fn clock(&self) -> &RenderClock {
        &self.clock
    }

    /// The output bus whose signal the renderer hands to the audio device.
    pub fn destination(&self) -> UnitId {
        self.destination
    }

    /// Register a unit described by `template`.
    pub fn add_unit(&mut self, name: impl Into<String>, template: UnitTemplate) -> UnitId {
        self.insert(name.into(), template, None)
    }

    fn insert(
        &mut self,
        name: String,
        template: UnitTemplate,
        shape: Option<DecayShape>,
    ) -> UnitId {
        let id = self.units.next_id();
        let (unit, parts) = SignalUnit::new(
            id,
            name,
            template,
            self.clock.clone(),
            self.queue_capacity,
        );
        let param_names = unit
            .ports()
            .iter()
            .filter(|p| p.kind == PortKind::ParameterInput)
            .map(|p| p.name.clone())
            .collect();

        debug!(unit = %id, name = unit.name(), kind = ?unit.kind(), "unit added");
        self.units.push(unit, shape);
        self.render_parts.push((parts, param_names));
        id
    }

    pub fn add_oscillator(
        &mut self,
        name: impl Into<String>,
        waveform: Waveform,
        range: ParamRange,
        frequency: f32,
    ) -> UnitId {
        self.add_unit(name, UnitTemplate::oscillator(waveform, range, frequency))
    }

    pub fn add_gain(&mut self, name: impl Into<String>, range: ParamRange, gain: f32) -> UnitId {
        self.add_unit(name, UnitTemplate::gain(range, gain))
    }

    pub fn add_constant(
        &mut self,
        name: impl Into<String>,
        range: ParamRange,
        offset: f32,
    ) -> UnitId {
        self.add_unit(name, UnitTemplate::constant(range, offset))
    }

    pub fn add_bus(&mut self, name: impl Into<String>) -> UnitId {
        self.add_unit(name, UnitTemplate::bus())
    }

    /// Envelope resting at `floor`, decaying over `decay` seconds (clamped to
    /// `decay_range`) on every trigger.
    pub fn add_envelope(
        &mut self,
        name: impl Into<String>,
        floor: f32,
        decay: f32,
        decay_range: ParamRange,
    ) -> Result<EnvelopeId, PatchError> {
        let shape = DecayShape::new(floor, decay, decay_range)?;
        let id = self.insert(name.into(), UnitTemplate::envelope(floor), Some(shape));
        Ok(EnvelopeId(id))
    }

    pub fn add_scaler(&mut self, name: impl Into<String>, max_depth: f32, depth: f32) -> ScalerId {
        ScalerId(self.add_unit(name, UnitTemplate::scaler(max_depth, depth)))
    }

    pub fn add_mixer(
        &mut self,
        name: impl Into<String>,
        channels: usize,
        level_range: ParamRange,
        level: f32,
    ) -> MixerId {
        let channels = channels.max(1);
        MixerId(self.add_unit(name, UnitTemplate::mixer(channels, level_range, level)))
    }

    /// Group envelopes under `name` so they can be fired together. A group
    /// with the same name is replaced.
    pub fn add_trigger_group(
        &mut self,
        name: impl Into<String>,
        envelopes: &[EnvelopeId],
    ) -> Result<(), PatchError> {
        for &envelope in envelopes {
            self.units.shape(envelope)?;
        }

        let group = TriggerBroadcaster::new(name, envelopes.to_vec());
        self.groups.retain(|g| g.name() != group.name());
        debug!(group = group.name(), envelopes = envelopes.len(), "trigger group added");
        self.groups.push(group);
        Ok(())
    }

    pub fn unit(&self, id: impl Into<UnitId>) -> Result<&SignalUnit, PatchError> {
        self.units.get(id.into())
    }

    pub fn unit_mut(&mut self, id: impl Into<UnitId>) -> Result<&mut SignalUnit, PatchError> {
        self.units.get_mut(id.into())
    }

    pub fn envelope(&mut self, id: EnvelopeId) -> Result<EnvelopeGenerator<'_>, PatchError> {
        self.units.envelope(id)
    }

    pub fn scaler(&mut self, id: ScalerId) -> Result<ModulationScaler<'_>, PatchError> {
        self.units.scaler(id)
    }

    pub fn mixer(&mut self, id: MixerId) -> Result<Mixer<'_>, PatchError> {
        self.units.mixer(id)
    }

    /// The output port of `unit`.
    pub fn output(&self, unit: impl Into<UnitId>) -> Result<PortRef, PatchError> {
        Ok(self.units.get(unit.into())?.output())
    }

    /// A named input (audio or parameter) of `unit`.
    pub fn input(&self, unit: impl Into<UnitId>, port: &str) -> Result<PortRef, PatchError> {
        self.units.get(unit.into())?.input_port(port)
    }

    /// Validate and install a connection.
    pub fn connect(&mut self, source: PortRef, dest: PortRef) -> Result<(), PatchError> {
        let source_label = self.units.label(source)?;
        let dest_label = self.units.label(dest)?;
        let source_kind = self.units.get(source.unit)?.kind();

        let mismatch = |reason: &'static str| PatchError::TypeMismatch {
            source_port: source_label.clone(),
            source_kind: source.kind,
            dest_port: dest_label.clone(),
            dest_kind: dest.kind,
            reason,
        };

        if source.kind != PortKind::AudioOutput {
            return Err(mismatch("source must be an output"));
        }
        if !dest.kind.is_input() {
            return Err(mismatch("destination must be an input"));
        }
        if dest.kind == PortKind::ParameterInput && !source_kind.is_scaling_stage() {
            return Err(mismatch("only a modulation scaler may drive a parameter input"));
        }

        let connection = Connection { source, dest };
        if self.connections.contains(&connection) {
            debug!(from = %source_label, to = %dest_label, "duplicate connection ignored");
            return Ok(());
        }

        if dest.kind == PortKind::AudioInput && self.audio_path(dest.unit, source.unit) {
            return Err(PatchError::AudioRateCycle {
                source_port: source_label,
                dest_port: dest_label,
            });
        }

        debug!(from = %source_label, to = %dest_label, "connected");
        self.connections.push(connection);
        Ok(())
    }

    /// Is `to` reachable from `from` over audio edges alone?
    fn audio_path(&self, from: UnitId, to: UnitId) -> bool {
        let mut visited = vec![false; self.units.units.len()];
        let mut stack = vec![from];

        while let Some(unit) = stack.pop() {
            if unit == to {
                return true;
            }
            if std::mem::replace(&mut visited[unit.index], true) {
                continue;
            }
            stack.extend(
                self.connections
                    .iter()
                    .filter(|c| c.source.unit == unit && c.dest.kind == PortKind::AudioInput)
                    .map(|c| c.dest.unit),
            );
        }

        false
    }

    /// Seal the topology. The graph stays with the caller; the renderer goes
    /// to the audio thread.
    pub fn build(self) -> (PatchGraph, Renderer) {
        let wires: Vec<Wire> = self
            .connections
            .iter()
            .map(|c| Wire {
                source: c.source.unit.index,
                dest: c.dest.unit.index,
                kind: c.dest.kind,
                slot: c.dest.slot,
            })
            .collect();

        let renderer = Renderer::new(
            self.units.graph,
            self.clock.clone(),
            self.render_parts,
            &wires,
            self.destination.index,
        );

        let graph = PatchGraph {
            clock: self.clock,
            units: self.units,
            connections: self.connections,
            groups: self.groups,
            destination: self.destination,
        };

        (graph, renderer)
    }
}

/// Control-side view of a built patch.
pub struct PatchGraph {
    clock: RenderClock,
    units: UnitTable,
    connections: Vec<Connection>,
    groups: Vec<TriggerBroadcaster>,
    destination: UnitId,
}

impl PatchGraph {
    pub fn builder(clock: RenderClock) -> PatchGraphBuilder {
        PatchGraphBuilder::new(clock, PARAM_QUEUE_CAPACITY)
    }

    /// Builder whose units get parameter queues of `queue_capacity` events.
    pub fn builder_with_capacity(clock: RenderClock, queue_capacity: usize) -> PatchGraphBuilder {
        PatchGraphBuilder::new(clock, queue_capacity.max(1))
    }

    pub fn id(&self) -> GraphId {
        self.units.graph
    }

    pub fn clock(&self) -> &RenderClock {
        &self.clock
    }

    pub fn destination(&self) -> UnitId {
        self.destination
    }

    pub fn unit(&self, id: impl Into<UnitId>) -> Result<&SignalUnit, PatchError> {
        self.units.get(id.into())
    }

    pub fn unit_mut(&mut self, id: impl Into<UnitId>) -> Result<&mut SignalUnit, PatchError> {
        self.units.get_mut(id.into())
    }

    /// Look a unit up by name.
    pub fn find(&self, name: &str) -> Option<UnitId> {
        self.units.find(name)
    }

    pub fn set_parameter(
        &mut self,
        unit: impl Into<UnitId>,
        port: &str,
        value: f32,
        at: Option<f64>,
    ) -> Result<f64, PatchError> {
        let id = unit.into();
        let time = self.units.get_mut(id)?.set_parameter(port, value, at)?;
        if port == LEVEL {
            self.units.interrupt_ramp(id, time);
        }
        Ok(time)
    }

    pub fn envelope(&mut self, id: EnvelopeId) -> Result<EnvelopeGenerator<'_>, PatchError> {
        self.units.envelope(id)
    }

    pub fn envelope_state(&self, id: EnvelopeId) -> Result<EnvelopeState, PatchError> {
        Ok(self.units.shape(id)?.state(self.clock.now()))
    }

    pub fn decay_time(&self, id: EnvelopeId) -> Result<f32, PatchError> {
        Ok(self.units.shape(id)?.decay_time())
    }

    pub fn envelope_floor(&self, id: EnvelopeId) -> Result<f32, PatchError> {
        Ok(self.units.shape(id)?.floor())
    }

    pub fn scaler(&mut self, id: ScalerId) -> Result<ModulationScaler<'_>, PatchError> {
        self.units.scaler(id)
    }

    pub fn mixer(&mut self, id: MixerId) -> Result<Mixer<'_>, PatchError> {
        self.units.mixer(id)
    }

    /// Start every source unit that has not been started yet.
    pub fn start_sources(&mut self, at: Option<f64>) {
        for unit in self.units.units.iter_mut().filter(|u| u.kind().is_source()) {
            unit.start(at);
        }
    }

    pub fn stop_sources(&mut self, at: Option<f64>) {
        for unit in self.units.units.iter_mut().filter(|u| u.kind().is_source()) {
            unit.stop(at);
        }
    }

    pub fn trigger_group(&self, name: &str) -> Option<&TriggerBroadcaster> {
        self.groups.iter().find(|g| g.name() == name)
    }

    /// Fire the trigger group `name`. Returns the shared trigger time.
    pub fn fire(&mut self, name: &str, at: Option<f64>) -> Result<f64, PatchError> {
        let group = self
            .groups
            .iter()
            .find(|g| g.name() == name)
            .ok_or_else(|| PatchError::UnknownControl(name.to_string()))?;
        group.fire(&mut self.units, &self.clock, at)
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn topology(&self) -> TopologySnapshot {
        TopologySnapshot {
            units: self.units.summaries(),
            connections: self.connections.clone(),
            groups: self
                .groups
                .iter()
                .map(|g| (g.name().to_string(), g.envelopes().to_vec()))
                .collect(),
            destination: self.destination,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FREQ: ParamRange = ParamRange::new(1.0, 4_000.0);
    const UNIT: ParamRange = ParamRange::new(0.0, 1.0);

    fn builder() -> PatchGraphBuilder {
        PatchGraph::builder(RenderClock::new(48_000.0))
    }

    #[test]
    fn oscillator_cannot_drive_a_parameter_directly() {
        let mut b = builder();
        let a = b.add_oscillator("a", Waveform::Sine, FREQ, 722.0);
        let c = b.add_oscillator("c", Waveform::Sine, FREQ, 500.0);

        let err = b
            .connect(b.output(a).unwrap(), b.input(c, "frequency").unwrap())
            .unwrap_err();

        assert!(matches!(
            err,
            PatchError::TypeMismatch {
                source_kind: PortKind::AudioOutput,
                dest_kind: PortKind::ParameterInput,
                ..
            }
        ));
    }

    #[test]
    fn input_cannot_be_a_source() {
        let mut b = builder();
        let vca = b.add_gain("vca", UNIT, 1.0);
        let bus = b.add_bus("bus");

        let err = b
            .connect(b.input(vca, "in").unwrap(), b.input(bus, "in").unwrap())
            .unwrap_err();
        assert!(matches!(err, PatchError::TypeMismatch { .. }));
    }

    #[test]
    fn audio_only_loop_is_rejected() {
        let mut b = builder();
        let x = b.add_gain("x", UNIT, 1.0);
        let y = b.add_gain("y", UNIT, 1.0);

        b.connect(b.output(x).unwrap(), b.input(y, "in").unwrap())
            .unwrap();
        let err = b
            .connect(b.output(y).unwrap(), b.input(x, "in").unwrap())
            .unwrap_err();

        assert!(matches!(err, PatchError::AudioRateCycle { .. }));
        assert_eq!(b.connections.len(), 1);
    }

    #[test]
    fn audio_self_loop_is_rejected() {
        let mut b = builder();
        let x = b.add_gain("x", UNIT, 1.0);
        let err = b
            .connect(b.output(x).unwrap(), b.input(x, "in").unwrap())
            .unwrap_err();
        assert!(matches!(err, PatchError::AudioRateCycle { .. }));
    }

    #[test]
    fn loop_through_a_parameter_is_allowed() {
        let mut b = builder();
        let osc = b.add_oscillator("osc", Waveform::Sine, FREQ, 200.0);
        let dca = b.add_scaler("dca", 1_000.0, 50.0);

        b.connect(b.output(osc).unwrap(), b.input(dca, "in").unwrap())
            .unwrap();
        b.connect(b.output(dca).unwrap(), b.input(osc, "frequency").unwrap())
            .unwrap();

        let (graph, renderer) = b.build();
        assert_eq!(graph.connections().len(), 2);
        assert_eq!(renderer.processing_order().len(), 3);
    }

    #[test]
    fn units_of_another_graph_are_unknown() {
        let mut first = builder();
        let mut second = builder();
        let foreign = second.add_bus("foreign");
        let local = first.add_gain("local", UNIT, 1.0);

        let err = first
            .connect(first.output(local).unwrap(), second.input(foreign, "in").unwrap())
            .unwrap_err();
        assert!(matches!(err, PatchError::UnknownUnit(_)));
    }

    #[test]
    fn bogus_port_ref_is_port_not_found() {
        let mut b = builder();
        let vca = b.add_gain("vca", UNIT, 1.0);
        let bus = b.add_bus("bus");
        let bogus = PortRef {
            unit: bus,
            kind: PortKind::AudioInput,
            slot: 7,
        };

        let err = b.connect(b.output(vca).unwrap(), bogus).unwrap_err();
        assert!(matches!(err, PatchError::PortNotFound { .. }));
    }

    #[test]
    fn duplicate_connections_are_ignored() {
        let mut b = builder();
        let vca = b.add_gain("vca", UNIT, 1.0);
        let out = b.output(vca).unwrap();
        let dest = b.input(b.destination(), "in").unwrap();

        b.connect(out, dest).unwrap();
        b.connect(out, dest).unwrap();
        assert_eq!(b.connections.len(), 1);
    }

    #[test]
    fn connections_can_key_a_hash_set() {
        use std::collections::HashSet;

        let mut b = builder();
        let vca = b.add_gain("vca", UNIT, 1.0);
        b.connect(b.output(vca).unwrap(), b.input(b.destination(), "in").unwrap())
            .unwrap();
        let (graph, _renderer) = b.build();

        let edges = graph.connections().iter().chain(graph.connections());
        let unique: HashSet<Connection> = edges.copied().collect();
        assert_eq!(unique.len(), 1);
    }

    #[test]
    fn trigger_group_rejects_non_envelopes() {
        let mut b = builder();
        let bus = b.add_bus("bus");
        assert!(b
            .add_trigger_group("play", &[EnvelopeId(bus)])
            .is_err());
    }

    #[test]
    fn unknown_group_is_unknown_control() {
        let (mut graph, _renderer) = builder().build();
        assert!(matches!(
            graph.fire("nope", None),
            Err(PatchError::UnknownControl(_))
        ));
    }

    #[test]
    fn topology_lists_units_and_edges() {
        let mut b = builder();
        let osc = b.add_oscillator("osc", Waveform::Square, FREQ, 440.0);
        b.connect(b.output(osc).unwrap(), b.input(b.destination(), "in").unwrap())
            .unwrap();
        let (graph, _renderer) = b.build();

        let topology = graph.topology();
        assert_eq!(topology.units.len(), 2);
        assert_eq!(topology.unit("osc").unwrap().kind, UnitKind::Oscillator);
        assert_eq!(topology.connections_into(graph.destination()).count(), 1);
    }
}
