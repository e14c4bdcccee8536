//! Control-surface events and the table that routes them into a patch.
//!
//! A control surface (sliders, buttons, a terminal UI, a test) never touches
//! units directly. It emits [`ControlEvent`]s naming a unit and a parameter,
//! and a [`ControlMap`] decides what that name means in the patch: a plain
//! parameter step, a decay time, an operator's combined gain, and so on.

use std::collections::HashMap;

use tracing::debug;

use crate::{
    dsp::oscillator::Waveform,
    graph::{EnvelopeId, MixerId, PatchGraph, ScalerId, UnitId},
    PatchError,
};

/// Something the user did.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlEvent {
    ParameterChanged {
        unit: String,
        param: String,
        value: f32,
    },
    TriggerFired {
        group: String,
    },
    WaveformChanged {
        unit: String,
        waveform: Waveform,
    },
    /// Suspend a running transport, or resume a suspended one.
    TransportToggled,
}

impl ControlEvent {
    pub fn parameter(unit: impl Into<String>, param: impl Into<String>, value: f32) -> Self {
        ControlEvent::ParameterChanged {
            unit: unit.into(),
            param: param.into(),
            value,
        }
    }

    pub fn trigger(group: impl Into<String>) -> Self {
        ControlEvent::TriggerFired {
            group: group.into(),
        }
    }

    pub fn waveform(unit: impl Into<String>, waveform: Waveform) -> Self {
        ControlEvent::WaveformChanged {
            unit: unit.into(),
            waveform,
        }
    }
}

/// What a named control does to the patch.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlBinding {
    /// Step a unit's parameter input.
    Parameter { unit: UnitId, param: String },
    /// Decay time for the next trigger of each envelope.
    DecayTime(Vec<EnvelopeId>),
    /// Modulation depth of a scaler.
    Depth(ScalerId),
    /// Level of one mixer channel.
    Level { mixer: MixerId, channel: usize },
    /// One gain for an operator: `vca.gain = g`, `dca.gain = g × scale`.
    OperatorGain {
        vca: UnitId,
        dca: ScalerId,
        scale: f32,
    },
    /// Oscillator shape.
    Waveform(UnitId),
}

/// Explicit name → binding table, built once per patch.
#[derive(Debug, Clone, Default)]
pub struct ControlMap {
    bindings: HashMap<String, HashMap<String, ControlBinding>>,
    triggers: HashMap<String, String>,
}

impl ControlMap {
    pub fn builder() -> ControlMapBuilder {
        ControlMapBuilder::default()
    }

    pub fn binding(&self, unit: &str, param: &str) -> Option<&ControlBinding> {
        self.bindings.get(unit)?.get(param)
    }

    /// Control names bound under `unit`.
    pub fn params(&self, unit: &str) -> impl Iterator<Item = &str> {
        self.bindings
            .get(unit)
            .into_iter()
            .flat_map(|params| params.keys().map(String::as_str))
    }

    /// Route one event into `graph`. Returns the scheduled time for events
    /// that schedule automation.
    pub fn dispatch(
        &self,
        graph: &mut PatchGraph,
        event: &ControlEvent,
    ) -> Result<Option<f64>, PatchError> {
        debug!(?event, "control event");

        match event {
            ControlEvent::ParameterChanged { unit, param, value } => {
                let binding = self
                    .binding(unit, param)
                    .ok_or_else(|| PatchError::UnknownControl(format!("{unit}.{param}")))?;
                apply(graph, binding, *value).map(Some)
            }
            ControlEvent::TriggerFired { group } => {
                let target = self
                    .triggers
                    .get(group)
                    .ok_or_else(|| PatchError::UnknownControl(group.clone()))?;
                graph.fire(target, None).map(Some)
            }
            ControlEvent::WaveformChanged { unit, waveform } => {
                match self.binding(unit, "waveform") {
                    Some(ControlBinding::Waveform(osc)) => {
                        graph.unit_mut(*osc)?.set_waveform(*waveform);
                        Ok(None)
                    }
                    _ => Err(PatchError::UnknownControl(format!("{unit}.waveform"))),
                }
            }
            ControlEvent::TransportToggled => {
                let suspended = graph.clock().toggle();
                debug!(suspended, "transport toggled");
                Ok(None)
            }
        }
    }
}

fn apply(graph: &mut PatchGraph, binding: &ControlBinding, value: f32) -> Result<f64, PatchError> {
    match binding {
        ControlBinding::Parameter { unit, param } => graph.set_parameter(*unit, param, value, None),
        ControlBinding::DecayTime(envelopes) => {
            for &envelope in envelopes {
                graph.envelope(envelope)?.set_decay_time(value);
            }
            Ok(graph.clock().now())
        }
        ControlBinding::Depth(dca) => graph.scaler(*dca)?.set_gain(value),
        ControlBinding::Level { mixer, channel } => graph.mixer(*mixer)?.set_level(*channel, value),
        ControlBinding::OperatorGain { vca, dca, scale } => {
            let gain = graph.unit(*vca)?.param("gain")?.range().clamp(value);
            let time = graph.set_parameter(*vca, "gain", gain, None)?;
            graph.scaler(*dca)?.set_gain_at(gain * scale, time)?;
            Ok(time)
        }
        ControlBinding::Waveform(_) => Err(PatchError::UnknownControl(
            "waveform takes a WaveformChanged event".into(),
        )),
    }
}

/// Consuming builder for a [`ControlMap`].
#[derive(Debug, Default)]
pub struct ControlMapBuilder {
    map: ControlMap,
}

impl ControlMapBuilder {
    /// Bind `unit.param` to `binding`, replacing any earlier binding.
    pub fn bind(
        mut self,
        unit: impl Into<String>,
        param: impl Into<String>,
        binding: ControlBinding,
    ) -> Self {
        self.map
            .bindings
            .entry(unit.into())
            .or_default()
            .insert(param.into(), binding);
        self
    }

    /// Route `TriggerFired { group: name }` to the graph's trigger group `group`.
    pub fn trigger(mut self, name: impl Into<String>, group: impl Into<String>) -> Self {
        self.map.triggers.insert(name.into(), group.into());
        self
    }

    pub fn build(self) -> ControlMap {
        self.map
    }
}
