#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

pub use crate::engine::scheduler::ParamRange;

/// Identity of one patch graph; unit ids are only meaningful inside it.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GraphId(u64);

impl GraphId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        GraphId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Handle to a unit registered in a patch graph.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnitId {
    pub(crate) graph: GraphId,
    pub(crate) index: usize,
}

impl UnitId {
    pub fn index(&self) -> usize {
        self.index
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}@graph{}", self.index, self.graph.0)
    }
}

/// Direction and rate of a port.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortKind {
    AudioOutput,
    AudioInput,
    ParameterInput,
}

impl PortKind {
    pub fn is_input(self) -> bool {
        !matches!(self, PortKind::AudioOutput)
    }
}

/// A typed connection point on a unit.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Port {
    pub name: String,
    pub kind: PortKind,
    /// Valid range of a parameter input; `None` for audio ports.
    pub range: Option<ParamRange>,
    /// Base value of a parameter input.
    pub default_value: Option<f32>,
    /// Position among ports of the same kind on this unit.
    pub slot: usize,
}

impl Port {
    pub fn audio_output(name: impl Into<String>, slot: usize) -> Self {
        Self {
            name: name.into(),
            kind: PortKind::AudioOutput,
            range: None,
            default_value: None,
            slot,
        }
    }

    pub fn audio_input(name: impl Into<String>, slot: usize) -> Self {
        Self {
            name: name.into(),
            kind: PortKind::AudioInput,
            range: None,
            default_value: None,
            slot,
        }
    }

    pub fn parameter(
        name: impl Into<String>,
        slot: usize,
        range: ParamRange,
        default: f32,
    ) -> Self {
        Self {
            name: name.into(),
            kind: PortKind::ParameterInput,
            range: Some(range),
            default_value: Some(range.clamp(default)),
            slot,
        }
    }
}

/// A resolved port: which unit, which port, and what kind.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortRef {
    pub unit: UnitId,
    pub kind: PortKind,
    pub slot: usize,
}

/// What a unit does; decides its ports and its render processor.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    /// Audio-rate source with a `frequency` parameter.
    Oscillator,
    /// VCA: `in × gain`.
    Gain,
    /// Source emitting its `offset` parameter.
    Constant,
    /// Summing bus; the patch output is one of these.
    Bus,
    /// Exponential-decay envelope (shaper or control source).
    Envelope,
    /// DCA: scales a signal into a parameter's numeric range.
    Scaler,
    /// N-channel normalized mixer.
    Mixer,
}

impl UnitKind {
    /// Sources are the only units with start/stop semantics.
    pub fn is_source(self) -> bool {
        matches!(self, UnitKind::Oscillator | UnitKind::Constant)
    }

    /// Only a scaling stage may drive a parameter input.
    pub fn is_scaling_stage(self) -> bool {
        matches!(self, UnitKind::Scaler)
    }
}
