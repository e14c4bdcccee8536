//! The control-side patch: typed signal units, the connections between them,
//! and the envelopes and trigger groups that give the patch its gestures.
//!
//! Nothing in this module produces audio. Every change a unit accepts becomes
//! a scheduled automation event that the [`Renderer`](crate::engine::Renderer)
//! picks up at its next block.

/// Depth scaling stage between a modulator and a parameter input.
pub mod dca;
/// Exponential decay envelopes and their state.
pub mod envelope;
/// N-channel normalized mixer.
pub mod mix;
/// Ports, port kinds and unit identities.
pub mod node;
/// Graph builder, connection rules and topology snapshots.
pub mod patch;
/// Fan-out of one trigger to many envelopes.
pub mod trigger;
/// Signal units and their templates.
pub mod unit;

pub use dca::{ModulationScaler, ScalerId};
pub use envelope::{EnvelopeGenerator, EnvelopeId, EnvelopeState};
pub use mix::{Mixer, MixerId};
pub use node::{GraphId, ParamRange, Port, PortKind, PortRef, UnitId, UnitKind};
pub use patch::{Connection, PatchGraph, PatchGraphBuilder, TopologySnapshot, UnitSummary};
pub use trigger::TriggerBroadcaster;
pub use unit::{SignalUnit, SourceState, UnitTemplate};
