use tracing::debug;

use crate::{
    engine::scheduler::{ParamHandle, ParamRange},
    graph::node::UnitId,
    PatchError,
};

/*
Decay Envelope
==============

A one-shot envelope: every trigger jumps the level to full scale and lets it
fall back, exponentially, to a small positive floor.

  Level
    1.0 ┐  ╲                    ╲
        │   ╲                    ╲
        │    ╲_                   ╲_
        │      ╲__                  ╲__
    ε   └─────────╲_________──────────╲_________→ Time
           ▲ trigger             ▲ retrigger
           │◀───── decay ──────▶ │

States
------

  Idle      level holds the floor ε (nothing scheduled, or the ramp is over)
  Decaying  level is on the ramp from 1.0 to ε

Triggering during a decay restarts from 1.0: the pending ramp is cancelled at
the trigger time and a fresh one is scheduled. The cancel time is always the
trigger time. Passing the decay time there would leave the old ramp running
until the new trigger is long over.

The floor is never zero, because an exponential curve cannot reach zero.

Shaper or source
----------------

With something wired into its `in` port, the envelope outputs `in × level`
(a VCA driven by its own contour). With nothing connected it outputs the
level itself, usable as a plain control signal.
*/

/// Level every trigger starts from.
pub const PEAK_LEVEL: f32 = 1.0;

/// Name of the envelope's level parameter.
pub const LEVEL: &str = "level";

/// Handle to an envelope unit in a patch graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnvelopeId(pub(crate) UnitId);

impl EnvelopeId {
    pub fn unit(self) -> UnitId {
        self.0
    }
}

impl From<EnvelopeId> for UnitId {
    fn from(id: EnvelopeId) -> Self {
        id.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeState {
    Idle,
    Decaying,
}

/// Per-envelope settings and ramp bookkeeping, owned by the patch graph.
#[derive(Debug, Clone)]
pub(crate) struct DecayShape {
    floor: f32,
    decay: f32,
    decay_range: ParamRange,
    /// Start and end of the last scheduled ramp.
    ramp: Option<(f64, f64)>,
}

impl DecayShape {
    pub(crate) fn new(floor: f32, decay: f32, decay_range: ParamRange) -> Result<Self, PatchError> {
        if !(floor > 0.0 && floor < PEAK_LEVEL) {
            return Err(PatchError::invalid_automation(format!(
                "envelope floor must be in (0, {PEAK_LEVEL}), got {floor}"
            )));
        }
        if !(decay_range.min > 0.0 && decay_range.min <= decay_range.max) {
            return Err(PatchError::invalid_automation(format!(
                "decay range must be positive and ordered, got [{}, {}]",
                decay_range.min, decay_range.max
            )));
        }

        Ok(Self {
            floor,
            decay: decay_range.clamp(decay),
            decay_range,
            ramp: None,
        })
    }

    pub(crate) fn floor(&self) -> f32 {
        self.floor
    }

    pub(crate) fn state(&self, now: f64) -> EnvelopeState {
        match self.ramp {
            Some((start, end)) if start <= now && now < end => EnvelopeState::Decaying,
            _ => EnvelopeState::Idle,
        }
    }

    /// A direct step on the level at `at` cancels the ramp from `at` on.
    pub(crate) fn interrupt(&mut self, at: f64) {
        self.ramp = match self.ramp {
            Some((start, end)) if start < at => Some((start, end.min(at))),
            _ => None,
        };
    }

    pub(crate) fn decay_time(&self) -> f32 {
        self.decay
    }
}

/// Mutable view of one envelope: its settings plus its `level` parameter.
pub struct EnvelopeGenerator<'a> {
    id: EnvelopeId,
    shape: &'a mut DecayShape,
    level: &'a mut ParamHandle,
}

impl<'a> EnvelopeGenerator<'a> {
    pub(crate) fn new(
        id: EnvelopeId,
        shape: &'a mut DecayShape,
        level: &'a mut ParamHandle,
    ) -> Self {
        Self { id, shape, level }
    }

    pub fn id(&self) -> EnvelopeId {
        self.id
    }

    pub fn floor(&self) -> f32 {
        self.shape.floor
    }

    pub fn decay_time(&self) -> f32 {
        self.shape.decay
    }

    pub fn decay_range(&self) -> ParamRange {
        self.shape.decay_range
    }

    pub fn level(&self) -> &ParamHandle {
        self.level
    }

    pub fn state(&self) -> EnvelopeState {
        self.shape.state(self.level.resolve_time(None))
    }

    /// Set the decay for subsequent triggers, clamped to the decay range.
    /// A decay already in progress keeps its original length.
    pub fn set_decay_time(&mut self, seconds: f32) -> f32 {
        let clamped = self.shape.decay_range.clamp(seconds);
        debug!(envelope = %self.id.0, requested = seconds, decay = clamped, "decay time");
        self.shape.decay = clamped;
        clamped
    }

    /// Cancel at `at`, jump to the peak at `at`, ramp to the floor by
    /// `at + decay`. Returns the trigger time.
    pub fn trigger(&mut self, at: Option<f64>) -> Result<f64, PatchError> {
        let time = self.level.resolve_time(at);
        let decay = self.shape.decay;

        self.level
            .schedule_decay(PEAK_LEVEL, self.shape.floor, Some(time), decay)?;
        self.shape.ramp = Some((time, time + self.level.frame_aligned(decay)));

        Ok(time)
    }
}
