#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::PatchError;

/*
Parameter Automation
====================

A parameter is never mutated directly. Instead, every change is a point on a
timeline, and the renderer evaluates that timeline at the time of every
sample it produces. This keeps the render clock authoritative: a change
scheduled for t = 1.25 s lands on sample 60 000 at 48 kHz, no matter when the
control thread happened to send it.

Vocabulary
----------

  held value   What the parameter outputs before the first pending point.
               Starts as the parameter's default (base) value.

  step         A point that jumps to its value at its time and holds.

  exp ramp     A point whose value is reached AT its time, approached
               exponentially from the previous point.

  cancel       Remove every point at or after a time. Points already passed
               have been folded into the held value and are unaffected.


The Exponential Curve
---------------------

Between a previous point (t0, v0) and an exponential point (t1, v1):

    v(t) = v0 · (v1 / v0) ^ ((t - t0) / (t1 - t0))

This is a straight line in the log domain, which is how loudness and pitch
are perceived, so decays sound even rather than front-loaded.

  Level
    1.0 ┐╲
        │ ╲
        │  ╲_
        │    ╲__
        │       ╲____
    ε   └────────────╲_______→ Time
        t0                t1

The formula needs v0 and v1 to be non-zero and share a sign. Ramping to 0.0
would need log(0), which is why every envelope decays to a small positive
floor (ε) instead. If v0 is not positive the curve holds v0 until t1.


Folding the Past
----------------

Once a point's time has passed, everything before it is irrelevant for any
future sample: the value at or after that point depends only on the point
itself and what follows. `prune` therefore folds elapsed points into the held
value, keeping the timeline short without changing a single future sample.
*/

/// What a scheduled automation event does.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutomationKind {
    SetImmediate,
    RampTo,
    CancelPending,
}

/// How the value approaches an event's target.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Curve {
    Step,
    Exponential,
}

/// One scheduled change against the render clock.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutomationEvent {
    pub kind: AutomationKind,
    pub value: f32,
    pub time: f64,
    pub curve: Curve,
}

impl AutomationEvent {
    pub fn set(value: f32, time: f64) -> Self {
        Self {
            kind: AutomationKind::SetImmediate,
            value,
            time,
            curve: Curve::Step,
        }
    }

    pub fn exponential_ramp(value: f32, time: f64) -> Self {
        Self {
            kind: AutomationKind::RampTo,
            value,
            time,
            curve: Curve::Exponential,
        }
    }

    pub fn cancel(time: f64) -> Self {
        Self {
            kind: AutomationKind::CancelPending,
            value: 0.0,
            time,
            curve: Curve::Step,
        }
    }
}

/// Sorted automation points for a single parameter.
#[derive(Debug, Clone)]
pub struct AutomationTimeline {
    held: f32,
    held_since: f64,
    events: Vec<AutomationEvent>,
}

impl AutomationTimeline {
    pub fn new(default_value: f32) -> Self {
        Self::with_capacity(default_value, 0)
    }

    /// Pre-allocate so the render thread does not grow the buffer mid-stream.
    pub fn with_capacity(default_value: f32, capacity: usize) -> Self {
        Self {
            held: default_value,
            held_since: 0.0,
            events: Vec::with_capacity(capacity),
        }
    }

    /// Pending points, in time order. Never contains cancel events.
    pub fn events(&self) -> &[AutomationEvent] {
        &self.events
    }

    /// Apply an already-validated event.
    pub fn apply(&mut self, event: AutomationEvent) {
        match event.kind {
            AutomationKind::CancelPending => self.cancel_scheduled_values(event.time),
            AutomationKind::SetImmediate | AutomationKind::RampTo => self.insert(event),
        }
    }

    pub fn set_value_at_time(&mut self, value: f32, time: f64) {
        self.insert(AutomationEvent::set(value, time));
    }

    /// Schedule an exponential approach to `value`, reached at `time`.
    pub fn exponential_ramp_to_value_at_time(
        &mut self,
        value: f32,
        time: f64,
    ) -> Result<(), PatchError> {
        if !(value > 0.0 && value.is_finite()) {
            return Err(PatchError::invalid_automation(format!(
                "exponential ramp target must be positive, got {value}"
            )));
        }

        self.insert(AutomationEvent::exponential_ramp(value, time));
        Ok(())
    }

    /// Remove every pending point at or after `time`.
    pub fn cancel_scheduled_values(&mut self, time: f64) {
        self.events.retain(|e| e.time < time);
    }

    fn insert(&mut self, event: AutomationEvent) {
        // Equal times keep scheduling order: a step then a ramp at the same
        // instant must stay in that order.
        let index = self.events.partition_point(|e| e.time <= event.time);
        self.events.insert(index, event);
    }

    /// Evaluate the timeline at `time` seconds.
    pub fn value_at(&self, time: f64) -> f32 {
        let index = self.events.partition_point(|e| e.time <= time);

        let (t0, v0) = match index {
            0 => (self.held_since, self.held),
            i => (self.events[i - 1].time, self.events[i - 1].value),
        };

        match self.events.get(index) {
            Some(next) if next.curve == Curve::Exponential => {
                exponential_between(t0, v0, next.time, next.value, time)
            }
            _ => v0,
        }
    }

    /// Fill `out` with per-sample values for a block starting at `start_frame`.
    pub fn render(&self, out: &mut [f32], start_frame: u64, sample_rate: f32) {
        if self.events.is_empty() {
            out.fill(self.held);
            return;
        }

        let sr = sample_rate as f64;
        for (i, o) in out.iter_mut().enumerate() {
            *o = self.value_at((start_frame + i as u64) as f64 / sr);
        }
    }

    /// Fold points strictly before `now` into the held value.
    pub fn prune(&mut self, now: f64) {
        let elapsed = self.events.partition_point(|e| e.time < now);
        if elapsed == 0 {
            return;
        }

        let last = self.events[elapsed - 1];
        self.held = last.value;
        self.held_since = last.time;
        self.events.drain(..elapsed);
    }
}

#[inline]
fn exponential_between(t0: f64, v0: f32, t1: f64, v1: f32, t: f64) -> f32 {
    // Opposite signs or a zero start have no exponential path: hold v0.
    if v0 <= 0.0 || v1 <= 0.0 || t1 <= t0 {
        return v0;
    }

    let progress = ((t - t0) / (t1 - t0)).clamp(0.0, 1.0);
    let ratio = v1 as f64 / v0 as f64;
    (v0 as f64 * ratio.powf(progress)) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn holds_default_without_events() {
        let timeline = AutomationTimeline::new(0.5);
        assert_eq!(timeline.value_at(0.0), 0.5);
        assert_eq!(timeline.value_at(10.0), 0.5);
    }

    #[test]
    fn step_lands_exactly_on_its_time() {
        let mut timeline = AutomationTimeline::new(0.0);
        timeline.set_value_at_time(1.0, 0.5);

        assert_eq!(timeline.value_at(0.4999), 0.0);
        assert_eq!(timeline.value_at(0.5), 1.0);
        assert_eq!(timeline.value_at(3.0), 1.0);
    }

    #[test]
    fn exponential_ramp_is_geometric() {
        let mut timeline = AutomationTimeline::new(0.0);
        timeline.set_value_at_time(1.0, 0.0);
        timeline
            .exponential_ramp_to_value_at_time(0.01, 1.0)
            .unwrap();

        // Halfway in time is the geometric mean: sqrt(1 × 0.01) = 0.1
        assert!((timeline.value_at(0.5) - 0.1).abs() < 1e-5);
        assert!((timeline.value_at(1.0) - 0.01).abs() < 1e-7);
        assert!((timeline.value_at(2.0) - 0.01).abs() < 1e-7);
    }

    #[test]
    fn ramp_to_zero_is_rejected() {
        let mut timeline = AutomationTimeline::new(1.0);
        let err = timeline.exponential_ramp_to_value_at_time(0.0, 1.0);
        assert!(matches!(err, Err(PatchError::InvalidAutomationConfig(_))));
        assert!(timeline.events().is_empty());
    }

    #[test]
    fn cancel_removes_pending_points_only() {
        let mut timeline = AutomationTimeline::new(0.0);
        timeline.set_value_at_time(1.0, 0.0);
        timeline
            .exponential_ramp_to_value_at_time(0.001, 1.0)
            .unwrap();

        timeline.cancel_scheduled_values(0.5);

        assert_eq!(timeline.events().len(), 1);
        assert_eq!(timeline.value_at(0.75), 1.0, "ramp removed, step holds");
    }

    #[test]
    fn prune_is_lossless_for_future_samples() {
        let mut timeline = AutomationTimeline::new(0.0);
        timeline.set_value_at_time(1.0, 0.0);
        timeline.set_value_at_time(0.5, 0.1);
        timeline
            .exponential_ramp_to_value_at_time(0.005, 1.1)
            .unwrap();

        let times = [0.2, 0.6, 1.0, 1.5];
        let before: Vec<f32> = times.iter().map(|&t| timeline.value_at(t)).collect();

        timeline.prune(0.2);

        let after: Vec<f32> = times.iter().map(|&t| timeline.value_at(t)).collect();
        assert_eq!(timeline.events().len(), 1);
        assert_eq!(before, after);
    }

    #[test]
    fn render_samples_each_frame() {
        let mut timeline = AutomationTimeline::new(0.0);
        timeline.set_value_at_time(1.0, 0.002);

        let mut out = [0.0; 4];
        timeline.render(&mut out, 0, 1_000.0);

        assert_eq!(out, [0.0, 0.0, 1.0, 1.0]);
    }
}
