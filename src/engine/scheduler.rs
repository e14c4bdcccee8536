use rtrb::{Consumer, Producer, RingBuffer};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::{
    engine::{
        automation::{AutomationEvent, AutomationTimeline},
        clock::RenderClock,
    },
    PatchError,
};

/*
Automation Scheduler
====================

Every externally observable "set X" is the same three steps:

  1. Resolve a time: the caller's explicit timestamp, or the render clock's
     current time when none is given. Explicit timestamps let several units
     change in lock-step (one trigger, many envelopes).

  2. Cancel every point already scheduled at or after that time. There is at
     most one active ramp per parameter; the newest request wins.

  3. Enqueue the new point(s).

A request is queued whole or not at all. When the ring cannot take every
point of it, nothing is scheduled on either side and the caller gets
`QueueFull`, so the mirror never runs ahead of the renderer.

Values outside a parameter's range are clamped before they are scheduled.
That is a recoverable condition (a slider can never send an illegal value),
whereas a non-positive ramp floor or duration is a programming error.


Threading
---------

The control thread owns a `ParamHandle`; the render thread owns the matching
`ParamTimeline`. They share nothing but a single-producer/single-consumer ring
buffer, so neither side ever waits on the other and two different parameters
never contend.

  control thread                          render thread
  ──────────────                          ─────────────
  ParamHandle::set_value ──▶ [rtrb] ──▶ ParamTimeline::drain (block start)
        │                                        │
        └─ mirror timeline                       └─ evaluated per sample

The handle also keeps a mirror of what it scheduled, so the control side can
answer "what is scheduled on this parameter?" without asking the renderer.
*/

/// Events per parameter that may be in flight before the renderer drains them.
pub const PARAM_QUEUE_CAPACITY: usize = 256;

/// Inclusive valid range of a parameter input.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamRange {
    pub min: f32,
    pub max: f32,
}

impl ParamRange {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Clamp into range. NaN maps to the minimum.
    pub fn clamp(&self, value: f32) -> f32 {
        if value.is_nan() {
            return self.min;
        }
        value.clamp(self.min, self.max)
    }

    pub fn contains(&self, value: f32) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

/// Control-side handle for one parameter input.
pub struct ParamHandle {
    name: String,
    range: ParamRange,
    default_value: f32,
    clock: RenderClock,
    mirror: AutomationTimeline,
    tx: Producer<AutomationEvent>,
}

/// Render-side timeline fed by a `ParamHandle`.
pub struct ParamTimeline {
    timeline: AutomationTimeline,
    rx: Consumer<AutomationEvent>,
}

impl ParamHandle {
    pub fn new(
        name: impl Into<String>,
        range: ParamRange,
        default_value: f32,
        clock: RenderClock,
        capacity: usize,
    ) -> (Self, ParamTimeline) {
        let default_value = range.clamp(default_value);
        let (tx, rx) = RingBuffer::<AutomationEvent>::new(capacity);

        let handle = Self {
            name: name.into(),
            range,
            default_value,
            clock,
            mirror: AutomationTimeline::new(default_value),
            tx,
        };
        let timeline = ParamTimeline {
            timeline: AutomationTimeline::with_capacity(default_value, capacity),
            rx,
        };

        (handle, timeline)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn range(&self) -> ParamRange {
        self.range
    }

    /// Base value the parameter holds before any automation.
    pub fn default_value(&self) -> f32 {
        self.default_value
    }

    /// Points this handle has scheduled that the render clock has not passed.
    pub fn events(&self) -> &[AutomationEvent] {
        self.mirror.events()
    }

    /// Scheduled (unmodulated) value at `time`.
    pub fn value_at(&self, time: f64) -> f32 {
        self.mirror.value_at(time)
    }

    /// Scheduled value right now.
    pub fn current_value(&self) -> f32 {
        self.mirror.value_at(self.clock.now())
    }

    /// Explicit timestamps are taken as-is (never before zero); `None` reads
    /// the render clock.
    pub fn resolve_time(&self, at: Option<f64>) -> f64 {
        match at {
            Some(time) => time.max(0.0),
            None => self.clock.now(),
        }
    }

    /// Step change: clamp → cancel at `t` → set at `t`. Returns `t`.
    pub fn set_value(&mut self, value: f32, at: Option<f64>) -> Result<f64, PatchError> {
        let time = self.resolve_time(at);
        let clamped = self.clamp(value);

        self.schedule(&[
            AutomationEvent::cancel(time),
            AutomationEvent::set(clamped, time),
        ])?;

        trace!(param = %self.name, value = clamped, time, "scheduled step");
        Ok(time)
    }

    /// Decay gesture: cancel → jump to `peak` at `t` → exponential ramp to
    /// `floor`, reached at `t + duration` rounded to whole frames. Returns `t`.
    pub fn schedule_decay(
        &mut self,
        peak: f32,
        floor: f32,
        at: Option<f64>,
        duration: f32,
    ) -> Result<f64, PatchError> {
        if !(floor > 0.0 && floor.is_finite()) {
            return Err(PatchError::invalid_automation(format!(
                "ramp floor on '{}' must be positive, got {floor}",
                self.name
            )));
        }
        if !(duration > 0.0 && duration.is_finite()) {
            return Err(PatchError::invalid_automation(format!(
                "ramp duration on '{}' must be positive, got {duration}",
                self.name
            )));
        }

        let time = self.resolve_time(at);
        let peak = self.clamp(peak);
        let floor = self.clamp(floor);
        if floor <= 0.0 {
            return Err(PatchError::invalid_automation(format!(
                "range of '{}' clamps the ramp floor to {floor}",
                self.name
            )));
        }

        let end = time + self.frame_aligned(duration);
        self.schedule(&[
            AutomationEvent::cancel(time),
            AutomationEvent::set(peak, time),
            AutomationEvent::exponential_ramp(floor, end),
        ])?;

        trace!(param = %self.name, peak, floor, time, end, "scheduled decay");
        Ok(time)
    }

    /// `seconds` rounded to a whole number of render frames, at least one.
    pub fn frame_aligned(&self, seconds: f32) -> f64 {
        let sample_rate = self.clock.sample_rate() as f64;
        (seconds as f64 * sample_rate).round().max(1.0) / sample_rate
    }

    fn clamp(&self, value: f32) -> f32 {
        let clamped = self.range.clamp(value);
        if clamped != value {
            trace!(
                param = %self.name,
                requested = value,
                clamped,
                "value outside range, clamped"
            );
        }
        clamped
    }

    /// Queue every point of one request, or none of them.
    fn schedule(&mut self, gesture: &[AutomationEvent]) -> Result<(), PatchError> {
        let free = self.tx.slots();
        if free < gesture.len() {
            warn!(
                param = %self.name,
                needed = gesture.len(),
                free,
                "automation queue full, request rejected"
            );
            return Err(PatchError::QueueFull {
                param: self.name.clone(),
                needed: gesture.len(),
                free,
            });
        }

        self.mirror.prune(self.clock.now());
        for &event in gesture {
            self.mirror.apply(event);
            let pushed = self.tx.push(event);
            debug_assert!(pushed.is_ok(), "slots were reserved for the whole request");
        }
        Ok(())
    }
}

impl ParamTimeline {
    /// Apply everything the control thread sent since the last block.
    pub fn drain(&mut self) {
        while let Ok(event) = self.rx.pop() {
            self.timeline.apply(event);
        }
    }

    pub fn render(&self, out: &mut [f32], start_frame: u64, sample_rate: f32) {
        self.timeline.render(out, start_frame, sample_rate);
    }

    pub fn prune(&mut self, now: f64) {
        self.timeline.prune(now);
    }

    pub fn timeline(&self) -> &AutomationTimeline {
        &self.timeline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::automation::{AutomationKind, Curve};

    fn handle(range: ParamRange, default: f32) -> (ParamHandle, ParamTimeline) {
        ParamHandle::new("gain", range, default, RenderClock::new(48_000.0), 16)
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let (mut param, _) = handle(ParamRange::new(0.0, 1.0), 0.2);

        param.set_value(3.5, Some(0.0)).unwrap();
        assert_eq!(param.events()[0].value, 1.0);

        param.set_value(-2.0, Some(0.0)).unwrap();
        assert_eq!(param.events().len(), 1, "newest step replaces the old one");
        assert_eq!(param.events()[0].value, 0.0);
    }

    #[test]
    fn default_value_is_clamped_into_range() {
        let (param, _) = handle(ParamRange::new(1.0, 4_000.0), 0.0);
        assert_eq!(param.default_value(), 1.0);
    }

    #[test]
    fn decay_schedules_peak_then_floor() {
        let (mut param, _) = handle(ParamRange::new(1e-4, 1.0), 1e-4);

        let t = param.schedule_decay(1.0, 1e-4, Some(0.5), 0.25).unwrap();

        assert_eq!(t, 0.5);
        let events = param.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, AutomationKind::SetImmediate);
        assert_eq!((events[0].value, events[0].time), (1.0, 0.5));
        assert_eq!(events[1].curve, Curve::Exponential);
        assert_eq!((events[1].value, events[1].time), (1e-4, 0.75));
    }

    #[test]
    fn non_positive_ramp_config_is_fatal() {
        let (mut param, _) = handle(ParamRange::new(0.0, 1.0), 0.0);

        assert!(param.schedule_decay(1.0, 0.0, None, 1.0).is_err());
        assert!(param.schedule_decay(1.0, 0.01, None, 0.0).is_err());
        assert!(param.schedule_decay(1.0, 0.01, None, -1.0).is_err());
        assert!(param.events().is_empty());
    }

    #[test]
    fn render_side_sees_the_same_schedule() {
        let (mut param, mut timeline) = handle(ParamRange::new(0.0, 1.0), 0.0);

        param.set_value(0.75, Some(0.0)).unwrap();
        timeline.drain();

        assert_eq!(timeline.timeline().events(), param.events());
        let mut out = [0.0; 8];
        timeline.render(&mut out, 0, 48_000.0);
        assert!(out.iter().all(|&v| v == 0.75));
    }

    #[test]
    fn full_queue_rejects_whole_requests() {
        let (mut param, mut timeline) = handle(ParamRange::new(0.0, 1.0), 0.0);

        // 2 events per step, capacity 16: the ninth step does not fit
        let accepted = (0..20)
            .map(|i| param.set_value(i as f32 / 20.0, Some(i as f64)))
            .take_while(Result::is_ok)
            .count();
        assert_eq!(accepted, 8);

        // a full ring takes neither a step nor a decay
        param.set_value(0.5, Some(30.0)).unwrap_err();
        let err = param.schedule_decay(1.0, 0.01, Some(40.0), 1.0).unwrap_err();
        assert!(matches!(err, PatchError::QueueFull { needed: 3, .. }));

        timeline.drain();
        assert_eq!(timeline.timeline().events(), param.events());
    }

    #[test]
    fn decay_end_lands_on_a_frame() {
        let (param, _) = ParamHandle::new(
            "env.level",
            ParamRange::new(1e-4, 1.0),
            1e-4,
            RenderClock::new(1_000.0),
            8,
        );

        assert_eq!(param.frame_aligned(0.1), 0.1);
        assert_eq!(param.frame_aligned(0.8), 0.8);
        assert_eq!(param.frame_aligned(0.0001), 0.001);
    }
}
