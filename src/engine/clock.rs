use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};

/// Monotonic render clock shared by the control thread and the renderer.
///
/// The renderer is the only writer: it advances the frame count after every
/// block. Control code only reads it to timestamp scheduling requests. The
/// same handle carries the global suspend/resume flag.
#[derive(Clone, Debug)]
pub struct RenderClock {
    frames: Arc<AtomicU64>,
    suspended: Arc<AtomicBool>,
    sample_rate: f32,
}

impl RenderClock {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            frames: Arc::new(AtomicU64::new(0)),
            suspended: Arc::new(AtomicBool::new(false)),
            sample_rate,
        }
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Frames rendered so far.
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    /// Current render time in seconds.
    pub fn now(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    pub(crate) fn advance(&self, frames: usize) {
        self.frames.fetch_add(frames as u64, Ordering::AcqRel);
    }

    /// Freeze rendering: the renderer outputs silence and the clock stops.
    pub fn suspend(&self) {
        self.suspended.store(true, Ordering::Release);
    }

    pub fn resume(&self) {
        self.suspended.store(false, Ordering::Release);
    }

    /// Flip between running and suspended; returns the new suspended state.
    pub fn toggle(&self) -> bool {
        !self.suspended.fetch_xor(true, Ordering::AcqRel)
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::Acquire)
    }
}
