pub mod control; // Control-surface events and named bindings
pub mod dsp;
pub mod engine; // Render clock, automation and the block renderer
pub mod error;
pub mod graph; // Signal units, envelopes and the patch graph
pub mod patch; // Configuration and the fixed FM patch assembly

pub use error::PatchError;

pub const MAX_BLOCK_SIZE: usize = 2048;
pub(crate) const MIN_TIME: f32 = 1.0 / 48_000.0;

/// Smallest value an exponential ramp may approach (about -100 dBFS).
pub const EPSILON_FLOOR: f32 = 1.0e-5;
