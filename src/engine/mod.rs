//! Render-side machinery: the shared clock, parameter automation, the
//! control-to-render scheduling queues and the block renderer.

pub mod automation;
pub mod clock;
pub mod nodes;
pub mod render;
pub mod scheduler;

pub use clock::RenderClock;
pub use render::Renderer;
