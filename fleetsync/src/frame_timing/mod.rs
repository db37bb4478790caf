//! Frame timing monitor.
//!
//! Converts per-frame render durations into a smoothed FPS signal. A sampler
//! receives the value on every tick and a callback is notified only when it
//! changes meaningfully. The engine wires the sampler to
//! [`LodController::update_by_fps`].
//!
//! [`LodController::update_by_fps`]: crate::lod::LodController::update_by_fps

mod monitor;
mod window;

pub use monitor::{
    FpsCallback, FrameTimingConfig, FrameTimingMonitor, DEFAULT_MAX_SAMPLES,
    DEFAULT_REPORT_DELTA_FPS, DEFAULT_TICK_INTERVAL, DEFAULT_WINDOW,
};
pub use window::FpsWindow;
