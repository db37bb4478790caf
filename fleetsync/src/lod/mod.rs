//! Adaptive level-of-detail control.
//!
//! A hysteretic three-tier state machine driven by measured FPS. The current
//! tier sizes both the repository's emission gap and the marker decimator.
//!
//! # State Machine
//!
//! ```text
//!          fps < drop           fps < drop
//!   High ─────────────► Medium ─────────────► Low
//!        ◄─────────────        ◄─────────────
//!          fps >= raise         fps >= raise
//! ```
//!
//! Transitions move one tier per sample. FPS values in `[drop, raise)` never
//! cause a transition, whatever the current tier.
//!
//! # Tier Table
//!
//! | Tier   | Marker cap | Emission gap | Separation |
//! |--------|-----------:|-------------:|-----------:|
//! | High   | unbounded  | 33 ms        | disabled   |
//! | Medium | 900        | 66 ms        | 100 m      |
//! | Low    | 400        | 120 ms       | 100 m      |

mod controller;
mod table;
mod tier;

pub use controller::{LodController, SharedLodController};
pub use table::{
    DecimationParams, LodConfig, LodTable, TierSettings, DEFAULT_DROP_FPS, DEFAULT_RAISE_FPS,
};
pub use tier::LodTier;
