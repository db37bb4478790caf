//! Emission gate: decides whether an update emits now or waits.
//!
//! ```text
//! now - last >= gap  (or never emitted)  ──► EmitNow
//! otherwise                              ──► Defer { due: last + gap }
//! ```
//!
//! The gate is stateless; the caller owns `last` and the pending slot.

use std::time::Duration;

use tokio::time::Instant;

/// Gate verdict for one update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Admission {
    /// The gap has elapsed; publish immediately.
    EmitNow,
    /// Too soon; hold the update until `due`.
    Defer { due: Instant },
}

/// Decide how to handle an update arriving at `now`.
pub(crate) fn admit(last_emitted: Option<Instant>, now: Instant, gap: Duration) -> Admission {
    match last_emitted {
        None => Admission::EmitNow,
        Some(last) if now.saturating_duration_since(last) >= gap => Admission::EmitNow,
        Some(last) => Admission::Defer { due: last + gap },
    }
}
