//! Per-unit telemetry snapshots.
//!
//! A [`UnitSnapshot`] is the immutable state of one tracked unit: position,
//! heading, speed, free-form attributes and the two timestamps (source and
//! local receipt). Snapshots are shared as `Arc<UnitSnapshot>` and never
//! mutated; [`merge`] produces a new one.
//!
//! Raw input from the push and pull sources arrives as [`RawRecord`], which is
//! validated into a snapshot before it reaches the repository.

mod merge;
mod model;
mod record;

pub use merge::merge;
pub use model::{AttributeValue, Position, UnitId, UnitSnapshot};
pub use record::RawRecord;
