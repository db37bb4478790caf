//! Field-wise last-write-wins merge.
//!
//! The newer snapshot (by source time) wins every field it reports. The older
//! snapshot can only fill fields the newer one leaves unset, so a late
//! delivery can never roll a unit backwards. Equal source times are resolved
//! by arrival order: the incoming snapshot counts as newer.

use super::model::UnitSnapshot;

/// Merge an incoming snapshot into the cached one for the same unit.
///
/// Returns a new snapshot; neither input is modified. With no cached snapshot
/// the incoming one is returned as-is.
///
/// The result carries the source time and receipt time of whichever input
/// won, so merging a stale record that adds nothing yields a snapshot that
/// [`UnitSnapshot::same_state`] considers identical to the cached one.
pub fn merge(existing: Option<&UnitSnapshot>, incoming: &UnitSnapshot) -> UnitSnapshot {
    let Some(existing) = existing else {
        return incoming.clone();
    };

    debug_assert_eq!(existing.unit_id, incoming.unit_id);

    if incoming.source_time >= existing.source_time {
        overlay(incoming, existing)
    } else {
        overlay(existing, incoming)
    }
}

/// Take every reported field of `newer`, falling back to `older`.
fn overlay(newer: &UnitSnapshot, older: &UnitSnapshot) -> UnitSnapshot {
    let mut attributes = older.attributes.clone();
    attributes.extend(
        newer
            .attributes
            .iter()
            .map(|(name, value)| (name.clone(), value.clone())),
    );

    UnitSnapshot {
        unit_id: newer.unit_id.clone(),
        position: newer.position.or(older.position),
        heading: newer.heading.or(older.heading),
        speed: newer.speed.or(older.speed),
        attributes,
        source_time: newer.source_time,
        received_at: newer.received_at,
    }
}
