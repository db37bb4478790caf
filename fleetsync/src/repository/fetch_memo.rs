//! Per-unit memo of recent pull fetches.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::snapshot::UnitId;

/// Suppresses repeated fetch-by-id requests for the same unit.
///
/// A push source that only sends id references can name the same unit many
/// times per second. Within the TTL after a fetch, further references to
/// that unit are dropped; the fetch already in flight (or just completed)
/// carries the state they point at.
#[derive(Debug)]
pub(crate) struct FetchMemo {
    ttl: Duration,
    last_fetch: HashMap<UnitId, Instant>,
}

impl FetchMemo {
    pub(crate) fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            last_fetch: HashMap::new(),
        }
    }

    /// Returns `true` and records the fetch if the unit was not fetched
    /// within the TTL.
    pub(crate) fn try_acquire(&mut self, unit: &UnitId, now: Instant) -> bool {
        if let Some(&last) = self.last_fetch.get(unit) {
            if now.saturating_duration_since(last) < self.ttl {
                return false;
            }
        }
        self.last_fetch.insert(unit.clone(), now);
        true
    }

    /// Record a fetch that bypassed the memo.
    pub(crate) fn record(&mut self, unit: &UnitId, now: Instant) {
        self.last_fetch.insert(unit.clone(), now);
    }

    /// Forget a unit so the next reference fetches again.
    pub(crate) fn clear(&mut self, unit: &UnitId) {
        self.last_fetch.remove(unit);
    }

    /// Drop entries that have outlived the TTL.
    pub(crate) fn prune(&mut self, now: Instant) {
        let ttl = self.ttl;
        self.last_fetch
            .retain(|_, last| now.saturating_duration_since(*last) < ttl);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.last_fetch.len()
    }
}
