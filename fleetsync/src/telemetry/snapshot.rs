//! Point-in-time metrics copy.

use std::fmt;

use serde::Serialize;

/// Copy of [`EngineMetrics`](super::EngineMetrics) at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub ingested: u64,
    pub malformed: u64,
    pub deduplicated: u64,
    pub emissions: u64,
    pub coalesced: u64,
    pub channels_created: u64,
    pub evicted: u64,
    pub swept: u64,
    pub eviction_skips: u64,
    pub durable_failures: u64,
    pub pull_failures: u64,
    pub fetches_skipped: u64,
    pub channel_count: u64,
    pub pending_count: u64,
}

impl MetricsSnapshot {
    /// Fraction of accepted updates that were coalesced away.
    pub fn coalesce_ratio(&self) -> f64 {
        let total = self.emissions + self.coalesced;
        if total == 0 {
            0.0
        } else {
            self.coalesced as f64 / total as f64
        }
    }
}

impl fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "channels {} (pending {}), ingested {}, emitted {}, coalesced {}, deduped {}, evicted {}, swept {}",
            self.channel_count,
            self.pending_count,
            self.ingested,
            self.emissions,
            self.coalesced,
            self.deduplicated,
            self.evicted,
            self.swept
        )
    }
}
