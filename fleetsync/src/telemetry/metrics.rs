//! Atomic engine counters.

use std::sync::atomic::{AtomicU64, Ordering};

use super::snapshot::MetricsSnapshot;

/// Lock-free counters and gauges for the telemetry engine.
///
/// Counters only ever increase. The two gauges (`channel_count`,
/// `pending_count`) are written by the repository actor after each change so
/// readers never see a value that lags more than one command.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    ingested: AtomicU64,
    malformed: AtomicU64,
    deduplicated: AtomicU64,
    emissions: AtomicU64,
    coalesced: AtomicU64,
    channels_created: AtomicU64,
    evicted: AtomicU64,
    swept: AtomicU64,
    eviction_skips: AtomicU64,
    durable_failures: AtomicU64,
    pull_failures: AtomicU64,
    fetches_skipped: AtomicU64,

    channel_count: AtomicU64,
    pending_count: AtomicU64,
}

impl EngineMetrics {
    /// Create zeroed metrics.
    pub fn new() -> Self {
        Self::default()
    }

    // ==================== Counters ====================

    /// A record was merged into a changed snapshot.
    pub fn record_ingested(&self) {
        self.ingested.fetch_add(1, Ordering::Relaxed);
    }

    /// A record failed validation and was dropped.
    pub fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    /// A merged snapshot was identical to the cached one and was dropped.
    pub fn record_deduplicated(&self) {
        self.deduplicated.fetch_add(1, Ordering::Relaxed);
    }

    /// A snapshot was published to a unit channel.
    pub fn record_emission(&self) {
        self.emissions.fetch_add(1, Ordering::Relaxed);
    }

    /// A pending update was replaced by a newer one before it could emit.
    pub fn record_coalesced(&self) {
        self.coalesced.fetch_add(1, Ordering::Relaxed);
    }

    /// A unit channel was materialized.
    pub fn record_channel_created(&self) {
        self.channels_created.fetch_add(1, Ordering::Relaxed);
    }

    /// An idle channel was evicted to make room for a new one.
    pub fn record_evicted(&self) {
        self.evicted.fetch_add(1, Ordering::Relaxed);
    }

    /// Idle channels were closed by the periodic sweep.
    pub fn record_swept(&self, count: u64) {
        self.swept.fetch_add(count, Ordering::Relaxed);
    }

    /// Eviction was needed but every channel had listeners.
    pub fn record_eviction_skip(&self) {
        self.eviction_skips.fetch_add(1, Ordering::Relaxed);
    }

    /// A durable cache read or write failed.
    pub fn record_durable_failure(&self) {
        self.durable_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// A pull fetch failed.
    pub fn record_pull_failure(&self) {
        self.pull_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// An id-reference fetch was skipped by the fetch memo.
    pub fn record_fetch_skipped(&self) {
        self.fetches_skipped.fetch_add(1, Ordering::Relaxed);
    }

    // ==================== Gauges ====================

    /// Set the number of materialized channels.
    pub fn set_channel_count(&self, count: usize) {
        self.channel_count.store(count as u64, Ordering::Relaxed);
    }

    /// Set the number of units with a pending coalesced update.
    pub fn set_pending_count(&self, count: usize) {
        self.pending_count.store(count as u64, Ordering::Relaxed);
    }

    // ==================== Reads ====================

    /// Total coalesced updates.
    pub fn coalesced(&self) -> u64 {
        self.coalesced.load(Ordering::Relaxed)
    }

    /// Total emissions.
    pub fn emissions(&self) -> u64 {
        self.emissions.load(Ordering::Relaxed)
    }

    /// Current channel count.
    pub fn channel_count(&self) -> u64 {
        self.channel_count.load(Ordering::Relaxed)
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            ingested: self.ingested.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            deduplicated: self.deduplicated.load(Ordering::Relaxed),
            emissions: self.emissions.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            channels_created: self.channels_created.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            swept: self.swept.load(Ordering::Relaxed),
            eviction_skips: self.eviction_skips.load(Ordering::Relaxed),
            durable_failures: self.durable_failures.load(Ordering::Relaxed),
            pull_failures: self.pull_failures.load(Ordering::Relaxed),
            fetches_skipped: self.fetches_skipped.load(Ordering::Relaxed),
            channel_count: self.channel_count.load(Ordering::Relaxed),
            pending_count: self.pending_count.load(Ordering::Relaxed),
        }
    }
}
