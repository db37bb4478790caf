//! Telemetry synchronization repository.
//!
//! Reconciles the push and pull sources into one snapshot per unit and
//! exposes a bounded, rate-limited output channel per unit.
//!
//! # Architecture
//!
//! ```text
//! TelemetryRepository (Clone handle)
//!   │  submit_push / submit_pull / refresh / channel_for
//!   ▼
//! unbounded command queue ──► RepositoryActor (single writer)
//!                               ├─ SnapshotStore (moka)      latest merged snapshot
//!                               ├─ ChannelArena              per-unit channel state
//!                               ├─ DelayQueue                coalesced flushes
//!                               ├─ FetchMemo                 id-reference throttle
//!                               └─ ChannelLifecycle          sweep + eviction
//! ```
//!
//! # Emission
//!
//! With `gap` taken from the LOD controller at the moment of each update, a
//! unit emits at most once per `gap`. Updates arriving inside the window
//! replace the unit's single pending slot; one flush is scheduled at
//! `last + gap` and emits whatever is pending then. Of `k` updates inside one
//! window exactly one is emitted and `k - 1` are counted as coalesced.

mod actor;
mod arena;
mod channel;
mod fetch_memo;
mod gate;
mod lifecycle;
mod store;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{info, warn};

use crate::error::EngineError;
use crate::lod::SharedLodController;
use crate::snapshot::{RawRecord, UnitId, UnitSnapshot};
use crate::sources::{DurableCache, PullSource, PushMessage};
use crate::telemetry::{EngineMetrics, MetricsSnapshot};

use actor::{ActorParts, Command, Origin, RepositoryActor};
use lifecycle::ChannelLifecycle;

pub use channel::{UnitChannel, UnitSubscription};
pub use lifecycle::{
    LifecycleConfig, DEFAULT_IDLE_TIMEOUT, DEFAULT_MAX_CHANNELS, DEFAULT_SWEEP_INTERVAL,
};
pub use store::SnapshotStore;

// ==================== Defaults ====================

/// Default per-unit broadcast capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 16;

/// Default number of units kept in the in-memory snapshot cache.
pub const DEFAULT_SNAPSHOT_CACHE_CAPACITY: u64 = 10_000;

/// Default window in which repeated id-reference fetches are suppressed.
pub const DEFAULT_FETCH_MEMO_TTL: Duration = Duration::from_secs(2);

/// Repository configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryConfig {
    /// Buffered snapshots per unit channel before slow subscribers lag.
    pub channel_capacity: usize,
    /// Units held in the in-memory snapshot cache.
    pub snapshot_cache_capacity: u64,
    /// Fetch-by-id suppression window.
    pub fetch_memo_ttl: Duration,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            snapshot_cache_capacity: DEFAULT_SNAPSHOT_CACHE_CAPACITY,
            fetch_memo_ttl: DEFAULT_FETCH_MEMO_TTL,
        }
    }
}

/// Validate raw records, dropping and counting malformed ones.
pub(crate) fn parse_records(
    records: Vec<RawRecord>,
    received_at: DateTime<Utc>,
    metrics: &EngineMetrics,
) -> Vec<UnitSnapshot> {
    records
        .into_iter()
        .filter_map(|record| match record.into_snapshot(received_at) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                metrics.record_malformed();
                warn!(error = %e, "Dropping malformed record");
                None
            }
        })
        .collect()
}

/// Handle to the repository actor.
///
/// Cheap to clone. Every operation is non-blocking: it enqueues a command
/// and returns. When the last handle is dropped the actor shuts down, exactly
/// as if [`dispose`](TelemetryRepository::dispose) had been called.
#[derive(Clone)]
pub struct TelemetryRepository {
    commands: mpsc::UnboundedSender<Command>,
    store: SnapshotStore,
    metrics: Arc<EngineMetrics>,
    lod: SharedLodController,
    shutdown: CancellationToken,
    _guard: Arc<DropGuard>,
}

impl TelemetryRepository {
    /// Spawn the repository actor on the current tokio runtime.
    pub fn start(
        config: RepositoryConfig,
        lifecycle: LifecycleConfig,
        lod: SharedLodController,
        pull: Arc<dyn PullSource>,
        durable: Arc<dyn DurableCache>,
    ) -> Result<Self, EngineError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| EngineError::NoRuntime)?;

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let store = SnapshotStore::new(config.snapshot_cache_capacity);
        let metrics = Arc::new(EngineMetrics::new());
        let shutdown = CancellationToken::new();

        let actor = RepositoryActor::new(ActorParts {
            config,
            lifecycle: ChannelLifecycle::new(lifecycle),
            lod: Arc::clone(&lod),
            pull,
            durable,
            store: store.clone(),
            metrics: Arc::clone(&metrics),
            commands_tx: commands_tx.clone(),
            commands_rx,
            shutdown: shutdown.clone(),
        });
        runtime.spawn(actor.run());

        Ok(Self {
            commands: commands_tx,
            store,
            metrics,
            lod,
            _guard: Arc::new(shutdown.clone().drop_guard()),
            shutdown,
        })
    }

    /// Get (or lazily create) the output channel for a unit.
    ///
    /// The same channel instance is returned for as long as it stays
    /// materialized. Creating a channel for a unit with no cached snapshot
    /// triggers a background read of the durable cache.
    pub async fn channel_for(&self, unit: impl Into<UnitId>) -> Result<UnitChannel, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::ChannelFor {
            unit: unit.into(),
            reply,
        })?;
        rx.await.map_err(|_| EngineError::Disposed)
    }

    /// Accept a push-channel message. Returns the number of valid records
    /// enqueued (an id reference counts as zero).
    pub fn submit_push(&self, message: PushMessage) -> Result<usize, EngineError> {
        match message {
            PushMessage::Records(records) => self.submit(records, Origin::Push),
            PushMessage::UnitRef(unit) => {
                self.send(Command::Resolve(unit))?;
                Ok(0)
            }
        }
    }

    /// Accept records delivered by the pull/poll fallback.
    pub fn submit_pull(&self, records: Vec<RawRecord>) -> Result<usize, EngineError> {
        self.submit(records, Origin::Pull)
    }

    /// Ingest already-validated snapshots (tests, replay tools).
    pub fn ingest(&self, snapshots: Vec<UnitSnapshot>) -> Result<(), EngineError> {
        if snapshots.is_empty() {
            return Ok(());
        }
        self.send(Command::Ingest {
            snapshots,
            origin: Origin::Push,
        })
    }

    /// Re-fetch one unit from the pull source, bypassing the fetch memo, and
    /// emit the result even if it matches the cached state.
    pub fn refresh(&self, unit: impl Into<UnitId>) -> Result<(), EngineError> {
        self.send(Command::Refresh(unit.into()))
    }

    /// Re-fetch a set of units in one batch, bypassing the fetch memo.
    pub fn refresh_all(&self, units: Vec<UnitId>) -> Result<(), EngineError> {
        self.send(Command::RefreshAll(units))
    }

    /// Hydrate the in-memory cache from the durable cache.
    pub fn preload(&self, units: Vec<UnitId>) -> Result<(), EngineError> {
        self.send(Command::Preload(units))
    }

    /// Wait until every previously submitted command has been processed.
    pub async fn flush(&self) -> Result<(), EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Flush(reply))?;
        rx.await.map_err(|_| EngineError::Disposed)
    }

    /// Latest merged snapshot for a unit, whether or not it has a channel.
    pub async fn snapshot(&self, unit: &UnitId) -> Option<Arc<UnitSnapshot>> {
        self.store.get(unit).await
    }

    /// Point-in-time metrics.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Shared metrics handle.
    pub fn shared_metrics(&self) -> Arc<EngineMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Current emission gap.
    pub fn emission_gap(&self) -> Duration {
        self.lod.emission_gap()
    }

    /// Stop the actor: cancel pending flushes, close every channel, stop the
    /// sweep timer. Idempotent; later calls on any handle return
    /// [`EngineError::Disposed`].
    pub fn dispose(&self) {
        if !self.shutdown.is_cancelled() {
            info!("Disposing telemetry repository");
            self.shutdown.cancel();
        }
    }

    /// Whether [`dispose`](TelemetryRepository::dispose) has been called.
    pub fn is_disposed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    fn submit(&self, records: Vec<RawRecord>, origin: Origin) -> Result<usize, EngineError> {
        if self.is_disposed() {
            return Err(EngineError::Disposed);
        }
        let snapshots = parse_records(records, Utc::now(), &self.metrics);
        let accepted = snapshots.len();
        if accepted > 0 {
            self.send(Command::Ingest { snapshots, origin })?;
        }
        Ok(accepted)
    }

    fn send(&self, command: Command) -> Result<(), EngineError> {
        if self.is_disposed() {
            return Err(EngineError::Disposed);
        }
        self.commands
            .send(command)
            .map_err(|_| EngineError::Disposed)
    }
}

impl std::fmt::Debug for TelemetryRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryRepository")
            .field("disposed", &self.is_disposed())
            .field("metrics", &self.metrics.snapshot())
            .finish()
    }
}
