//! Repository actor: the single writer.
//!
//! All mutable repository state (snapshot cache writes, pending slots,
//! delayed flushes, channel bookkeeping, fetch memo) is owned by one task
//! that drains a command queue. Handles, channels and spawned I/O tasks only
//! ever send commands, so ingestion is never blocked on subscribers or on
//! source I/O.
//!
//! ```text
//!                 ┌──────────────────────────────────────────────┐
//! Command ──────► │ RepositoryActor                              │
//!  (handle,       │                                              │
//!   channels,     │  Ingest ─► merge ─► dedupe ─► store ─► gate  │──► UnitChannel
//!   fetch tasks)  │                          │              │    │
//!                 │                   durable put     DelayQueue │
//!                 │                   (spawned)       (flush)    │
//!                 │  sweep interval ─► lifecycle                  │
//!                 └──────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::time::DelayQueue;
use tracing::{debug, info, warn};

use super::arena::ChannelArena;
use super::channel::UnitChannel;
use super::fetch_memo::FetchMemo;
use super::gate::{admit, Admission};
use super::lifecycle::{teardown, ChannelLifecycle, Eviction};
use super::store::SnapshotStore;
use super::{parse_records, RepositoryConfig};
use crate::lod::SharedLodController;
use crate::snapshot::{merge, UnitId, UnitSnapshot};
use crate::sources::{DurableCache, PullSource};
use crate::telemetry::EngineMetrics;

/// Where a batch of snapshots came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Origin {
    /// Push channel records.
    Push,
    /// Pull source, either submitted by the caller or fetched for an id
    /// reference.
    Pull,
    /// Forced refresh; bypasses dedupe once.
    Refresh,
    /// Durable cache hydration; never written back and never materializes a
    /// channel.
    Durable,
}

/// Messages processed by the actor.
#[derive(Debug)]
pub(crate) enum Command {
    Ingest {
        snapshots: Vec<UnitSnapshot>,
        origin: Origin,
    },
    /// Id-only push: fetch the unit from the pull source unless it was
    /// fetched recently.
    Resolve(UnitId),
    Refresh(UnitId),
    RefreshAll(Vec<UnitId>),
    Preload(Vec<UnitId>),
    ChannelFor {
        unit: UnitId,
        reply: oneshot::Sender<UnitChannel>,
    },
    /// A subscription was added or dropped.
    Touch(UnitId),
    /// Barrier: replies once every earlier command has been processed.
    Flush(oneshot::Sender<()>),
}

pub(crate) struct RepositoryActor {
    config: RepositoryConfig,
    lifecycle: ChannelLifecycle,
    lod: SharedLodController,
    pull: Arc<dyn PullSource>,
    durable: Arc<dyn DurableCache>,
    store: SnapshotStore,
    metrics: Arc<EngineMetrics>,
    arena: ChannelArena,
    delays: DelayQueue<UnitId>,
    memo: FetchMemo,
    commands_tx: mpsc::UnboundedSender<Command>,
    commands_rx: mpsc::UnboundedReceiver<Command>,
    shutdown: CancellationToken,
}

/// Collaborators handed to the actor at startup.
pub(crate) struct ActorParts {
    pub(crate) config: RepositoryConfig,
    pub(crate) lifecycle: ChannelLifecycle,
    pub(crate) lod: SharedLodController,
    pub(crate) pull: Arc<dyn PullSource>,
    pub(crate) durable: Arc<dyn DurableCache>,
    pub(crate) store: SnapshotStore,
    pub(crate) metrics: Arc<EngineMetrics>,
    pub(crate) commands_tx: mpsc::UnboundedSender<Command>,
    pub(crate) commands_rx: mpsc::UnboundedReceiver<Command>,
    pub(crate) shutdown: CancellationToken,
}

impl RepositoryActor {
    pub(crate) fn new(parts: ActorParts) -> Self {
        let memo = FetchMemo::new(parts.config.fetch_memo_ttl);
        Self {
            config: parts.config,
            lifecycle: parts.lifecycle,
            lod: parts.lod,
            pull: parts.pull,
            durable: parts.durable,
            store: parts.store,
            metrics: parts.metrics,
            arena: ChannelArena::new(),
            delays: DelayQueue::new(),
            memo,
            commands_tx: parts.commands_tx,
            commands_rx: parts.commands_rx,
            shutdown: parts.shutdown,
        }
    }

    /// Run until the shutdown token is cancelled.
    pub(crate) async fn run(mut self) {
        let period = self
            .lifecycle
            .config()
            .sweep_interval
            .max(std::time::Duration::from_millis(1));
        let mut sweep = interval_at(Instant::now() + period, period);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            max_channels = self.lifecycle.config().max_channels,
            idle_timeout_secs = self.lifecycle.config().idle_timeout.as_secs(),
            "Telemetry repository started"
        );

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => {
                    break;
                }

                Some(expired) = self.delays.next(), if !self.delays.is_empty() => {
                    self.flush_pending(expired.into_inner(), Instant::now());
                }

                command = self.commands_rx.recv() => {
                    match command {
                        Some(command) => self.handle(command).await,
                        None => break,
                    }
                }

                _ = sweep.tick() => {
                    self.sweep(Instant::now());
                }
            }
        }

        self.dispose();
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Ingest { snapshots, origin } => {
                for snapshot in snapshots {
                    self.ingest_one(snapshot, origin).await;
                }
            }
            Command::Resolve(unit) => self.resolve(unit),
            Command::Refresh(unit) => {
                self.memo.clear(&unit);
                self.memo.record(&unit, Instant::now());
                debug!(unit = %unit, "Forced refresh");
                self.spawn_fetch(vec![unit], Origin::Refresh);
            }
            Command::RefreshAll(units) => {
                if units.is_empty() {
                    return;
                }
                let now = Instant::now();
                for unit in &units {
                    self.memo.record(unit, now);
                }
                debug!(count = units.len(), "Bulk refresh");
                self.spawn_fetch(units, Origin::Pull);
            }
            Command::Preload(units) => self.spawn_hydrate(units),
            Command::ChannelFor { unit, reply } => {
                let channel = self.channel_for(&unit).await;
                let _ = reply.send(channel);
            }
            Command::Touch(unit) => {
                self.arena.touch(&unit, Instant::now());
            }
            Command::Flush(reply) => {
                let _ = reply.send(());
            }
        }
    }

    // ==================== Ingestion ====================

    async fn ingest_one(&mut self, incoming: UnitSnapshot, origin: Origin) {
        let unit = incoming.unit_id.clone();
        let cached = self.store.get(&unit).await;
        let merged = merge(cached.as_deref(), &incoming);

        if origin != Origin::Refresh {
            if let Some(cached) = cached.as_deref() {
                if cached.same_state(&merged) {
                    self.metrics.record_deduplicated();
                    debug!(unit = %unit, origin = ?origin, "Duplicate update dropped");
                    return;
                }
            }
        }

        let merged = Arc::new(merged);
        self.store.insert(Arc::clone(&merged)).await;
        self.metrics.record_ingested();

        if origin != Origin::Durable {
            self.spawn_durable_put(UnitSnapshot::clone(&merged));
        } else if !self.arena.contains(&unit) {
            return;
        }

        self.dispatch(&unit, merged, Instant::now());
    }

    /// Route a merged snapshot through the emission gate.
    fn dispatch(&mut self, unit: &UnitId, snapshot: Arc<UnitSnapshot>, now: Instant) {
        self.ensure_channel(unit, None, now);
        let gap = self.lod.emission_gap();

        let Some(last_emitted) = self.arena.get(unit).map(|state| state.last_emitted) else {
            return;
        };

        match admit(last_emitted, now, gap) {
            Admission::EmitNow => {
                self.arena.take_pending(unit);
                if let Some(state) = self.arena.get_mut(unit) {
                    if let Some(key) = state.delay_key.take() {
                        self.delays.remove(&key);
                    }
                    state.emit(snapshot, now);
                    self.metrics.record_emission();
                }
            }
            Admission::Defer { due } => {
                if self.arena.replace_pending(unit, snapshot) {
                    self.metrics.record_coalesced();
                }
                if let Some(state) = self.arena.get_mut(unit) {
                    if state.delay_key.is_none() {
                        state.delay_key = Some(self.delays.insert_at(unit.clone(), due));
                    }
                }
                debug!(
                    unit = %unit,
                    gap_ms = gap.as_millis() as u64,
                    "Update coalesced"
                );
            }
        }

        self.arena.touch(unit, now);
        self.metrics.set_pending_count(self.arena.pending_count());
    }

    /// Emit whatever is pending for a unit whose delay has elapsed.
    fn flush_pending(&mut self, unit: UnitId, now: Instant) {
        let pending = self.arena.take_pending(&unit);
        let Some(state) = self.arena.get_mut(&unit) else {
            return;
        };
        state.delay_key = None;

        if let Some(pending) = pending {
            state.emit(pending, now);
            self.metrics.record_emission();
        }
        self.metrics.set_pending_count(self.arena.pending_count());
    }

    // ==================== Channels ====================

    async fn channel_for(&mut self, unit: &UnitId) -> UnitChannel {
        let now = Instant::now();
        let channel = if self.arena.contains(unit) {
            self.ensure_channel(unit, None, now)
        } else {
            let cached = self.store.get(unit).await;
            if cached.is_none() {
                self.spawn_hydrate(vec![unit.clone()]);
            }
            self.ensure_channel(unit, cached, now)
        };
        self.arena.touch(unit, now);
        channel
    }

    /// Return the channel for `unit`, materializing it (and evicting first
    /// when at the cap) if it has none.
    fn ensure_channel(
        &mut self,
        unit: &UnitId,
        seed: Option<Arc<UnitSnapshot>>,
        now: Instant,
    ) -> UnitChannel {
        if let Some(state) = self.arena.get(unit) {
            return state.channel.clone();
        }

        match self
            .lifecycle
            .make_room(&mut self.arena, &mut self.delays, unit)
        {
            Eviction::NotNeeded => {}
            Eviction::Evicted(evicted) => {
                self.memo.clear(&evicted);
                self.metrics.record_evicted();
                debug!(
                    evicted = %evicted,
                    for_unit = %unit,
                    channels = self.arena.len(),
                    "Evicted idle channel"
                );
            }
            Eviction::Starved => {
                self.metrics.record_eviction_skip();
                warn!(
                    unit = %unit,
                    channels = self.arena.len(),
                    cap = self.lifecycle.config().max_channels,
                    "No idle channel to evict; channel cap exceeded"
                );
            }
        }

        let channel = UnitChannel::new(
            unit.clone(),
            self.config.channel_capacity,
            seed,
            self.commands_tx.clone(),
        );
        self.arena.insert(unit.clone(), channel.clone(), now);
        self.metrics.record_channel_created();
        self.metrics.set_channel_count(self.arena.len());
        channel
    }

    fn sweep(&mut self, now: Instant) {
        let swept = self.lifecycle.sweep(&mut self.arena, &mut self.delays, now);
        for unit in &swept {
            self.memo.clear(unit);
        }
        self.memo.prune(now);

        self.metrics.record_swept(swept.len() as u64);
        self.metrics.set_channel_count(self.arena.len());
        self.metrics.set_pending_count(self.arena.pending_count());
        debug!(
            swept = swept.len(),
            channels = self.arena.len(),
            "Channel sweep complete"
        );
    }

    // ==================== Background I/O ====================

    fn resolve(&mut self, unit: UnitId) {
        if !self.memo.try_acquire(&unit, Instant::now()) {
            self.metrics.record_fetch_skipped();
            debug!(unit = %unit, "Fetch skipped; fetched recently");
            return;
        }
        self.spawn_fetch(vec![unit], Origin::Pull);
    }

    fn spawn_fetch(&self, units: Vec<UnitId>, origin: Origin) {
        let pull = Arc::clone(&self.pull);
        let tx = self.commands_tx.clone();
        let metrics = Arc::clone(&self.metrics);
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            let fetch = async {
                if units.len() == 1 {
                    match units.into_iter().next() {
                        Some(unit) => pull.fetch(unit).await.map(|r| r.into_iter().collect()),
                        None => Ok(Vec::new()),
                    }
                } else {
                    pull.fetch_batch(units).await
                }
            };

            let result = tokio::select! {
                _ = shutdown.cancelled() => return,
                result = fetch => result,
            };

            if shutdown.is_cancelled() {
                debug!("Discarding fetch result after disposal");
                return;
            }

            match result {
                Ok(records) => {
                    let snapshots = parse_records(records, Utc::now(), &metrics);
                    if !snapshots.is_empty() {
                        let _ = tx.send(Command::Ingest { snapshots, origin });
                    }
                }
                Err(e) => {
                    metrics.record_pull_failure();
                    warn!(error = %e, "Pull fetch failed; keeping last known state");
                }
            }
        });
    }

    fn spawn_hydrate(&self, units: Vec<UnitId>) {
        if units.is_empty() {
            return;
        }
        let durable = Arc::clone(&self.durable);
        let tx = self.commands_tx.clone();
        let metrics = Arc::clone(&self.metrics);
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            let loads = futures::future::join_all(
                units.into_iter().map(|unit| durable.get(unit)),
            );
            let results = tokio::select! {
                _ = shutdown.cancelled() => return,
                results = loads => results,
            };

            let mut snapshots = Vec::new();
            for result in results {
                match result {
                    Ok(Some(snapshot)) => snapshots.push(snapshot),
                    Ok(None) => {}
                    Err(e) => {
                        metrics.record_durable_failure();
                        warn!(error = %e, "Durable cache read failed");
                    }
                }
            }

            if !snapshots.is_empty() && !shutdown.is_cancelled() {
                debug!(count = snapshots.len(), "Hydrated snapshots from durable cache");
                let _ = tx.send(Command::Ingest {
                    snapshots,
                    origin: Origin::Durable,
                });
            }
        });
    }

    fn spawn_durable_put(&self, snapshot: UnitSnapshot) {
        let durable = Arc::clone(&self.durable);
        let metrics = Arc::clone(&self.metrics);

        tokio::spawn(async move {
            let unit = snapshot.unit_id.clone();
            if let Err(e) = durable.put(snapshot).await {
                metrics.record_durable_failure();
                warn!(unit = %unit, error = %e, "Durable cache write failed");
            }
        });
    }

    // ==================== Shutdown ====================

    fn dispose(&mut self) {
        let channels = self.arena.len();
        for unit in self.arena.units() {
            teardown(&mut self.arena, &mut self.delays, &unit, true);
        }
        self.delays.clear();
        self.commands_rx.close();

        self.metrics.set_channel_count(self.arena.len());
        self.metrics.set_pending_count(self.arena.pending_count());
        info!(channels, "Telemetry repository stopped");
    }
}
