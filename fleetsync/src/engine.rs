//! Engine facade.
//!
//! [`FleetSyncEngine`] owns one instance of every component and wires them:
//!
//! ```text
//! record_frame ──► FrameTimingMonitor ──(fps every tick)──► LodController
//!                                                          │ tier
//!                     ┌────────────────────────────────────┤
//!                     ▼                                    ▼
//! push/pull ──► TelemetryRepository (emission gap)     decimate (cap, separation)
//! ```
//!
//! # Startup Sequence
//!
//! 1. Configuration is validated
//! 2. The LOD controller is created at `High`
//! 3. The frame timing monitor is created with a sampler feeding every
//!    evaluated FPS to the controller, and its ticker is started
//! 4. The repository actor is spawned
//!
//! Disposal runs in reverse: the ticker stops, then the repository closes
//! every channel and cancels pending flushes. Dropping the engine disposes it.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::decimate::decimate_with;
use crate::error::EngineError;
use crate::frame_timing::{FpsCallback, FrameTimingMonitor};
use crate::lod::{LodController, LodTier, SharedLodController};
use crate::repository::{TelemetryRepository, UnitChannel};
use crate::snapshot::{RawRecord, UnitId, UnitSnapshot};
use crate::sources::{DurableCache, PullSource, PushMessage};
use crate::telemetry::MetricsSnapshot;

/// Point-in-time view of the engine for status displays.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineDiagnostics {
    /// Current LOD tier.
    pub tier: LodTier,
    /// Smoothed FPS over the current window, if any frames were recorded.
    pub fps: Option<f64>,
    /// Emission gap at the current tier.
    pub emission_gap_ms: u64,
    /// Marker cap at the current tier (`None` = unbounded).
    pub marker_cap: Option<usize>,
    /// Tier transitions since startup.
    pub lod_transitions: u64,
    /// Repository counters and gauges.
    pub metrics: MetricsSnapshot,
}

impl std::fmt::Display for EngineDiagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fps = self
            .fps
            .map(|fps| format!("{:.1}", fps))
            .unwrap_or_else(|| "-".to_string());
        write!(
            f,
            "tier {} @ {} fps, gap {}ms | {}",
            self.tier, fps, self.emission_gap_ms, self.metrics
        )
    }
}

/// Telemetry synchronization and adaptive LOD engine.
pub struct FleetSyncEngine {
    lod: SharedLodController,
    monitor: FrameTimingMonitor,
    repository: TelemetryRepository,
}

impl FleetSyncEngine {
    /// Start every component on the current tokio runtime.
    ///
    /// Fails with [`EngineError::InvalidConfig`] if the configuration does not
    /// validate and [`EngineError::NoRuntime`] outside a runtime.
    pub fn start(
        config: EngineConfig,
        pull: Arc<dyn PullSource>,
        durable: Arc<dyn DurableCache>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        info!(
            drop_below_fps = config.lod.drop_below_fps,
            raise_at_fps = config.lod.raise_at_fps,
            max_channels = config.lifecycle.max_channels,
            "Starting telemetry engine"
        );

        let lod: SharedLodController = Arc::new(LodController::new(config.lod)?);

        // The controller steps at most one tier per sample, so it needs every
        // tick's value, not just the ones that pass the change delta.
        let on_sample: FpsCallback = {
            let lod = Arc::clone(&lod);
            Arc::new(move |fps| {
                lod.update_by_fps(fps);
            })
        };
        let on_change: FpsCallback = Arc::new(|fps| {
            debug!(fps = format!("{:.1}", fps), "Frame rate changed");
        });
        let monitor = FrameTimingMonitor::with_sampler(config.frame_timing, on_sample, on_change);

        let repository = TelemetryRepository::start(
            config.repository,
            config.lifecycle,
            Arc::clone(&lod),
            pull,
            durable,
        )?;
        monitor.start();

        Ok(Self {
            lod,
            monitor,
            repository,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Telemetry
    // ─────────────────────────────────────────────────────────────────────────

    /// Get (or lazily create) the output channel for a unit.
    pub async fn channel_for(&self, unit: impl Into<UnitId>) -> Result<UnitChannel, EngineError> {
        self.repository.channel_for(unit).await
    }

    /// Forward a push-channel message.
    pub fn submit_push(&self, message: PushMessage) -> Result<usize, EngineError> {
        self.repository.submit_push(message)
    }

    /// Forward records from the pull fallback.
    pub fn submit_pull(&self, records: Vec<RawRecord>) -> Result<usize, EngineError> {
        self.repository.submit_pull(records)
    }

    /// Force a re-fetch of one unit.
    pub fn refresh(&self, unit: impl Into<UnitId>) -> Result<(), EngineError> {
        self.repository.refresh(unit)
    }

    /// Re-fetch a set of units in one batch.
    pub fn refresh_all(&self, units: Vec<UnitId>) -> Result<(), EngineError> {
        self.repository.refresh_all(units)
    }

    /// Hydrate units from the durable cache.
    pub fn preload(&self, units: Vec<UnitId>) -> Result<(), EngineError> {
        self.repository.preload(units)
    }

    /// Latest merged snapshot for a unit.
    pub async fn snapshot(&self, unit: &UnitId) -> Option<Arc<UnitSnapshot>> {
        self.repository.snapshot(unit).await
    }

    /// Wait until every previously submitted command has been processed.
    pub async fn flush(&self) -> Result<(), EngineError> {
        self.repository.flush().await
    }

    /// The repository handle.
    pub fn repository(&self) -> &TelemetryRepository {
        &self.repository
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Level of detail
    // ─────────────────────────────────────────────────────────────────────────

    /// Record one rendered frame.
    pub fn record_frame(&self, build: Duration, raster: Duration) {
        self.monitor.record_frame(build, raster);
    }

    /// Evaluate frame timing now instead of waiting for the ticker.
    ///
    /// The LOD controller sees the evaluated FPS either way. Returns it only
    /// if it moved enough since the last report.
    pub fn tick_frame_timing(&self) -> Option<f64> {
        self.monitor.tick()
    }

    /// Current LOD tier.
    pub fn current_tier(&self) -> LodTier {
        self.lod.mode()
    }

    /// Maximum rendered markers at the current tier.
    pub fn marker_cap(&self) -> Option<usize> {
        self.lod.marker_cap()
    }

    /// Emission gap at the current tier, in milliseconds.
    pub fn emission_gap_ms(&self) -> u64 {
        self.lod.emission_gap().as_millis() as u64
    }

    /// Reduce a marker set with the current tier's decimation parameters.
    ///
    /// `entities` must be in a stable order (for example sorted by unit id)
    /// for the result to be stable between frames.
    pub fn decimate<T, F>(&self, entities: Vec<T>, position_of: F) -> Vec<T>
    where
        F: Fn(&T) -> (f64, f64),
    {
        decimate_with(entities, position_of, &self.lod.decimation_params())
    }

    /// The shared LOD controller.
    pub fn lod(&self) -> &SharedLodController {
        &self.lod
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Diagnostics & shutdown
    // ─────────────────────────────────────────────────────────────────────────

    /// Snapshot of tier, timing and repository counters.
    pub fn diagnostics(&self) -> EngineDiagnostics {
        EngineDiagnostics {
            tier: self.lod.mode(),
            fps: self.monitor.current_fps(),
            emission_gap_ms: self.emission_gap_ms(),
            marker_cap: self.lod.marker_cap(),
            lod_transitions: self.lod.transition_count(),
            metrics: self.repository.metrics(),
        }
    }

    /// Stop the frame timing ticker and dispose the repository. Idempotent.
    pub fn dispose(&self) {
        if self.repository.is_disposed() {
            return;
        }
        self.monitor.stop();
        self.repository.dispose();
        info!("Telemetry engine disposed");
    }

    /// Whether [`dispose`](FleetSyncEngine::dispose) has been called.
    pub fn is_disposed(&self) -> bool {
        self.repository.is_disposed()
    }
}

impl Drop for FleetSyncEngine {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for FleetSyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FleetSyncEngine")
            .field("tier", &self.lod.mode())
            .field("monitor", &self.monitor)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::Position;
    use crate::sources::{MemoryDurableCache, StaticPullSource};
    use chrono::{TimeZone, Utc};

    fn start_engine(config: EngineConfig) -> FleetSyncEngine {
        FleetSyncEngine::start(
            config,
            Arc::new(StaticPullSource::new()),
            Arc::new(MemoryDurableCache::new()),
        )
        .unwrap()
    }

    fn slow_frames(engine: &FleetSyncEngine, count: usize) {
        // 25ms per frame is 40 FPS.
        for _ in 0..count {
            engine.record_frame(Duration::from_millis(15), Duration::from_millis(10));
        }
    }

    #[tokio::test]
    async fn test_start_at_high_tier() {
        let engine = start_engine(EngineConfig::default());
        assert_eq!(engine.current_tier(), LodTier::High);
        assert_eq!(engine.marker_cap(), None);
        assert_eq!(engine.emission_gap_ms(), 33);
    }

    #[test]
    fn test_start_without_runtime_fails() {
        let result = FleetSyncEngine::start(
            EngineConfig::default(),
            Arc::new(StaticPullSource::new()),
            Arc::new(MemoryDurableCache::new()),
        );
        assert!(matches!(result, Err(EngineError::NoRuntime)));
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let mut config = EngineConfig::default();
        config.lod.raise_at_fps = config.lod.drop_below_fps;

        let result = FleetSyncEngine::start(
            config,
            Arc::new(StaticPullSource::new()),
            Arc::new(MemoryDurableCache::new()),
        );
        assert!(matches!(result, Err(EngineError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_slow_frames_downgrade_tier() {
        let engine = start_engine(EngineConfig::default());

        slow_frames(&engine, 20);
        engine.tick_frame_timing();

        assert_eq!(engine.current_tier(), LodTier::Medium);
        assert_eq!(engine.emission_gap_ms(), 66);
        assert_eq!(engine.marker_cap(), Some(900));
    }

    #[tokio::test]
    async fn test_decimate_follows_tier() {
        let engine = start_engine(EngineConfig::default());
        let points: Vec<(f64, f64)> = (0..2000).map(|i| (i as f64 * 0.01, 0.0)).collect();

        assert_eq!(engine.decimate(points.clone(), |p| *p).len(), 2000);

        slow_frames(&engine, 20);
        engine.tick_frame_timing();
        engine.tick_frame_timing();
        assert_eq!(engine.current_tier(), LodTier::Low);
        assert_eq!(engine.decimate(points, |p| *p).len(), 400);
    }

    #[tokio::test]
    async fn test_steady_overload_reaches_low() {
        let engine = start_engine(EngineConfig::default());
        engine.monitor.stop();

        slow_frames(&engine, 20);
        assert!(engine.tick_frame_timing().is_some());
        assert_eq!(engine.current_tier(), LodTier::Medium);

        // Same FPS again: no change report, but the controller still steps.
        slow_frames(&engine, 20);
        assert_eq!(engine.tick_frame_timing(), None);
        assert_eq!(engine.current_tier(), LodTier::Low);

        for _ in 0..8 {
            slow_frames(&engine, 20);
            engine.tick_frame_timing();
        }
        assert_eq!(engine.current_tier(), LodTier::Low);
        assert_eq!(engine.lod().transition_count(), 2);
    }

    #[tokio::test]
    async fn test_steady_recovery_reaches_high() {
        let engine = start_engine(EngineConfig::default());
        engine.monitor.stop();

        slow_frames(&engine, 20);
        engine.tick_frame_timing();
        engine.tick_frame_timing();
        assert_eq!(engine.current_tier(), LodTier::Low);

        // Enough 100 FPS frames to push every slow one past the sample cap.
        for _ in 0..600 {
            engine.record_frame(Duration::from_millis(5), Duration::from_millis(5));
        }
        engine.tick_frame_timing();
        assert_eq!(engine.current_tier(), LodTier::Medium);
        engine.tick_frame_timing();
        assert_eq!(engine.current_tier(), LodTier::High);
    }

    #[tokio::test]
    async fn test_push_reaches_subscriber() {
        let engine = start_engine(EngineConfig::default());
        let channel = engine.channel_for("truck-1").await.unwrap();
        let mut sub = channel.subscribe().unwrap();

        let t0 = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let accepted = engine
            .submit_push(PushMessage::Records(vec![
                RawRecord::new("truck-1", t0).at(53.5, 10.0).speed(20.0)
            ]))
            .unwrap();
        assert_eq!(accepted, 1);

        let snap = sub.recv().await.unwrap();
        assert_eq!(snap.position, Some(Position::new(53.5, 10.0)));
        assert_eq!(snap.speed, Some(20.0));
    }

    #[tokio::test]
    async fn test_diagnostics_reports_tier_and_channels() {
        let engine = start_engine(EngineConfig::default());
        engine.channel_for("a").await.unwrap();
        engine.channel_for("b").await.unwrap();
        engine.flush().await.unwrap();

        let diag = engine.diagnostics();
        assert_eq!(diag.tier, LodTier::High);
        assert_eq!(diag.metrics.channel_count, 2);
        assert_eq!(diag.lod_transitions, 0);
        assert!(diag.to_string().starts_with("tier high"));
    }

    #[tokio::test]
    async fn test_dispose_is_idempotent() {
        let engine = start_engine(EngineConfig::default());
        engine.dispose();
        engine.dispose();

        assert!(engine.is_disposed());
        assert!(matches!(
            engine.refresh("x"),
            Err(EngineError::Disposed)
        ));
        assert!(matches!(
            engine.channel_for("x").await,
            Err(EngineError::Disposed)
        ));
    }
}
