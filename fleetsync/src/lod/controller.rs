//! Hysteretic LOD controller.
//!
//! # Thread Safety
//!
//! The current tier lives in an `AtomicU8`. `update_by_fps` is the only
//! writer and moves the tier with a single compare-exchange; every reader (the
//! repository's emission gate, the decimator, diagnostics) loads it without
//! locking. The configuration table is immutable after construction.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::table::{DecimationParams, LodConfig, TierSettings};
use super::tier::LodTier;
use crate::error::ConfigError;

/// Shared handle to the process-wide LOD controller.
pub type SharedLodController = Arc<LodController>;

/// Three-tier hysteretic controller driven by FPS samples.
///
/// # Example
///
/// ```
/// use fleetsync::lod::{LodConfig, LodController, LodTier};
///
/// let lod = LodController::new(LodConfig::default()).unwrap();
/// assert_eq!(lod.mode(), LodTier::High);
///
/// lod.update_by_fps(45.0);
/// assert_eq!(lod.mode(), LodTier::Medium);
///
/// lod.update_by_fps(56.0); // inside the [50, 58) band
/// assert_eq!(lod.mode(), LodTier::Medium);
///
/// lod.update_by_fps(59.0);
/// assert_eq!(lod.mode(), LodTier::High);
/// ```
#[derive(Debug)]
pub struct LodController {
    config: LodConfig,
    tier: AtomicU8,
    transitions: AtomicU64,
}

impl LodController {
    /// Create a controller starting at `High`.
    pub fn new(config: LodConfig) -> Result<Self, ConfigError> {
        Self::starting_at(config, LodTier::High)
    }

    /// Create a controller starting at a specific tier.
    ///
    /// Tests use this to pin the emission gap deterministically.
    pub fn starting_at(config: LodConfig, tier: LodTier) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            tier: AtomicU8::new(tier as u8),
            transitions: AtomicU64::new(0),
        })
    }

    /// Feed one FPS sample. Returns the new tier if it changed.
    ///
    /// Below the drop threshold the tier steps down once; at or above the
    /// raise threshold it steps up once; anything in between is ignored.
    /// Non-finite samples are ignored.
    pub fn update_by_fps(&self, fps: f64) -> Option<LodTier> {
        if !fps.is_finite() {
            return None;
        }

        let current = self.mode();
        let next = if fps < self.config.drop_below_fps {
            current.downgrade()
        } else if fps >= self.config.raise_at_fps {
            current.upgrade()
        } else {
            current
        };

        if next == current {
            return None;
        }

        // A concurrent update already moved the tier; this sample was judged
        // against a stale tier, so drop it.
        if self
            .tier
            .compare_exchange(current as u8, next as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }

        self.transitions.fetch_add(1, Ordering::Relaxed);
        let settings = self.config.table.settings(next);
        tracing::info!(
            from = %current,
            to = %next,
            fps = format!("{:.1}", fps),
            emission_gap_ms = settings.emission_gap.as_millis() as u64,
            marker_cap = ?settings.marker_cap,
            "LOD tier changed"
        );
        Some(next)
    }

    /// Current tier.
    pub fn mode(&self) -> LodTier {
        LodTier::from_u8(self.tier.load(Ordering::Acquire))
    }

    /// Number of tier transitions since creation.
    pub fn transition_count(&self) -> u64 {
        self.transitions.load(Ordering::Relaxed)
    }

    /// The immutable configuration.
    pub fn config(&self) -> &LodConfig {
        &self.config
    }

    /// Settings row for the current tier.
    pub fn settings(&self) -> &TierSettings {
        self.config.table.settings(self.mode())
    }

    /// Maximum rendered markers at the current tier (`None` = unbounded).
    pub fn marker_cap(&self) -> Option<usize> {
        self.settings().marker_cap
    }

    /// Minimum time between emissions for one unit.
    pub fn emission_gap(&self) -> Duration {
        self.settings().emission_gap
    }

    /// Decimation parameters at the current tier.
    pub fn decimation_params(&self) -> DecimationParams {
        self.settings().decimation()
    }

    /// Polyline simplification tolerance in meters.
    pub fn simplification_tolerance_m(&self) -> f64 {
        self.settings().simplification_tolerance_m
    }

    /// Camera redraw throttle in milliseconds.
    pub fn camera_throttle_ms(&self) -> u64 {
        self.settings().camera_throttle.as_millis() as u64
    }

    /// Tile refresh throttle in milliseconds.
    pub fn tile_throttle_ms(&self) -> u64 {
        self.settings().tile_throttle.as_millis() as u64
    }

    /// Pull fallback poll interval in milliseconds.
    pub fn update_interval_ms(&self) -> u64 {
        self.settings().update_interval.as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn controller() -> LodController {
        LodController::new(LodConfig::default()).unwrap()
    }

    #[test]
    fn test_initial_tier_is_high() {
        assert_eq!(controller().mode(), LodTier::High);
    }

    #[test]
    fn test_hysteresis_sequence() {
        let lod = controller();

        assert_eq!(lod.update_by_fps(45.0), Some(LodTier::Medium));
        assert_eq!(lod.mode(), LodTier::Medium);

        assert_eq!(lod.update_by_fps(56.0), None);
        assert_eq!(lod.mode(), LodTier::Medium);

        assert_eq!(lod.update_by_fps(59.0), Some(LodTier::High));
        assert_eq!(lod.mode(), LodTier::High);
        assert_eq!(lod.transition_count(), 2);
    }

    #[test]
    fn test_single_step_per_sample() {
        let lod = controller();
        lod.update_by_fps(10.0);
        assert_eq!(lod.mode(), LodTier::Medium);
        lod.update_by_fps(10.0);
        assert_eq!(lod.mode(), LodTier::Low);

        lod.update_by_fps(120.0);
        assert_eq!(lod.mode(), LodTier::Medium);
    }

    #[test]
    fn test_band_never_transitions() {
        for start in LodTier::ALL {
            let lod = LodController::starting_at(LodConfig::default(), start).unwrap();
            for fps in [50.0, 52.5, 57.99] {
                assert_eq!(lod.update_by_fps(fps), None);
                assert_eq!(lod.mode(), start);
            }
        }
    }

    #[test]
    fn test_threshold_edges() {
        let lod = controller();
        // Exactly the drop threshold is inside the band.
        assert_eq!(lod.update_by_fps(50.0), None);

        let lod = LodController::starting_at(LodConfig::default(), LodTier::Low).unwrap();
        // Exactly the raise threshold upgrades.
        assert_eq!(lod.update_by_fps(58.0), Some(LodTier::Medium));
    }

    #[test]
    fn test_saturates_at_extremes() {
        let lod = LodController::starting_at(LodConfig::default(), LodTier::Low).unwrap();
        assert_eq!(lod.update_by_fps(5.0), None);
        assert_eq!(lod.mode(), LodTier::Low);

        let lod = controller();
        assert_eq!(lod.update_by_fps(144.0), None);
    }

    #[test]
    fn test_non_finite_ignored() {
        let lod = controller();
        assert_eq!(lod.update_by_fps(f64::NAN), None);
        assert_eq!(lod.update_by_fps(f64::NEG_INFINITY), None);
        assert_eq!(lod.mode(), LodTier::High);
    }

    #[test]
    fn test_lookups_follow_mode() {
        let lod = controller();
        assert_eq!(lod.marker_cap(), None);
        assert_eq!(lod.emission_gap(), Duration::from_millis(33));
        assert!(!lod.decimation_params().is_enabled());

        lod.update_by_fps(40.0);
        lod.update_by_fps(40.0);
        assert_eq!(lod.mode(), LodTier::Low);
        assert_eq!(lod.marker_cap(), Some(400));
        assert_eq!(lod.emission_gap(), Duration::from_millis(120));
        assert_eq!(lod.decimation_params().min_separation_m, Some(100.0));
        assert_eq!(lod.camera_throttle_ms(), 66);
        assert_eq!(lod.tile_throttle_ms(), 400);
        assert_eq!(lod.update_interval_ms(), 3000);
        assert_eq!(lod.simplification_tolerance_m(), 15.0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = LodConfig {
            drop_below_fps: 60.0,
            raise_at_fps: 30.0,
            ..Default::default()
        };
        assert!(LodController::new(config).is_err());
    }

    #[test]
    fn test_concurrent_readers_see_valid_tier() {
        let lod = Arc::new(controller());
        let mut handles = vec![];

        for i in 0..4 {
            let lod = Arc::clone(&lod);
            handles.push(thread::spawn(move || {
                for j in 0..200 {
                    let fps = if (i + j) % 2 == 0 { 30.0 } else { 70.0 };
                    lod.update_by_fps(fps);
                    let _ = lod.emission_gap();
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert!(LodTier::ALL.contains(&lod.mode()));
    }
}
