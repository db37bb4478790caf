//! Tier configuration table.
//!
//! The table is built once, validated, and then only read. The controller
//! never mutates it; tier changes just select a different row.

use std::time::Duration;

use super::tier::LodTier;
use crate::error::ConfigError;

// ==================== Threshold Defaults ====================

/// Default FPS below which the controller steps down one tier.
pub const DEFAULT_DROP_FPS: f64 = 50.0;

/// Default FPS at or above which the controller steps up one tier.
pub const DEFAULT_RAISE_FPS: f64 = 58.0;

/// Default minimum separation between decimated markers in meters.
pub const DEFAULT_DECIMATION_SEPARATION_M: f64 = 100.0;

/// Marker decimation parameters for one tier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecimationParams {
    /// Maximum markers to render. `None` means unbounded.
    pub max_count: Option<usize>,
    /// Minimum great-circle separation between kept markers. `None` disables
    /// spatial absorption.
    pub min_separation_m: Option<f64>,
}

impl DecimationParams {
    /// Whether decimation changes anything at all.
    pub fn is_enabled(&self) -> bool {
        self.max_count.is_some()
    }
}

/// Everything a tier controls.
#[derive(Debug, Clone, PartialEq)]
pub struct TierSettings {
    /// Maximum rendered markers (`None` = unbounded).
    pub marker_cap: Option<usize>,
    /// Minimum time between two emissions for one unit.
    pub emission_gap: Duration,
    /// Decimation separation (`None` = disabled).
    pub min_separation_m: Option<f64>,
    /// Track simplification tolerance for polylines, meters.
    pub simplification_tolerance_m: f64,
    /// Minimum interval between camera-driven redraws.
    pub camera_throttle: Duration,
    /// Minimum interval between tile refresh requests.
    pub tile_throttle: Duration,
    /// Poll interval for the pull fallback at this tier.
    pub update_interval: Duration,
}

impl TierSettings {
    /// Decimation parameters for this tier.
    pub fn decimation(&self) -> DecimationParams {
        DecimationParams {
            max_count: self.marker_cap,
            min_separation_m: self.min_separation_m,
        }
    }
}

/// Immutable per-tier lookup table.
#[derive(Debug, Clone, PartialEq)]
pub struct LodTable {
    pub high: TierSettings,
    pub medium: TierSettings,
    pub low: TierSettings,
}

impl LodTable {
    /// Settings for a tier.
    pub fn settings(&self, tier: LodTier) -> &TierSettings {
        match tier {
            LodTier::High => &self.high,
            LodTier::Medium => &self.medium,
            LodTier::Low => &self.low,
        }
    }
}

impl Default for LodTable {
    fn default() -> Self {
        Self {
            high: TierSettings {
                marker_cap: None,
                emission_gap: Duration::from_millis(33),
                min_separation_m: None,
                simplification_tolerance_m: 0.0,
                camera_throttle: Duration::from_millis(16),
                tile_throttle: Duration::from_millis(100),
                update_interval: Duration::from_millis(1000),
            },
            medium: TierSettings {
                marker_cap: Some(900),
                emission_gap: Duration::from_millis(66),
                min_separation_m: Some(DEFAULT_DECIMATION_SEPARATION_M),
                simplification_tolerance_m: 5.0,
                camera_throttle: Duration::from_millis(33),
                tile_throttle: Duration::from_millis(200),
                update_interval: Duration::from_millis(2000),
            },
            low: TierSettings {
                marker_cap: Some(400),
                emission_gap: Duration::from_millis(120),
                min_separation_m: Some(DEFAULT_DECIMATION_SEPARATION_M),
                simplification_tolerance_m: 15.0,
                camera_throttle: Duration::from_millis(66),
                tile_throttle: Duration::from_millis(400),
                update_interval: Duration::from_millis(3000),
            },
        }
    }
}

/// LOD controller configuration: thresholds plus the tier table.
#[derive(Debug, Clone, PartialEq)]
pub struct LodConfig {
    /// Step down one tier when FPS falls below this.
    pub drop_below_fps: f64,
    /// Step up one tier when FPS reaches this.
    pub raise_at_fps: f64,
    /// Per-tier settings.
    pub table: LodTable,
}

impl Default for LodConfig {
    fn default() -> Self {
        Self {
            drop_below_fps: DEFAULT_DROP_FPS,
            raise_at_fps: DEFAULT_RAISE_FPS,
            table: LodTable::default(),
        }
    }
}

impl LodConfig {
    /// Check that the thresholds leave a non-empty anti-thrash band.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let drop = self.drop_below_fps;
        let raise = self.raise_at_fps;
        if !drop.is_finite() || !raise.is_finite() || drop <= 0.0 || raise <= drop {
            return Err(ConfigError::InvalidThresholds { drop, raise });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table_matches_tier_contract() {
        let table = LodTable::default();

        assert_eq!(table.settings(LodTier::High).marker_cap, None);
        assert_eq!(table.settings(LodTier::Medium).marker_cap, Some(900));
        assert_eq!(table.settings(LodTier::Low).marker_cap, Some(400));

        assert_eq!(
            table.settings(LodTier::High).emission_gap,
            Duration::from_millis(33)
        );
        assert_eq!(
            table.settings(LodTier::Medium).emission_gap,
            Duration::from_millis(66)
        );
        assert_eq!(
            table.settings(LodTier::Low).emission_gap,
            Duration::from_millis(120)
        );

        assert_eq!(table.settings(LodTier::High).min_separation_m, None);
        assert_eq!(table.settings(LodTier::Low).min_separation_m, Some(100.0));
    }

    #[test]
    fn test_high_decimation_is_disabled() {
        let params = LodTable::default().high.decimation();
        assert!(!params.is_enabled());
    }

    #[test]
    fn test_default_config_validates() {
        assert!(LodConfig::default().validate().is_ok());
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let config = LodConfig {
            drop_below_fps: 58.0,
            raise_at_fps: 50.0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidThresholds { .. })
        ));
    }

    #[test]
    fn test_equal_thresholds_rejected() {
        let config = LodConfig {
            drop_below_fps: 55.0,
            raise_at_fps: 55.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
