//! Typed configuration keys.
//!
//! Every INI setting is one [`ConfigKey`]. The key table drives loading,
//! rendering and the CLI's `config get/set/list`, so adding a setting means
//! adding one variant here.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use super::EngineConfig;
use crate::error::ConfigError;
use crate::lod::{LodTier, TierSettings};

/// Value spelled for an unbounded marker cap.
const UNBOUNDED: &str = "unbounded";

/// Value spelled for disabled decimation separation.
const DISABLED: &str = "disabled";

/// One configurable setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    LodDropBelowFps,
    LodRaiseAtFps,
    LodMarkerCap(LodTier),
    LodEmissionGapMs(LodTier),
    LodSeparationM(LodTier),
    FrameTimingWindowMs,
    FrameTimingReportDeltaFps,
    FrameTimingTickMs,
    FrameTimingMaxSamples,
    RepositoryChannelCapacity,
    RepositorySnapshotCacheCapacity,
    RepositoryFetchMemoMs,
    LifecycleMaxChannels,
    LifecycleIdleTimeoutSecs,
    LifecycleSweepIntervalSecs,
    LoggingLevel,
    LoggingDirectory,
}

impl ConfigKey {
    /// Every key, in file order.
    pub fn all() -> Vec<ConfigKey> {
        let mut keys = vec![ConfigKey::LodDropBelowFps, ConfigKey::LodRaiseAtFps];
        for tier in LodTier::ALL {
            keys.push(ConfigKey::LodMarkerCap(tier));
            keys.push(ConfigKey::LodEmissionGapMs(tier));
            keys.push(ConfigKey::LodSeparationM(tier));
        }
        keys.extend([
            ConfigKey::FrameTimingWindowMs,
            ConfigKey::FrameTimingReportDeltaFps,
            ConfigKey::FrameTimingTickMs,
            ConfigKey::FrameTimingMaxSamples,
            ConfigKey::RepositoryChannelCapacity,
            ConfigKey::RepositorySnapshotCacheCapacity,
            ConfigKey::RepositoryFetchMemoMs,
            ConfigKey::LifecycleMaxChannels,
            ConfigKey::LifecycleIdleTimeoutSecs,
            ConfigKey::LifecycleSweepIntervalSecs,
            ConfigKey::LoggingLevel,
            ConfigKey::LoggingDirectory,
        ]);
        keys
    }

    /// INI section.
    pub fn section(&self) -> &'static str {
        match self {
            ConfigKey::LodDropBelowFps
            | ConfigKey::LodRaiseAtFps
            | ConfigKey::LodMarkerCap(_)
            | ConfigKey::LodEmissionGapMs(_)
            | ConfigKey::LodSeparationM(_) => "lod",
            ConfigKey::FrameTimingWindowMs
            | ConfigKey::FrameTimingReportDeltaFps
            | ConfigKey::FrameTimingTickMs
            | ConfigKey::FrameTimingMaxSamples => "frame_timing",
            ConfigKey::RepositoryChannelCapacity
            | ConfigKey::RepositorySnapshotCacheCapacity
            | ConfigKey::RepositoryFetchMemoMs => "repository",
            ConfigKey::LifecycleMaxChannels
            | ConfigKey::LifecycleIdleTimeoutSecs
            | ConfigKey::LifecycleSweepIntervalSecs => "lifecycle",
            ConfigKey::LoggingLevel | ConfigKey::LoggingDirectory => "logging",
        }
    }

    /// Key name within the section.
    pub fn key_name(&self) -> &'static str {
        match self {
            ConfigKey::LodDropBelowFps => "drop_below_fps",
            ConfigKey::LodRaiseAtFps => "raise_at_fps",
            ConfigKey::LodMarkerCap(tier) => match tier {
                LodTier::High => "high_marker_cap",
                LodTier::Medium => "medium_marker_cap",
                LodTier::Low => "low_marker_cap",
            },
            ConfigKey::LodEmissionGapMs(tier) => match tier {
                LodTier::High => "high_emission_gap_ms",
                LodTier::Medium => "medium_emission_gap_ms",
                LodTier::Low => "low_emission_gap_ms",
            },
            ConfigKey::LodSeparationM(tier) => match tier {
                LodTier::High => "high_separation_m",
                LodTier::Medium => "medium_separation_m",
                LodTier::Low => "low_separation_m",
            },
            ConfigKey::FrameTimingWindowMs => "window_ms",
            ConfigKey::FrameTimingReportDeltaFps => "report_delta_fps",
            ConfigKey::FrameTimingTickMs => "tick_ms",
            ConfigKey::FrameTimingMaxSamples => "max_samples",
            ConfigKey::RepositoryChannelCapacity => "channel_capacity",
            ConfigKey::RepositorySnapshotCacheCapacity => "snapshot_cache_capacity",
            ConfigKey::RepositoryFetchMemoMs => "fetch_memo_ms",
            ConfigKey::LifecycleMaxChannels => "max_channels",
            ConfigKey::LifecycleIdleTimeoutSecs => "idle_timeout_secs",
            ConfigKey::LifecycleSweepIntervalSecs => "sweep_interval_secs",
            ConfigKey::LoggingLevel => "level",
            ConfigKey::LoggingDirectory => "directory",
        }
    }

    /// Full `section.key` name.
    pub fn name(&self) -> String {
        format!("{}.{}", self.section(), self.key_name())
    }

    /// Current value rendered as it would appear in the file. Empty means
    /// unset.
    pub fn get(&self, config: &EngineConfig) -> String {
        match self {
            ConfigKey::LodDropBelowFps => config.lod.drop_below_fps.to_string(),
            ConfigKey::LodRaiseAtFps => config.lod.raise_at_fps.to_string(),
            ConfigKey::LodMarkerCap(tier) => match tier_settings(config, *tier).marker_cap {
                Some(cap) => cap.to_string(),
                None => UNBOUNDED.to_string(),
            },
            ConfigKey::LodEmissionGapMs(tier) => {
                millis(tier_settings(config, *tier).emission_gap)
            }
            ConfigKey::LodSeparationM(tier) => match tier_settings(config, *tier).min_separation_m
            {
                Some(m) => m.to_string(),
                None => DISABLED.to_string(),
            },
            ConfigKey::FrameTimingWindowMs => millis(config.frame_timing.window),
            ConfigKey::FrameTimingReportDeltaFps => {
                config.frame_timing.report_delta_fps.to_string()
            }
            ConfigKey::FrameTimingTickMs => millis(config.frame_timing.tick_interval),
            ConfigKey::FrameTimingMaxSamples => config.frame_timing.max_samples.to_string(),
            ConfigKey::RepositoryChannelCapacity => config.repository.channel_capacity.to_string(),
            ConfigKey::RepositorySnapshotCacheCapacity => {
                config.repository.snapshot_cache_capacity.to_string()
            }
            ConfigKey::RepositoryFetchMemoMs => millis(config.repository.fetch_memo_ttl),
            ConfigKey::LifecycleMaxChannels => config.lifecycle.max_channels.to_string(),
            ConfigKey::LifecycleIdleTimeoutSecs => {
                config.lifecycle.idle_timeout.as_secs().to_string()
            }
            ConfigKey::LifecycleSweepIntervalSecs => {
                config.lifecycle.sweep_interval.as_secs().to_string()
            }
            ConfigKey::LoggingLevel => config.logging.level.clone(),
            ConfigKey::LoggingDirectory => config
                .logging
                .directory
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        }
    }

    /// Parse `value` and store it in `config`.
    pub fn set(&self, config: &mut EngineConfig, value: &str) -> Result<(), ConfigError> {
        let value = value.trim();
        match self {
            ConfigKey::LodDropBelowFps => config.lod.drop_below_fps = self.parse(value)?,
            ConfigKey::LodRaiseAtFps => config.lod.raise_at_fps = self.parse(value)?,
            ConfigKey::LodMarkerCap(tier) => {
                let cap = if value.eq_ignore_ascii_case(UNBOUNDED) || value.is_empty() {
                    None
                } else {
                    Some(self.parse(value)?)
                };
                tier_settings_mut(config, *tier).marker_cap = cap;
            }
            ConfigKey::LodEmissionGapMs(tier) => {
                tier_settings_mut(config, *tier).emission_gap =
                    Duration::from_millis(self.parse(value)?);
            }
            ConfigKey::LodSeparationM(tier) => {
                let separation = if value.eq_ignore_ascii_case(DISABLED) || value.is_empty() {
                    None
                } else {
                    let m: f64 = self.parse(value)?;
                    if !m.is_finite() || m < 0.0 {
                        return Err(self.invalid(value));
                    }
                    Some(m)
                };
                tier_settings_mut(config, *tier).min_separation_m = separation;
            }
            ConfigKey::FrameTimingWindowMs => {
                config.frame_timing.window = Duration::from_millis(self.parse(value)?)
            }
            ConfigKey::FrameTimingReportDeltaFps => {
                let delta: f64 = self.parse(value)?;
                if !delta.is_finite() || delta < 0.0 {
                    return Err(self.invalid(value));
                }
                config.frame_timing.report_delta_fps = delta;
            }
            ConfigKey::FrameTimingTickMs => {
                config.frame_timing.tick_interval = Duration::from_millis(self.parse(value)?)
            }
            ConfigKey::FrameTimingMaxSamples => {
                config.frame_timing.max_samples = self.parse(value)?
            }
            ConfigKey::RepositoryChannelCapacity => {
                config.repository.channel_capacity = self.parse(value)?
            }
            ConfigKey::RepositorySnapshotCacheCapacity => {
                config.repository.snapshot_cache_capacity = self.parse(value)?
            }
            ConfigKey::RepositoryFetchMemoMs => {
                config.repository.fetch_memo_ttl = Duration::from_millis(self.parse(value)?)
            }
            ConfigKey::LifecycleMaxChannels => config.lifecycle.max_channels = self.parse(value)?,
            ConfigKey::LifecycleIdleTimeoutSecs => {
                config.lifecycle.idle_timeout = Duration::from_secs(self.parse(value)?)
            }
            ConfigKey::LifecycleSweepIntervalSecs => {
                config.lifecycle.sweep_interval = Duration::from_secs(self.parse(value)?)
            }
            ConfigKey::LoggingLevel => {
                if value.is_empty() {
                    return Err(self.invalid(value));
                }
                config.logging.level = value.to_string();
            }
            ConfigKey::LoggingDirectory => {
                config.logging.directory = if value.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(value))
                };
            }
        }
        Ok(())
    }

    fn parse<T: FromStr>(&self, value: &str) -> Result<T, ConfigError> {
        value.parse().map_err(|_| self.invalid(value))
    }

    fn invalid(&self, value: &str) -> ConfigError {
        ConfigError::InvalidValue {
            section: self.section(),
            key: self.key_name(),
            value: value.to_string(),
        }
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.section(), self.key_name())
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConfigKey::all()
            .into_iter()
            .find(|key| key.name() == s)
            .ok_or_else(|| ConfigError::Parse(format!("unknown configuration key '{}'", s)))
    }
}

fn tier_settings(config: &EngineConfig, tier: LodTier) -> &TierSettings {
    config.lod.table.settings(tier)
}

fn tier_settings_mut(config: &mut EngineConfig, tier: LodTier) -> &mut TierSettings {
    match tier {
        LodTier::High => &mut config.lod.table.high,
        LodTier::Medium => &mut config.lod.table.medium,
        LodTier::Low => &mut config.lod.table.low,
    }
}

fn millis(duration: Duration) -> String {
    duration.as_millis().to_string()
}
