//! Engine configuration.
//!
//! [`EngineConfig`] aggregates the configuration of every component. It can
//! be built in code (every struct implements `Default`) or loaded from an INI
//! file at `~/.config/fleetsync/config.ini`:
//!
//! ```ini
//! [lod]
//! drop_below_fps = 50
//! raise_at_fps = 58
//! low_marker_cap = 400
//! low_emission_gap_ms = 120
//!
//! [frame_timing]
//! window_ms = 1000
//!
//! [lifecycle]
//! max_channels = 200
//!
//! [logging]
//! level = info
//! ```
//!
//! Missing keys keep their defaults and unknown keys are ignored.

mod file;
mod keys;

use crate::error::ConfigError;
use crate::frame_timing::FrameTimingConfig;
use crate::lod::LodConfig;
use crate::logging::LoggingConfig;
use crate::repository::{LifecycleConfig, RepositoryConfig};

pub use file::{config_directory, config_file_path, CONFIG_FILE_NAME};
pub use keys::ConfigKey;

/// Configuration for the whole engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineConfig {
    pub lod: LodConfig,
    pub frame_timing: FrameTimingConfig,
    pub repository: RepositoryConfig,
    pub lifecycle: LifecycleConfig,
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.lod.validate()?;

        if self.frame_timing.window.is_zero() {
            return Err(ConfigError::InvalidValue {
                section: "frame_timing",
                key: "window_ms",
                value: "0".to_string(),
            });
        }
        if self.frame_timing.max_samples == 0 {
            return Err(ConfigError::InvalidValue {
                section: "frame_timing",
                key: "max_samples",
                value: "0".to_string(),
            });
        }
        if self.repository.channel_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                section: "repository",
                key: "channel_capacity",
                value: "0".to_string(),
            });
        }
        if self.lifecycle.max_channels == 0 {
            return Err(ConfigError::InvalidValue {
                section: "lifecycle",
                key: "max_channels",
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}
