//! Error types shared across the engine.
//!
//! Each concern has its own enum so callers can match on what actually
//! failed. None of these are surfaced to map consumers directly: malformed
//! records and transport failures are logged and counted, and consumers keep
//! seeing the last successfully merged snapshot.

use std::path::PathBuf;

use thiserror::Error;

use crate::snapshot::UnitId;

/// A raw record that cannot be turned into a snapshot.
///
/// Malformed records are dropped one at a time; siblings in the same batch
/// are unaffected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecordError {
    /// The record carries no unit id (or an empty one).
    #[error("record has no unit id")]
    MissingId,

    /// The record has no source timestamp, so it cannot be ordered.
    #[error("record for unit {unit} has no source timestamp")]
    MissingTimestamp { unit: UnitId },

    /// Only one of latitude/longitude is present.
    #[error("record for unit {unit} has an incomplete position")]
    IncompletePosition { unit: UnitId },

    /// Latitude/longitude are non-finite or out of range.
    #[error("record for unit {unit} has an invalid position ({lat}, {lon})")]
    InvalidPosition { unit: UnitId, lat: f64, lon: f64 },

    /// The record could not be decoded at all.
    #[error("unparseable record: {0}")]
    Parse(String),
}

impl From<serde_json::Error> for RecordError {
    fn from(e: serde_json::Error) -> Self {
        RecordError::Parse(e.to_string())
    }
}

/// Failure reported by a push or pull source.
///
/// The engine does not retry; reconnection belongs to an external health
/// collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// The source is disconnected or otherwise unreachable.
    #[error("source unavailable: {0}")]
    Unavailable(String),

    /// The request did not complete in time.
    #[error("source request timed out")]
    Timeout,

    /// The source answered with a failure status.
    #[error("source returned status {0}")]
    Status(u16),
}

/// Failure of the durable cache collaborator.
#[derive(Debug, Error)]
pub enum CacheError {
    /// I/O error while reading or writing the durable store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backend-specific failure.
    #[error("cache backend error: {0}")]
    Backend(String),
}

/// Failure while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read or written.
    #[error("failed to access config file {path}: {message}")]
    Io { path: PathBuf, message: String },

    /// The configuration file is not valid INI.
    #[error("failed to parse config: {0}")]
    Parse(String),

    /// A key holds a value of the wrong type or range.
    #[error("invalid value '{value}' for [{section}] {key}")]
    InvalidValue {
        section: &'static str,
        key: &'static str,
        value: String,
    },

    /// The LOD raise threshold must lie strictly above the drop threshold.
    #[error("raise threshold {raise} FPS must be greater than drop threshold {drop} FPS")]
    InvalidThresholds { drop: f64, raise: f64 },

    /// No home/config directory could be determined.
    #[error("could not determine the configuration directory")]
    NoConfigDir,
}

/// Failure of an engine operation exposed to the map layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The repository has been disposed; the call was a no-op.
    #[error("telemetry engine has been disposed")]
    Disposed,

    /// The channel was closed by the lifecycle manager; request a new one.
    #[error("channel for unit {0} has been closed")]
    ChannelClosed(UnitId),

    /// The engine was started outside a tokio runtime.
    #[error("no tokio runtime available to host the telemetry engine")]
    NoRuntime,

    /// The engine configuration was rejected.
    #[error("invalid engine configuration: {0}")]
    InvalidConfig(String),
}

impl From<ConfigError> for EngineError {
    fn from(e: ConfigError) -> Self {
        EngineError::InvalidConfig(e.to_string())
    }
}

/// Failure while installing the tracing subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The filter directive could not be parsed.
    #[error("invalid log filter '{directive}': {message}")]
    InvalidFilter { directive: String, message: String },

    /// A global subscriber is already installed.
    #[error("failed to install log subscriber: {0}")]
    Init(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_error_display_names_unit() {
        let err = RecordError::InvalidPosition {
            unit: UnitId::from("truck-7"),
            lat: 91.0,
            lon: 0.0,
        };
        let msg = err.to_string();
        assert!(msg.contains("truck-7"));
        assert!(msg.contains("91"));
    }

    #[test]
    fn test_record_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: RecordError = json_err.into();
        assert!(matches!(err, RecordError::Parse(_)));
    }

    #[test]
    fn test_cache_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: CacheError = io_err.into();
        assert!(matches!(err, CacheError::Io(_)));
    }

    #[test]
    fn test_config_error_thresholds_display() {
        let err = ConfigError::InvalidThresholds {
            drop: 58.0,
            raise: 50.0,
        };
        let msg = err.to_string();
        assert!(msg.contains("58"));
        assert!(msg.contains("50"));
    }

    #[test]
    fn test_engine_error_display() {
        assert_eq!(
            EngineError::Disposed.to_string(),
            "telemetry engine has been disposed"
        );
        let err = EngineError::ChannelClosed(UnitId::from(42u64));
        assert!(err.to_string().contains("42"));
    }

    #[test]
    fn test_engine_error_from_config_error() {
        let err: EngineError = ConfigError::NoConfigDir.into();
        assert!(matches!(err, EngineError::InvalidConfig(_)));
    }
}
