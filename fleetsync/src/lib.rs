//! FleetSync - telemetry synchronization and adaptive level of detail for
//! fleet-tracking maps.
//!
//! The crate keeps a map display responsive while tens to hundreds of units
//! stream position updates. It is built from five cooperating parts:
//!
//! ```text
//! push / pull ──► TelemetryRepository ──► backpressure gate ──► UnitChannel ──► map
//!                 (merge, dedupe, cache)   (gap from LOD)                        │
//!                                                                                ▼
//! frame timings ──► FrameTimingMonitor ──► LodController ──────────────────► decimate()
//! ```
//!
//! - [`frame_timing`] turns render durations into a smoothed FPS signal.
//! - [`lod`] runs the hysteretic High/Medium/Low tier state machine.
//! - [`decimate`] reduces a marker set to a bounded, well-separated subset.
//! - [`repository`] merges both sources into one snapshot per unit and owns
//!   the per-unit output channels and their lifecycle.
//! - [`engine`] wires everything together behind [`FleetSyncEngine`].
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use fleetsync::{EngineConfig, FleetSyncEngine};
//! use fleetsync::sources::{MemoryDurableCache, StaticPullSource};
//!
//! let engine = FleetSyncEngine::start(
//!     EngineConfig::default(),
//!     Arc::new(StaticPullSource::new()),
//!     Arc::new(MemoryDurableCache::new()),
//! )?;
//!
//! let channel = engine.channel_for("truck-42").await?;
//! let mut subscription = channel.subscribe()?;
//! while let Some(snapshot) = subscription.recv().await {
//!     println!("{} at {:?}", snapshot.unit_id, snapshot.position);
//! }
//! ```

pub mod config;
pub mod decimate;
pub mod engine;
pub mod error;
pub mod frame_timing;
pub mod geo;
pub mod lod;
pub mod logging;
pub mod repository;
pub mod snapshot;
pub mod sources;
pub mod telemetry;

pub use config::EngineConfig;
pub use engine::{EngineDiagnostics, FleetSyncEngine};
pub use error::{CacheError, ConfigError, EngineError, RecordError, SourceError};
pub use lod::{LodController, LodTier};
pub use snapshot::{UnitId, UnitSnapshot};

/// Library version, taken from the package manifest.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
