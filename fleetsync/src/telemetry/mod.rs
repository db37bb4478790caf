//! Engine telemetry for diagnostics.
//!
//! Lock-free atomic counters updated from the repository actor, the fetch
//! tasks and the durable-write tasks, read through a point-in-time copy.
//!
//! # Architecture
//!
//! ```text
//! Repository actor ─────► EngineMetrics ─────► MetricsSnapshot ─────► Views
//! spawned tasks           (atomic counters)    (point-in-time copy)   (CLI, logs)
//! ```
//!
//! # Example
//!
//! ```
//! use fleetsync::telemetry::EngineMetrics;
//!
//! let metrics = EngineMetrics::new();
//! metrics.record_ingested();
//! metrics.record_coalesced();
//!
//! let snapshot = metrics.snapshot();
//! assert_eq!(snapshot.ingested, 1);
//! assert_eq!(snapshot.coalesced, 1);
//! ```

mod metrics;
mod snapshot;

pub use metrics::EngineMetrics;
pub use snapshot::MetricsSnapshot;
