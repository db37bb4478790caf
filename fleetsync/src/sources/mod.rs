//! External collaborators consumed by the repository.
//!
//! The transports themselves live outside this crate. The engine only needs:
//!
//! - a **push source** that delivers [`PushMessage`]s (forwarded by the
//!   caller through [`FleetSyncEngine::submit_push`]),
//! - a [`PullSource`] it can ask for the current record of one or more units,
//! - a [`DurableCache`] that survives restarts.
//!
//! Both traits are dyn-compatible (`Arc<dyn PullSource>`) and return boxed
//! futures so implementations can be swapped without generics leaking into
//! the repository.
//!
//! [`FleetSyncEngine::submit_push`]: crate::FleetSyncEngine::submit_push

mod memory;

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CacheError, RecordError, SourceError};
use crate::snapshot::{RawRecord, UnitId, UnitSnapshot};

pub use memory::{MemoryDurableCache, StaticPullSource};

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Message delivered by the push channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum PushMessage {
    /// One or more full or partial records.
    Records(Vec<RawRecord>),
    /// Only an id; the current state must be fetched from the pull source.
    UnitRef(UnitId),
}

impl PushMessage {
    /// Decode a push message from JSON.
    pub fn from_json(json: &str) -> Result<Self, RecordError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Request/response source used as the poll fallback and for id-reference
/// pushes.
pub trait PullSource: Send + Sync {
    /// Fetch the current record for one unit.
    ///
    /// `Ok(None)` means the source knows nothing about the unit.
    fn fetch(&self, unit: UnitId) -> BoxFuture<'_, Result<Option<RawRecord>, SourceError>>;

    /// Fetch current records for a batch of units.
    ///
    /// The default issues one [`fetch`](PullSource::fetch) per id
    /// concurrently. A failure for one id is logged and skipped; the batch
    /// only fails if every fetch failed.
    fn fetch_batch(
        &self,
        units: Vec<UnitId>,
    ) -> BoxFuture<'_, Result<Vec<RawRecord>, SourceError>> {
        Box::pin(async move {
            let requested = units.len();
            let results =
                futures::future::join_all(units.into_iter().map(|unit| self.fetch(unit))).await;

            let mut records = Vec::with_capacity(requested);
            let mut last_error = None;
            for result in results {
                match result {
                    Ok(Some(record)) => records.push(record),
                    Ok(None) => {}
                    Err(e) => {
                        debug!(error = %e, "Batch fetch entry failed");
                        last_error = Some(e);
                    }
                }
            }

            match last_error {
                Some(e) if records.is_empty() && requested > 0 => Err(e),
                _ => Ok(records),
            }
        })
    }
}

/// Persistent snapshot store that outlives the process.
///
/// Writes are fire-and-forget from the engine's point of view: the
/// repository spawns `put` and only logs a failure.
pub trait DurableCache: Send + Sync {
    /// Load the persisted snapshot for a unit.
    fn get(&self, unit: UnitId) -> BoxFuture<'_, Result<Option<UnitSnapshot>, CacheError>>;

    /// Persist a snapshot, replacing any previous one for the same unit.
    fn put(&self, snapshot: UnitSnapshot) -> BoxFuture<'_, Result<(), CacheError>>;
}

/// Durable cache that stores nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDurableCache;

impl DurableCache for NoDurableCache {
    fn get(&self, _unit: UnitId) -> BoxFuture<'_, Result<Option<UnitSnapshot>, CacheError>> {
        Box::pin(async { Ok(None) })
    }

    fn put(&self, _snapshot: UnitSnapshot) -> BoxFuture<'_, Result<(), CacheError>> {
        Box::pin(async { Ok(()) })
    }
}
