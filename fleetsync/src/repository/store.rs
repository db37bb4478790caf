//! In-memory snapshot cache.

use std::sync::Arc;

use moka::future::Cache;

use crate::snapshot::{UnitId, UnitSnapshot};

/// Latest merged snapshot per unit.
///
/// Backed by `moka::future::Cache` so the handle can read concurrently with
/// the repository actor, which is the only writer.
#[derive(Clone)]
pub struct SnapshotStore {
    cache: Cache<UnitId, Arc<UnitSnapshot>>,
}

impl SnapshotStore {
    /// Create a store holding at most `capacity` units.
    pub fn new(capacity: u64) -> Self {
        Self {
            cache: Cache::builder().max_capacity(capacity).build(),
        }
    }

    /// Latest snapshot for a unit.
    pub async fn get(&self, unit: &UnitId) -> Option<Arc<UnitSnapshot>> {
        self.cache.get(unit).await
    }

    pub(crate) async fn insert(&self, snapshot: Arc<UnitSnapshot>) {
        self.cache.insert(snapshot.unit_id.clone(), snapshot).await;
    }

    /// Approximate number of cached units.
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    #[cfg(test)]
    pub(crate) async fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks().await;
    }
}

impl std::fmt::Debug for SnapshotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotStore")
            .field("entries", &self.cache.entry_count())
            .finish()
    }
}
