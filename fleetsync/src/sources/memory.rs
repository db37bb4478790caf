//! In-memory collaborators for tests and the simulator.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use super::{BoxFuture, DurableCache, PullSource};
use crate::error::{CacheError, SourceError};
use crate::snapshot::{RawRecord, UnitId, UnitSnapshot};

/// Durable cache backed by a map of JSON documents.
///
/// Snapshots go through `serde_json` on the way in and out so the
/// serialization path is exercised the same way a file or database backend
/// would exercise it.
#[derive(Debug, Default)]
pub struct MemoryDurableCache {
    entries: Mutex<HashMap<UnitId, String>>,
    failing: AtomicBool,
    puts: AtomicU64,
}

impl MemoryDurableCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with a backend error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Seed a snapshot directly.
    pub fn insert(&self, snapshot: &UnitSnapshot) -> Result<(), CacheError> {
        let json = serde_json::to_string(snapshot)?;
        self.entries.lock().insert(snapshot.unit_id.clone(), json);
        Ok(())
    }

    /// Read a stored snapshot synchronously.
    pub fn stored(&self, unit: &UnitId) -> Option<UnitSnapshot> {
        let entries = self.entries.lock();
        let json = entries.get(unit)?;
        serde_json::from_str(json).ok()
    }

    /// Number of stored units.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Number of successful `put` calls.
    pub fn put_count(&self) -> u64 {
        self.puts.load(Ordering::Relaxed)
    }

    fn check(&self) -> Result<(), CacheError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CacheError::Backend("memory cache set to fail".to_string()));
        }
        Ok(())
    }
}

impl DurableCache for MemoryDurableCache {
    fn get(&self, unit: UnitId) -> BoxFuture<'_, Result<Option<UnitSnapshot>, CacheError>> {
        Box::pin(async move {
            self.check()?;
            let json = self.entries.lock().get(&unit).cloned();
            match json {
                Some(json) => Ok(Some(serde_json::from_str(&json)?)),
                None => Ok(None),
            }
        })
    }

    fn put(&self, snapshot: UnitSnapshot) -> BoxFuture<'_, Result<(), CacheError>> {
        Box::pin(async move {
            self.check()?;
            self.insert(&snapshot)?;
            self.puts.fetch_add(1, Ordering::Relaxed);
            Ok(())
        })
    }
}

/// Pull source answering from a mutable table of records.
#[derive(Debug, Default)]
pub struct StaticPullSource {
    records: Mutex<HashMap<UnitId, RawRecord>>,
    failing_units: Mutex<HashSet<UnitId>>,
    failing: AtomicBool,
    latency: Mutex<Option<Duration>>,
    fetches: AtomicU64,
}

impl StaticPullSource {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every fetch by `latency`.
    pub fn with_latency(self, latency: Duration) -> Self {
        *self.latency.lock() = Some(latency);
        self
    }

    /// Set the record returned for its unit. Records without an id are ignored.
    pub fn set(&self, record: RawRecord) {
        if let Some(id) = record.unit_id.clone() {
            self.records.lock().insert(UnitId::new(id), record);
        }
    }

    /// Forget a unit.
    pub fn remove(&self, unit: &UnitId) {
        self.records.lock().remove(unit);
    }

    /// Make fetches for one unit fail.
    pub fn fail_unit(&self, unit: impl Into<UnitId>) {
        self.failing_units.lock().insert(unit.into());
    }

    /// Make every fetch fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of single-unit fetches served so far, failed ones included.
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl PullSource for StaticPullSource {
    fn fetch(&self, unit: UnitId) -> BoxFuture<'_, Result<Option<RawRecord>, SourceError>> {
        Box::pin(async move {
            self.fetches.fetch_add(1, Ordering::SeqCst);

            let latency = *self.latency.lock();
            if let Some(latency) = latency {
                tokio::time::sleep(latency).await;
            }

            if self.failing.load(Ordering::SeqCst) || self.failing_units.lock().contains(&unit) {
                return Err(SourceError::Unavailable(format!("fetch {} refused", unit)));
            }

            Ok(self.records.lock().get(&unit).cloned())
        })
    }
}
