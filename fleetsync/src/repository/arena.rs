//! Channel state arena keyed by unit id.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::time::Instant;
use tokio_util::time::delay_queue;

use super::channel::UnitChannel;
use crate::snapshot::{UnitId, UnitSnapshot};

/// Bookkeeping for one materialized unit channel.
#[derive(Debug)]
pub(crate) struct ChannelState {
    pub(crate) channel: UnitChannel,
    pub(crate) last_emitted: Option<Instant>,
    /// At most one coalesced update waiting for the gap to elapse. Only the
    /// arena writes it so the running pending count stays exact.
    pending: Option<Arc<UnitSnapshot>>,
    /// Scheduled flush of `pending`. Set only while the entry is in the
    /// delay queue.
    pub(crate) delay_key: Option<delay_queue::Key>,
    pub(crate) last_access: Instant,
    /// Monotonic access stamp; orders channels by recency even when two
    /// accesses share an instant.
    pub(crate) access_seq: u64,
}

impl ChannelState {
    /// No subscriber is listening.
    pub(crate) fn is_idle(&self) -> bool {
        self.channel.listener_count() == 0
    }

    /// Whether a coalesced update is waiting.
    pub(crate) fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Publish and record the emission instant.
    pub(crate) fn emit(&mut self, snapshot: Arc<UnitSnapshot>, now: Instant) {
        self.channel.publish(snapshot);
        self.last_emitted = Some(now);
    }
}

/// All materialized channels, owned by the repository actor.
#[derive(Debug, Default)]
pub(crate) struct ChannelArena {
    channels: HashMap<UnitId, ChannelState>,
    /// Channels whose pending slot is filled.
    pending: usize,
    next_seq: u64,
}

impl ChannelArena {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.channels.len()
    }

    pub(crate) fn contains(&self, unit: &UnitId) -> bool {
        self.channels.contains_key(unit)
    }

    pub(crate) fn get(&self, unit: &UnitId) -> Option<&ChannelState> {
        self.channels.get(unit)
    }

    pub(crate) fn get_mut(&mut self, unit: &UnitId) -> Option<&mut ChannelState> {
        self.channels.get_mut(unit)
    }

    /// Insert a new channel. Replaces any previous state for the unit.
    pub(crate) fn insert(&mut self, unit: UnitId, channel: UnitChannel, now: Instant) {
        let access_seq = self.bump();
        let previous = self.channels.insert(
            unit,
            ChannelState {
                channel,
                last_emitted: None,
                pending: None,
                delay_key: None,
                last_access: now,
                access_seq,
            },
        );
        if previous.is_some_and(|state| state.has_pending()) {
            self.pending -= 1;
        }
    }

    /// Refresh the last-access stamp. Returns `false` if the unit has no
    /// channel.
    pub(crate) fn touch(&mut self, unit: &UnitId, now: Instant) -> bool {
        let seq = self.next_seq;
        match self.channels.get_mut(unit) {
            Some(state) => {
                state.last_access = now;
                state.access_seq = seq;
                self.next_seq += 1;
                true
            }
            None => false,
        }
    }

    pub(crate) fn remove(&mut self, unit: &UnitId) -> Option<ChannelState> {
        let state = self.channels.remove(unit)?;
        if state.has_pending() {
            self.pending -= 1;
        }
        Some(state)
    }

    /// Park `snapshot` in the unit's pending slot. Returns `true` if it
    /// replaced an earlier pending update.
    pub(crate) fn replace_pending(&mut self, unit: &UnitId, snapshot: Arc<UnitSnapshot>) -> bool {
        let Some(state) = self.channels.get_mut(unit) else {
            return false;
        };
        let replaced = state.pending.replace(snapshot).is_some();
        if !replaced {
            self.pending += 1;
        }
        replaced
    }

    /// Empty the unit's pending slot.
    pub(crate) fn take_pending(&mut self, unit: &UnitId) -> Option<Arc<UnitSnapshot>> {
        let taken = self.channels.get_mut(unit)?.pending.take();
        if taken.is_some() {
            self.pending -= 1;
        }
        taken
    }

    /// Ids of every materialized channel.
    pub(crate) fn units(&self) -> Vec<UnitId> {
        self.channels.keys().cloned().collect()
    }

    /// Idle channels, least recently accessed first.
    pub(crate) fn idle_by_age(&self) -> Vec<UnitId> {
        let mut idle: Vec<(&UnitId, u64)> = self
            .channels
            .iter()
            .filter(|(_, state)| state.is_idle())
            .map(|(unit, state)| (unit, state.access_seq))
            .collect();
        idle.sort_by_key(|&(_, seq)| seq);
        idle.into_iter().map(|(unit, _)| unit.clone()).collect()
    }

    /// Idle channels whose last access is more than `timeout` before `now`.
    pub(crate) fn expired_idle(&self, now: Instant, timeout: std::time::Duration) -> Vec<UnitId> {
        self.channels
            .iter()
            .filter(|(_, state)| {
                state.is_idle() && now.saturating_duration_since(state.last_access) > timeout
            })
            .map(|(unit, _)| unit.clone())
            .collect()
    }

    /// Number of channels holding a coalesced update.
    pub(crate) fn pending_count(&self) -> usize {
        self.pending
    }

    fn bump(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;

    type Commands = mpsc::UnboundedReceiver<super::super::actor::Command>;

    fn arena_at(units: &[&str], now: Instant) -> (ChannelArena, Commands) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut arena = ChannelArena::new();
        for unit in units {
            let id = UnitId::from(*unit);
            arena.insert(id.clone(), UnitChannel::new(id, 4, None, tx.clone()), now);
        }
        (arena, rx)
    }

    fn arena_with(units: &[&str]) -> (ChannelArena, Commands) {
        arena_at(units, Instant::now())
    }

    #[test]
    fn test_idle_by_age_orders_by_access() {
        let (mut arena, _rx) = arena_with(&["a", "b", "c"]);
        let now = Instant::now();
        arena.touch(&UnitId::from("a"), now);

        assert_eq!(
            arena.idle_by_age(),
            vec![UnitId::from("b"), UnitId::from("c"), UnitId::from("a")]
        );
    }

    #[test]
    fn test_idle_by_age_excludes_listened() {
        let (arena, _rx) = arena_with(&["a", "b"]);
        let _sub = arena.get(&UnitId::from("a")).unwrap().channel.subscribe().unwrap();

        assert_eq!(arena.idle_by_age(), vec![UnitId::from("b")]);
    }

    #[test]
    fn test_expired_idle_uses_timeout() {
        let now = Instant::now();
        let (arena, _rx) = arena_at(&["a"], now);
        let timeout = Duration::from_secs(60);

        assert!(arena.expired_idle(now + timeout, timeout).is_empty());
        assert_eq!(
            arena.expired_idle(now + timeout + Duration::from_millis(1), timeout),
            vec![UnitId::from("a")]
        );
    }

    fn snapshot(unit: &str) -> Arc<UnitSnapshot> {
        Arc::new(UnitSnapshot::new(unit, chrono::Utc::now()))
    }

    #[test]
    fn test_pending_count_tracks_slots() {
        let (mut arena, _rx) = arena_with(&["a", "b"]);
        let a = UnitId::from("a");
        let b = UnitId::from("b");

        assert!(!arena.replace_pending(&a, snapshot("a")));
        assert!(arena.replace_pending(&a, snapshot("a")));
        assert!(!arena.replace_pending(&b, snapshot("b")));
        assert_eq!(arena.pending_count(), 2);

        assert!(arena.take_pending(&a).is_some());
        assert!(arena.take_pending(&a).is_none());
        assert_eq!(arena.pending_count(), 1);

        arena.remove(&b);
        assert_eq!(arena.pending_count(), 0);
    }

    #[test]
    fn test_pending_on_unknown_unit_is_ignored() {
        let (mut arena, _rx) = arena_with(&[]);
        let x = UnitId::from("x");

        assert!(!arena.replace_pending(&x, snapshot("x")));
        assert!(arena.take_pending(&x).is_none());
        assert_eq!(arena.pending_count(), 0);
    }

    #[test]
    fn test_reinsert_drops_pending() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let (mut arena, _rx2) = arena_with(&["a"]);
        let a = UnitId::from("a");
        arena.replace_pending(&a, snapshot("a"));

        arena.insert(a.clone(), UnitChannel::new(a.clone(), 4, None, tx), Instant::now());

        assert_eq!(arena.pending_count(), 0);
        assert!(!arena.get(&a).unwrap().has_pending());
    }

    #[test]
    fn test_touch_unknown_unit() {
        let (mut arena, _rx) = arena_with(&[]);
        assert!(!arena.touch(&UnitId::from("x"), Instant::now()));
    }
}
