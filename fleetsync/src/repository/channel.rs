//! Per-unit output channels.
//!
//! Each materialized unit owns one `tokio::sync::broadcast` sender. The
//! sender lives behind a small mutex together with the last emitted snapshot
//! so that subscribing and closing are atomic with respect to each other:
//! the lifecycle manager can only close a channel after observing zero
//! receivers under the same lock a new subscriber takes.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tracing::trace;

use super::actor::Command;
use crate::error::EngineError;
use crate::snapshot::{UnitId, UnitSnapshot};

struct ChannelSlot {
    sender: Option<broadcast::Sender<Arc<UnitSnapshot>>>,
    latest: Option<Arc<UnitSnapshot>>,
}

struct ChannelShared {
    unit_id: UnitId,
    slot: Mutex<ChannelSlot>,
    commands: mpsc::UnboundedSender<Command>,
}

/// Bounded, lossy stream of snapshots for one unit.
///
/// Handles are cheap to clone; all clones refer to the same channel. A
/// channel closed by the lifecycle manager stays closed: existing
/// subscriptions end and [`subscribe`](UnitChannel::subscribe) fails, so the
/// caller asks the engine for a fresh one.
#[derive(Clone)]
pub struct UnitChannel {
    shared: Arc<ChannelShared>,
}

impl UnitChannel {
    pub(crate) fn new(
        unit_id: UnitId,
        capacity: usize,
        latest: Option<Arc<UnitSnapshot>>,
        commands: mpsc::UnboundedSender<Command>,
    ) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            shared: Arc::new(ChannelShared {
                unit_id,
                slot: Mutex::new(ChannelSlot {
                    sender: Some(sender),
                    latest,
                }),
                commands,
            }),
        }
    }

    /// The unit this channel carries.
    pub fn unit_id(&self) -> &UnitId {
        &self.shared.unit_id
    }

    /// Subscribe to future emissions.
    ///
    /// The subscription carries the most recent snapshot as its initial value
    /// so a late subscriber can render immediately.
    pub fn subscribe(&self) -> Result<UnitSubscription, EngineError> {
        let (rx, initial) = {
            let slot = self.shared.slot.lock();
            let Some(sender) = slot.sender.as_ref() else {
                return Err(EngineError::ChannelClosed(self.shared.unit_id.clone()));
            };
            (sender.subscribe(), slot.latest.clone())
        };

        let _ = self
            .shared
            .commands
            .send(Command::Touch(self.shared.unit_id.clone()));

        Ok(UnitSubscription {
            unit_id: self.shared.unit_id.clone(),
            initial,
            rx,
            commands: self.shared.commands.clone(),
        })
    }

    /// The most recently emitted (or seeded) snapshot.
    pub fn latest(&self) -> Option<Arc<UnitSnapshot>> {
        self.shared.slot.lock().latest.clone()
    }

    /// Number of live subscriptions.
    pub fn listener_count(&self) -> usize {
        self.shared
            .slot
            .lock()
            .sender
            .as_ref()
            .map_or(0, |s| s.receiver_count())
    }

    /// Whether the lifecycle manager has closed this channel.
    pub fn is_closed(&self) -> bool {
        self.shared.slot.lock().sender.is_none()
    }

    /// Whether two handles refer to the same channel instance.
    pub fn same_channel(&self, other: &UnitChannel) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Publish a snapshot to every subscriber. Never blocks.
    pub(crate) fn publish(&self, snapshot: Arc<UnitSnapshot>) {
        let mut slot = self.shared.slot.lock();
        slot.latest = Some(Arc::clone(&snapshot));
        if let Some(sender) = slot.sender.as_ref() {
            // No receivers is fine: the snapshot is kept as `latest`.
            let _ = sender.send(snapshot);
        }
    }

    /// Close only if nobody is subscribed. Returns `true` if closed.
    pub(crate) fn close_if_idle(&self) -> bool {
        let mut slot = self.shared.slot.lock();
        match slot.sender.as_ref() {
            Some(sender) if sender.receiver_count() > 0 => false,
            _ => {
                slot.sender = None;
                true
            }
        }
    }

    /// Close unconditionally, ending every subscription.
    pub(crate) fn close(&self) {
        self.shared.slot.lock().sender = None;
    }
}

impl std::fmt::Debug for UnitChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitChannel")
            .field("unit_id", &self.shared.unit_id)
            .field("listeners", &self.listener_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// One listener on a [`UnitChannel`].
///
/// Slow subscribers never hold up ingestion: if a subscriber falls behind by
/// more than the channel capacity, the oldest snapshots are skipped and it
/// continues from the newest one.
pub struct UnitSubscription {
    unit_id: UnitId,
    initial: Option<Arc<UnitSnapshot>>,
    rx: broadcast::Receiver<Arc<UnitSnapshot>>,
    commands: mpsc::UnboundedSender<Command>,
}

impl UnitSubscription {
    /// The unit this subscription follows.
    pub fn unit_id(&self) -> &UnitId {
        &self.unit_id
    }

    /// Snapshot that was current when the subscription was made.
    pub fn initial(&self) -> Option<&Arc<UnitSnapshot>> {
        self.initial.as_ref()
    }

    /// Take the initial snapshot, leaving `None`.
    pub fn take_initial(&mut self) -> Option<Arc<UnitSnapshot>> {
        self.initial.take()
    }

    /// Wait for the next emission. Returns `None` once the channel is closed.
    pub async fn recv(&mut self) -> Option<Arc<UnitSnapshot>> {
        loop {
            match self.rx.recv().await {
                Ok(snapshot) => return Some(snapshot),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    trace!(unit = %self.unit_id, skipped, "Subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Take an emission if one is ready.
    pub fn try_recv(&mut self) -> Option<Arc<UnitSnapshot>> {
        loop {
            match self.rx.try_recv() {
                Ok(snapshot) => return Some(snapshot),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    trace!(unit = %self.unit_id, skipped, "Subscriber lagged");
                }
                Err(_) => return None,
            }
        }
    }
}

impl Drop for UnitSubscription {
    fn drop(&mut self) {
        // Idle time starts when the last listener leaves.
        let _ = self.commands.send(Command::Touch(self.unit_id.clone()));
    }
}

impl std::fmt::Debug for UnitSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitSubscription")
            .field("unit_id", &self.unit_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn channel(capacity: usize) -> (UnitChannel, mpsc::UnboundedReceiver<Command>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (UnitChannel::new(UnitId::from("u"), capacity, None, tx), rx)
    }

    fn snap(speed: f64) -> Arc<UnitSnapshot> {
        Arc::new(UnitSnapshot::new("u", Utc::now()).with_speed(speed))
    }

    #[tokio::test]
    async fn test_subscriber_receives_published() {
        let (ch, _rx) = channel(4);
        let mut sub = ch.subscribe().unwrap();
        ch.publish(snap(1.0));

        assert_eq!(sub.recv().await.unwrap().speed, Some(1.0));
        assert_eq!(ch.latest().unwrap().speed, Some(1.0));
    }

    #[test]
    fn test_initial_value_is_latest() {
        let (ch, _rx) = channel(4);
        ch.publish(snap(7.0));

        let sub = ch.subscribe().unwrap();
        assert_eq!(sub.initial().unwrap().speed, Some(7.0));
    }

    #[test]
    fn test_subscribe_and_drop_send_touch() {
        let (ch, mut rx) = channel(4);
        let sub = ch.subscribe().unwrap();
        assert!(matches!(rx.try_recv(), Ok(Command::Touch(_))));

        drop(sub);
        assert!(matches!(rx.try_recv(), Ok(Command::Touch(_))));
    }

    #[test]
    fn test_listener_count_tracks_subscriptions() {
        let (ch, _rx) = channel(4);
        assert_eq!(ch.listener_count(), 0);

        let a = ch.subscribe().unwrap();
        let b = ch.subscribe().unwrap();
        assert_eq!(ch.listener_count(), 2);

        drop(a);
        drop(b);
        assert_eq!(ch.listener_count(), 0);
    }

    #[test]
    fn test_close_if_idle_respects_listeners() {
        let (ch, _rx) = channel(4);
        let sub = ch.subscribe().unwrap();
        assert!(!ch.close_if_idle());
        assert!(!ch.is_closed());

        drop(sub);
        assert!(ch.close_if_idle());
        assert!(ch.is_closed());
    }

    #[tokio::test]
    async fn test_close_ends_subscription() {
        let (ch, _rx) = channel(4);
        let mut sub = ch.subscribe().unwrap();
        ch.close();

        assert!(sub.recv().await.is_none());
        assert!(matches!(
            ch.subscribe(),
            Err(EngineError::ChannelClosed(_))
        ));
    }

    #[tokio::test]
    async fn test_lagging_subscriber_skips_to_newest() {
        let (ch, _rx) = channel(2);
        let mut sub = ch.subscribe().unwrap();
        for i in 0..5 {
            ch.publish(snap(i as f64));
        }

        assert_eq!(sub.recv().await.unwrap().speed, Some(3.0));
        assert_eq!(sub.recv().await.unwrap().speed, Some(4.0));
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn test_clones_are_same_channel() {
        let (a, _rx) = channel(4);
        let b = a.clone();
        let (c, _rx2) = channel(4);
        assert!(a.same_channel(&b));
        assert!(!a.same_channel(&c));
    }
}
