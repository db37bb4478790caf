//! Channel lifecycle: idle sweep and proactive eviction.
//!
//! Two mechanisms bound the number of materialized channels:
//!
//! - **Sweep**: on a fixed period, every channel with no listeners whose
//!   last access is older than the idle timeout is closed and removed.
//! - **Eviction**: before a new channel is created while the arena is at
//!   the cap, exactly one idle channel (the least recently accessed) is
//!   closed. If every channel has a listener nothing is evicted and the cap
//!   is exceeded until listeners leave.
//!
//! A channel with at least one listener is never closed by either path. The
//! listener check and the close happen under the channel's own lock, so a
//! subscriber racing the lifecycle manager either keeps the channel alive or
//! receives `ChannelClosed` and asks again.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::time::DelayQueue;

use super::arena::ChannelArena;
use crate::snapshot::UnitId;

// ==================== Defaults ====================

/// Default cap on simultaneously materialized channels.
pub const DEFAULT_MAX_CHANNELS: usize = 200;

/// Default idle time after which a listener-less channel is swept.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Default sweep period.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Channel lifecycle configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleConfig {
    /// Cap on materialized channels.
    pub max_channels: usize,
    /// Idle time before a listener-less channel is swept.
    pub idle_timeout: Duration,
    /// Sweep period.
    pub sweep_interval: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            max_channels: DEFAULT_MAX_CHANNELS,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

/// Result of [`ChannelLifecycle::make_room`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Eviction {
    /// The unit already has a channel or the arena is below the cap.
    NotNeeded,
    /// This idle channel was closed.
    Evicted(UnitId),
    /// Every channel has a listener.
    Starved,
}

/// Lifecycle policy applied by the repository actor.
#[derive(Debug, Clone)]
pub(crate) struct ChannelLifecycle {
    config: LifecycleConfig,
}

impl ChannelLifecycle {
    pub(crate) fn new(config: LifecycleConfig) -> Self {
        Self { config }
    }

    pub(crate) fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Evict one idle channel if creating one for `unit` would exceed the cap.
    pub(crate) fn make_room(
        &self,
        arena: &mut ChannelArena,
        delays: &mut DelayQueue<UnitId>,
        unit: &UnitId,
    ) -> Eviction {
        if arena.contains(unit) || arena.len() < self.config.max_channels {
            return Eviction::NotNeeded;
        }

        for candidate in arena.idle_by_age() {
            if teardown(arena, delays, &candidate, false) {
                return Eviction::Evicted(candidate);
            }
        }
        Eviction::Starved
    }

    /// Close every idle channel past the idle timeout. Returns the closed ids.
    pub(crate) fn sweep(
        &self,
        arena: &mut ChannelArena,
        delays: &mut DelayQueue<UnitId>,
        now: Instant,
    ) -> Vec<UnitId> {
        arena
            .expired_idle(now, self.config.idle_timeout)
            .into_iter()
            .filter(|unit| teardown(arena, delays, unit, false))
            .collect()
    }
}

/// Close and remove one channel, cancelling its scheduled flush.
///
/// Without `force` the channel is only closed if it has no listeners.
/// Returns `true` if the channel was removed.
pub(crate) fn teardown(
    arena: &mut ChannelArena,
    delays: &mut DelayQueue<UnitId>,
    unit: &UnitId,
    force: bool,
) -> bool {
    let Some(state) = arena.get(unit) else {
        return false;
    };

    if force {
        state.channel.close();
    } else if !state.channel.close_if_idle() {
        return false;
    }

    if let Some(state) = arena.remove(unit) {
        if let Some(key) = state.delay_key {
            delays.remove(&key);
        }
    }
    true
}
