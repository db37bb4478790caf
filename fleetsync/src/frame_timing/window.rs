//! Sliding window of frame durations.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// One recorded frame.
#[derive(Debug, Clone, Copy)]
struct FrameSample {
    /// When the frame finished.
    timestamp: Instant,
    /// Build plus raster time in milliseconds.
    duration_ms: f64,
}

/// Time-bounded window of frame samples.
///
/// Samples older than the window duration are pruned on every insert and
/// before every read. A hard sample cap keeps memory bounded even when the
/// consumer renders far faster than expected.
#[derive(Debug)]
pub struct FpsWindow {
    samples: VecDeque<FrameSample>,
    window: Duration,
    max_samples: usize,
}

impl FpsWindow {
    /// Create an empty window.
    pub fn new(window: Duration, max_samples: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(max_samples.min(1024)),
            window,
            max_samples: max_samples.max(1),
        }
    }

    /// Record one frame that finished at `now`.
    pub fn record(&mut self, now: Instant, duration: Duration) {
        self.samples.push_back(FrameSample {
            timestamp: now,
            duration_ms: duration.as_secs_f64() * 1000.0,
        });

        self.prune(now);

        while self.samples.len() > self.max_samples {
            self.samples.pop_front();
        }
    }

    /// Drop samples older than the window as of `now`.
    pub fn prune(&mut self, now: Instant) {
        let Some(cutoff) = now.checked_sub(self.window) else {
            return;
        };
        while let Some(front) = self.samples.front() {
            if front.timestamp < cutoff {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// Smoothed FPS as of `now`: `1000 / mean(duration_ms)`.
    ///
    /// Returns `None` when the window is empty or every frame took zero time.
    pub fn fps(&mut self, now: Instant) -> Option<f64> {
        self.prune(now);
        if self.samples.is_empty() {
            return None;
        }

        let total: f64 = self.samples.iter().map(|s| s.duration_ms).sum();
        let mean = total / self.samples.len() as f64;
        if mean <= 0.0 {
            return None;
        }
        Some(1000.0 / mean)
    }

    /// Number of samples currently held.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the window holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Drop all samples.
    pub fn clear(&mut self) {
        self.samples.clear();
    }
}
