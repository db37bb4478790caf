//! Frame timing monitor with a per-tick FPS sampler and a change-only
//! callback.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::window::FpsWindow;

// ==================== Defaults ====================

/// Default smoothing window.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(1);

/// Default minimum FPS change that triggers a callback.
pub const DEFAULT_REPORT_DELTA_FPS: f64 = 2.0;

/// Default interval between evaluations.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(500);

/// Default hard cap on buffered samples.
pub const DEFAULT_MAX_SAMPLES: usize = 512;

/// Callback invoked with the new smoothed FPS.
pub type FpsCallback = Arc<dyn Fn(f64) + Send + Sync>;

/// Frame timing monitor configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameTimingConfig {
    /// Samples older than this are discarded.
    pub window: Duration,
    /// FPS must move by more than this before the callback fires again.
    pub report_delta_fps: f64,
    /// Evaluation period of the background ticker.
    pub tick_interval: Duration,
    /// Upper bound on buffered samples.
    pub max_samples: usize,
}

impl Default for FrameTimingConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            report_delta_fps: DEFAULT_REPORT_DELTA_FPS,
            tick_interval: DEFAULT_TICK_INTERVAL,
            max_samples: DEFAULT_MAX_SAMPLES,
        }
    }
}

#[derive(Debug)]
struct MonitorState {
    window: FpsWindow,
    last_reported: Option<f64>,
}

struct MonitorShared {
    config: FrameTimingConfig,
    state: Mutex<MonitorState>,
    on_sample: Option<FpsCallback>,
    on_change: FpsCallback,
}

impl MonitorShared {
    /// Evaluate the window. Returns the FPS and whether it moved enough to be
    /// reported.
    fn evaluate(&self, now: Instant) -> Option<(f64, bool)> {
        let mut state = self.state.lock();
        let fps = state.window.fps(now)?;

        let changed = match state.last_reported {
            None => true,
            Some(last) => (fps - last).abs() > self.config.report_delta_fps,
        };
        if changed {
            state.last_reported = Some(fps);
        }
        Some((fps, changed))
    }

    fn tick_at(&self, now: Instant) -> Option<f64> {
        let (fps, changed) = self.evaluate(now)?;

        // Callbacks run outside the lock so they may call back into the monitor.
        if let Some(on_sample) = &self.on_sample {
            on_sample(fps);
        }
        if !changed {
            return None;
        }

        trace!(fps = format!("{:.1}", fps), "FPS changed");
        (self.on_change)(fps);
        Some(fps)
    }
}

struct RunningTicker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Samples render durations and reports meaningful FPS changes.
///
/// Frames are recorded from the render loop with [`record_frame`]. Every
/// tick the window is pruned and FPS is recomputed. The optional sampler
/// receives that value on every tick; the change callback fires only if the
/// value moved by more than the configured delta since the last report. At
/// most one change callback happens per tick, and neither runs before the
/// first frame is recorded.
///
/// Ticks come either from a background tokio task started with [`start`] or
/// from the caller via [`tick`] when no runtime is available.
///
/// [`record_frame`]: FrameTimingMonitor::record_frame
/// [`start`]: FrameTimingMonitor::start
/// [`tick`]: FrameTimingMonitor::tick
pub struct FrameTimingMonitor {
    shared: Arc<MonitorShared>,
    ticker: Mutex<Option<RunningTicker>>,
}

impl FrameTimingMonitor {
    /// Create a stopped monitor.
    pub fn new(config: FrameTimingConfig, on_change: FpsCallback) -> Self {
        Self::build(config, None, on_change)
    }

    /// Create a stopped monitor that also hands every evaluated FPS value to
    /// `on_sample`, whether or not it passes the change delta.
    pub fn with_sampler(
        config: FrameTimingConfig,
        on_sample: FpsCallback,
        on_change: FpsCallback,
    ) -> Self {
        Self::build(config, Some(on_sample), on_change)
    }

    fn build(
        config: FrameTimingConfig,
        on_sample: Option<FpsCallback>,
        on_change: FpsCallback,
    ) -> Self {
        let window = FpsWindow::new(config.window, config.max_samples);
        Self {
            shared: Arc::new(MonitorShared {
                config,
                state: Mutex::new(MonitorState {
                    window,
                    last_reported: None,
                }),
                on_sample,
                on_change,
            }),
            ticker: Mutex::new(None),
        }
    }

    /// Start the background ticker.
    ///
    /// Idempotent: returns `false` if already running. Also returns `false`
    /// outside a tokio runtime, in which case the caller drives [`tick`]
    /// itself.
    ///
    /// [`tick`]: FrameTimingMonitor::tick
    pub fn start(&self) -> bool {
        let mut ticker = self.ticker.lock();
        if ticker.is_some() {
            return false;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("No tokio runtime; frame timing monitor will be ticked manually");
            return false;
        };

        let cancel = CancellationToken::new();
        let shared = Arc::clone(&self.shared);
        let period = self.shared.config.tick_interval.max(Duration::from_millis(1));
        let task_cancel = cancel.clone();

        let handle = runtime.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    _ = interval.tick() => {
                        shared.tick_at(Instant::now());
                    }
                }
            }
        });

        debug!(tick_ms = period.as_millis() as u64, "Frame timing monitor started");
        *ticker = Some(RunningTicker { cancel, handle });
        true
    }

    /// Stop the background ticker. Idempotent.
    pub fn stop(&self) -> bool {
        let Some(running) = self.ticker.lock().take() else {
            return false;
        };
        running.cancel.cancel();
        running.handle.abort();
        debug!("Frame timing monitor stopped");
        true
    }

    /// Whether the background ticker is running.
    pub fn is_running(&self) -> bool {
        self.ticker.lock().is_some()
    }

    /// Record one frame's build and raster durations.
    pub fn record_frame(&self, build: Duration, raster: Duration) {
        self.record_frame_at(Instant::now(), build, raster);
    }

    /// Record one frame that finished at `now`.
    pub fn record_frame_at(&self, now: Instant, build: Duration, raster: Duration) {
        self.shared
            .state
            .lock()
            .window
            .record(now, build.saturating_add(raster));
    }

    /// Evaluate now. Returns the reported FPS if the callback fired.
    pub fn tick(&self) -> Option<f64> {
        self.tick_at(Instant::now())
    }

    /// Evaluate as of `now`. Returns the reported FPS if the callback fired.
    pub fn tick_at(&self, now: Instant) -> Option<f64> {
        self.shared.tick_at(now)
    }

    /// Smoothed FPS over the current window, without reporting it.
    pub fn current_fps(&self) -> Option<f64> {
        self.shared.state.lock().window.fps(Instant::now())
    }

    /// The last FPS value passed to the callback.
    pub fn last_reported(&self) -> Option<f64> {
        self.shared.state.lock().last_reported
    }
}

impl Drop for FrameTimingMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for FrameTimingMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameTimingMonitor")
            .field("config", &self.shared.config)
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn recording_monitor() -> (FrameTimingMonitor, Arc<Mutex<Vec<f64>>>) {
        let reports = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reports);
        let monitor = FrameTimingMonitor::new(
            FrameTimingConfig::default(),
            Arc::new(move |fps| sink.lock().push(fps)),
        );
        (monitor, reports)
    }

    #[test]
    fn test_no_frames_no_signal() {
        let (monitor, reports) = recording_monitor();
        assert_eq!(monitor.tick(), None);
        assert!(reports.lock().is_empty());
    }

    #[test]
    fn test_first_tick_reports() {
        let (monitor, reports) = recording_monitor();
        let t0 = Instant::now();
        monitor.record_frame_at(t0, ms(10), ms(10));

        let fps = monitor.tick_at(t0).unwrap();
        assert!((fps - 50.0).abs() < 1e-9);
        assert_eq!(reports.lock().len(), 1);
    }

    #[test]
    fn test_small_changes_are_suppressed() {
        let (monitor, reports) = recording_monitor();
        let t0 = Instant::now();
        monitor.record_frame_at(t0, ms(10), ms(10)); // 50 fps
        monitor.tick_at(t0);

        // 19.6ms mean is ~51 fps: within the 2 fps delta.
        monitor.record_frame_at(t0 + ms(20), ms(10), Duration::from_micros(9_200));
        assert_eq!(monitor.tick_at(t0 + ms(20)), None);
        assert_eq!(reports.lock().len(), 1);
    }

    #[test]
    fn test_large_change_reports_once_per_tick() {
        let (monitor, reports) = recording_monitor();
        let t0 = Instant::now();
        monitor.record_frame_at(t0, ms(10), ms(10));
        monitor.tick_at(t0);

        // Window slides past the slow frame, leaving only fast ones.
        for i in 0..10 {
            monitor.record_frame_at(t0 + ms(1100 + i), ms(5), ms(5));
        }
        let fps = monitor.tick_at(t0 + ms(1110)).unwrap();
        assert!((fps - 100.0).abs() < 1e-9);

        // Same window, no change: second tick is silent.
        assert_eq!(monitor.tick_at(t0 + ms(1110)), None);
        assert_eq!(reports.lock().len(), 2);
    }

    #[test]
    fn test_sampler_sees_every_tick() {
        let samples = Arc::new(Mutex::new(Vec::new()));
        let changes = Arc::new(AtomicUsize::new(0));
        let sink = Arc::clone(&samples);
        let counter = Arc::clone(&changes);
        let monitor = FrameTimingMonitor::with_sampler(
            FrameTimingConfig::default(),
            Arc::new(move |fps| sink.lock().push(fps)),
            Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let t0 = Instant::now();
        assert_eq!(monitor.tick_at(t0), None);
        assert!(samples.lock().is_empty());

        monitor.record_frame_at(t0, ms(15), ms(10)); // 40 fps
        for _ in 0..3 {
            monitor.tick_at(t0);
        }

        let samples = samples.lock();
        assert_eq!(samples.len(), 3);
        assert!(samples.iter().all(|fps| (fps - 40.0).abs() < 1e-9));
        assert_eq!(changes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_start_without_runtime_falls_back_to_manual() {
        let (monitor, _) = recording_monitor();
        assert!(!monitor.start());
        assert!(!monitor.is_running());
        assert!(!monitor.stop());
    }

    #[tokio::test]
    async fn test_start_stop_are_idempotent() {
        let (monitor, _) = recording_monitor();
        assert!(monitor.start());
        assert!(!monitor.start());
        assert!(monitor.is_running());

        assert!(monitor.stop());
        assert!(!monitor.stop());
        assert!(!monitor.is_running());
    }

    #[tokio::test]
    async fn test_background_ticker_fires_callback() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let monitor = FrameTimingMonitor::new(
            FrameTimingConfig {
                tick_interval: ms(10),
                ..Default::default()
            },
            Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        monitor.record_frame(ms(8), ms(8));
        monitor.start();
        tokio::time::sleep(ms(50)).await;
        monitor.stop();

        // One frame, one distinct value: exactly one report however many ticks ran.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_callback_may_reenter_monitor() {
        let slot: Arc<Mutex<Option<Arc<FrameTimingMonitor>>>> = Arc::new(Mutex::new(None));
        let inner = Arc::clone(&slot);
        let monitor = Arc::new(FrameTimingMonitor::new(
            FrameTimingConfig::default(),
            Arc::new(move |_| {
                if let Some(m) = inner.lock().as_ref() {
                    let _ = m.last_reported();
                }
            }),
        ));
        *slot.lock() = Some(Arc::clone(&monitor));

        let t0 = Instant::now();
        monitor.record_frame_at(t0, ms(16), ms(0));
        assert!(monitor.tick_at(t0).is_some());

        slot.lock().take();
    }
}
