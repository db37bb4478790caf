//! Simulate command - drive the engine with a synthetic fleet.
//!
//! Units move around Hamburg and report over both sources: most updates
//! arrive as push records, every tenth unit only as an id reference that the
//! engine resolves through the pull source. The render loop reports frame
//! times that rise to a peak halfway through the run and recover afterwards,
//! so the LOD tier can be watched degrading and recovering.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use fleetsync::geo::offset_meters;
use fleetsync::logging::init_logging;
use fleetsync::snapshot::RawRecord;
use fleetsync::sources::{MemoryDurableCache, PushMessage, StaticPullSource};
use fleetsync::{EngineConfig, EngineDiagnostics, FleetSyncEngine, UnitId};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::CliError;

/// Frame time at the start and end of the profile.
const BASE_FRAME_MS: f64 = 12.0;

/// Render loop period (about 60 Hz).
const RENDER_INTERVAL: Duration = Duration::from_millis(16);

/// Diagnostics print period.
const REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// Units with a live subscriber.
const WATCHED_UNITS: usize = 8;

/// Telemetry ticks between bulk refreshes.
const REFRESH_EVERY_TICKS: u64 = 50;

/// Arguments for the simulate command.
pub struct SimulateArgs {
    pub units: usize,
    pub duration_secs: u64,
    pub update_ms: u64,
    pub peak_frame_ms: u64,
    pub config: Option<PathBuf>,
    pub log_level: Option<String>,
}

/// Run the simulate command.
pub fn run(args: SimulateArgs) -> Result<(), CliError> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::load_from(path)?,
        None => EngineConfig::load()?,
    };
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    let _logging = init_logging(&config.logging)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::Runtime(e.to_string()))?;

    let cancel = CancellationToken::new();
    let handler_cancel = cancel.clone();
    ctrlc::set_handler(move || {
        println!();
        println!("Received shutdown signal, stopping simulation...");
        handler_cancel.cancel();
    })
    .map_err(|e| CliError::Runtime(format!("Failed to set signal handler: {}", e)))?;

    println!("FleetSync Simulation v{}", fleetsync::VERSION);
    println!("=========================");
    println!();
    println!("Units:       {}", args.units);
    println!("Duration:    {}s", args.duration_secs);
    println!("Updates:     every {}ms per unit", args.update_ms);
    println!(
        "Frame time:  {:.0}ms -> {}ms -> {:.0}ms",
        BASE_FRAME_MS, args.peak_frame_ms, BASE_FRAME_MS
    );
    println!(
        "LOD:         drop below {} FPS, raise at {} FPS",
        config.lod.drop_below_fps, config.lod.raise_at_fps
    );
    println!();
    println!("Press Ctrl+C to stop early");
    println!();

    let summary = runtime.block_on(simulate(config, &args, cancel))?;

    println!();
    println!("Summary");
    println!("-------");
    println!("Final:       {}", summary.diagnostics);
    println!("Transitions: {}", summary.diagnostics.lod_transitions);
    println!(
        "Coalesced:   {:.1}% of accepted updates",
        summary.diagnostics.metrics.coalesce_ratio() * 100.0
    );
    println!("Delivered:   {} snapshots to watched units", summary.delivered);

    Ok(())
}

struct SimulationSummary {
    diagnostics: EngineDiagnostics,
    delivered: u64,
}

async fn simulate(
    config: EngineConfig,
    args: &SimulateArgs,
    cancel: CancellationToken,
) -> Result<SimulationSummary, CliError> {
    let pull = Arc::new(StaticPullSource::new());
    let durable = Arc::new(MemoryDurableCache::new());
    let engine = FleetSyncEngine::start(config, pull.clone(), durable)?;

    let mut fleet = SyntheticFleet::new(args.units);
    engine.preload(fleet.ids())?;

    let delivered = Arc::new(AtomicU64::new(0));
    for id in fleet.ids().into_iter().take(WATCHED_UNITS) {
        let mut subscription = engine.channel_for(id).await?.subscribe()?;
        let delivered = Arc::clone(&delivered);
        tokio::spawn(async move {
            while subscription.recv().await.is_some() {
                delivered.fetch_add(1, Ordering::Relaxed);
            }
        });
    }

    let total = Duration::from_secs(args.duration_secs.max(1));
    let update_period = Duration::from_millis(args.update_ms.max(1));
    let started = Instant::now();

    let mut telemetry_tick = interval(update_period);
    telemetry_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut render_tick = interval(RENDER_INTERVAL);
    render_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut report_tick = interval(REPORT_INTERVAL);
    report_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let deadline = tokio::time::sleep(total);
    tokio::pin!(deadline);

    let mut ticks: u64 = 0;
    let mut visible = 0usize;

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,
            _ = &mut deadline => break,

            _ = telemetry_tick.tick() => {
                ticks += 1;
                fleet.advance(update_period);
                publish(&engine, &pull, &fleet, ticks)?;
                if ticks % REFRESH_EVERY_TICKS == 0 {
                    let refresh: Vec<UnitId> = fleet.ids().into_iter().step_by(10).collect();
                    engine.refresh_all(refresh)?;
                }
            }

            _ = render_tick.tick() => {
                let progress = started.elapsed().as_secs_f64() / total.as_secs_f64();
                let frame = frame_time(progress, args.peak_frame_ms as f64);
                engine.record_frame(frame.mul_f64(0.6), frame.mul_f64(0.4));
                visible = engine.decimate(fleet.markers(), |m| (m.1, m.2)).len();
            }

            _ = report_tick.tick() => {
                println!(
                    "[{:>5.1}s] {} | visible {}/{} | delivered {}",
                    started.elapsed().as_secs_f64(),
                    engine.diagnostics(),
                    visible,
                    fleet.len(),
                    delivered.load(Ordering::Relaxed)
                );
            }
        }
    }

    engine.flush().await?;
    let diagnostics = engine.diagnostics();
    engine.dispose();

    Ok(SimulationSummary {
        diagnostics,
        delivered: delivered.load(Ordering::Relaxed),
    })
}

/// Send one round of telemetry. Every tenth unit (rotating per tick) is sent
/// as an id reference backed by the pull source.
fn publish(
    engine: &FleetSyncEngine,
    pull: &StaticPullSource,
    fleet: &SyntheticFleet,
    tick: u64,
) -> Result<(), CliError> {
    let mut records = Vec::with_capacity(fleet.len());
    for (index, unit) in fleet.units.iter().enumerate() {
        let record = unit.record();
        if (index as u64 + tick) % 10 == 0 {
            pull.set(record);
            engine.submit_push(PushMessage::UnitRef(UnitId::from(unit.id.as_str())))?;
        } else {
            records.push(record);
        }
    }
    engine.submit_push(PushMessage::Records(records))?;
    Ok(())
}

/// Frame time for a point in the run: rises linearly from the base to the
/// peak at the midpoint, then falls back.
fn frame_time(progress: f64, peak_ms: f64) -> Duration {
    let progress = progress.clamp(0.0, 1.0);
    let ramp = if progress < 0.5 {
        progress * 2.0
    } else {
        (1.0 - progress) * 2.0
    };
    let ms = BASE_FRAME_MS + (peak_ms - BASE_FRAME_MS).max(0.0) * ramp;
    Duration::from_micros((ms * 1000.0).round() as u64)
}

struct SimUnit {
    id: String,
    latitude: f64,
    longitude: f64,
    heading: f64,
    speed: f64,
    turn_rate: f64,
}

impl SimUnit {
    fn record(&self) -> RawRecord {
        RawRecord::new(self.id.clone(), Utc::now())
            .at(self.latitude, self.longitude)
            .speed(self.speed)
            .heading(self.heading)
    }
}

/// Units on a grid around Hamburg, moving with constant speed and turn rate.
struct SyntheticFleet {
    units: Vec<SimUnit>,
}

impl SyntheticFleet {
    fn new(count: usize) -> Self {
        let units = (0..count)
            .map(|i| SimUnit {
                id: format!("unit-{:04}", i),
                latitude: 53.45 + (i / 20) as f64 * 0.005,
                longitude: 9.85 + (i % 20) as f64 * 0.01,
                heading: (i * 37 % 360) as f64,
                speed: 5.0 + (i % 5) as f64 * 5.0,
                turn_rate: ((i % 7) as f64 - 3.0) * 2.0,
            })
            .collect();
        Self { units }
    }

    fn len(&self) -> usize {
        self.units.len()
    }

    fn ids(&self) -> Vec<UnitId> {
        self.units
            .iter()
            .map(|u| UnitId::from(u.id.as_str()))
            .collect()
    }

    /// Markers in stable id order: `(id, lat, lon)`.
    fn markers(&self) -> Vec<(String, f64, f64)> {
        self.units
            .iter()
            .map(|u| (u.id.clone(), u.latitude, u.longitude))
            .collect()
    }

    fn advance(&mut self, dt: Duration) {
        let secs = dt.as_secs_f64();
        for unit in &mut self.units {
            let distance = unit.speed * secs;
            let heading = unit.heading.to_radians();
            (unit.latitude, unit.longitude) = offset_meters(
                unit.latitude,
                unit.longitude,
                distance * heading.cos(),
                distance * heading.sin(),
            );
            unit.heading = (unit.heading + unit.turn_rate * secs).rem_euclid(360.0);
        }
    }
}
