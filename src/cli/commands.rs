use crate::cli::Commands;
use crate::metrics::{ExportFormat, Metrics, MetricsExporter};
use crate::{Result, SentinelError};
use sentinel_agent::aggregator::{CounterDelta, CounterSnapshot, RateTracker};
use sentinel_agent::sim::SimulatedHost;
use sentinel_common::{
    Verdict, COUNTER_KEY, COUNTER_MAP_ENTRIES, COUNTER_MAP_NAME, LICENSE, PROGRAM_NAME,
};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

pub async fn handle_command(command: Commands) -> Result<()> {
    match command {
        Commands::Stats {
            pin,
            format,
            output,
            watch,
        } => handle_stats(pin, format, output, watch).await,
        Commands::Simulate {
            frames,
            cpus,
            concurrent,
            format,
            output,
        } => handle_simulate(frames, cpus, concurrent, format, output),
        Commands::Info => handle_info(),
    }
}

async fn handle_stats(
    pin: PathBuf,
    format: ExportFormat,
    output: Option<PathBuf>,
    watch: Option<u64>,
) -> Result<()> {
    let exporter = MetricsExporter::new(format);
    let source = format!("pin:{}", pin.display());

    let Some(secs) = watch else {
        let metrics = Metrics::from_snapshot(source, &read_pinned(&pin)?);
        return exporter.export(&metrics, output.as_deref());
    };

    watch_stats(&pin, &exporter, source, output.as_deref(), secs).await
}

#[cfg(target_os = "linux")]
async fn watch_stats(
    pin: &Path,
    exporter: &MetricsExporter,
    source: String,
    output: Option<&Path>,
    secs: u64,
) -> Result<()> {
    use std::time::Duration;

    info!("Watching {} every {}s", pin.display(), secs.max(1));
    let mut ticker = tokio::time::interval(Duration::from_secs(secs.max(1)));
    let mut rates = RateTracker::new();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Stopped watching");
                return Ok(());
            }
            _ = ticker.tick() => {
                if let Some((snapshot, _)) = watch_tick(&mut rates, read_pinned(pin), Instant::now()) {
                    exporter.export(&Metrics::from_snapshot(source.clone(), &snapshot), output)?;
                }
            }
        }
    }
}

/// Fold one read of the pinned map into the rate.
///
/// The pin is missing while the agent restarts, so a failed read is logged and the
/// next tick tries again.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn watch_tick(
    rates: &mut RateTracker,
    read: Result<CounterSnapshot>,
    at: Instant,
) -> Option<(CounterSnapshot, Option<CounterDelta>)> {
    let snapshot = match read {
        Ok(snapshot) => snapshot,
        Err(e) => {
            warn!("Skipping this read: {}", e);
            return None;
        }
    };

    let delta = rates.observe(snapshot.total(), at);
    if let Some(delta) = delta {
        if delta.reset {
            warn!("Counter went backwards; the agent re-attached with a fresh map");
        }
        info!("{} frames in {:?} ({:.1}/s)", delta.frames, delta.elapsed, delta.per_second());
    }
    Some((snapshot, delta))
}

#[cfg(not(target_os = "linux"))]
async fn watch_stats(
    _pin: &Path,
    _exporter: &MetricsExporter,
    _source: String,
    _output: Option<&Path>,
    _secs: u64,
) -> Result<()> {
    Err(unsupported_stats())
}

#[cfg(target_os = "linux")]
fn read_pinned(pin: &Path) -> Result<CounterSnapshot> {
    debug!("Reading pinned counter map at {}", pin.display());
    sentinel_agent::probe_loader::read_pinned(pin)
        .map_err(|e| SentinelError::MapReadFailed(format!("{e:#}")))
}

#[cfg(not(target_os = "linux"))]
fn read_pinned(_pin: &Path) -> Result<CounterSnapshot> {
    Err(unsupported_stats())
}

#[cfg(not(target_os = "linux"))]
fn unsupported_stats() -> SentinelError {
    SentinelError::UnsupportedFeature("reading BPF maps requires Linux".to_string())
}

fn handle_simulate(
    frames: u64,
    cpus: usize,
    concurrent: bool,
    format: ExportFormat,
    output: Option<PathBuf>,
) -> Result<()> {
    let metrics = run_simulation(frames, cpus, concurrent)?;
    MetricsExporter::new(format).export(&metrics, output.as_deref())
}

/// Attach to a fresh simulated map, deliver `frames` frames and detach
pub fn run_simulation(frames: u64, cpus: usize, concurrent: bool) -> Result<Metrics> {
    if cpus == 0 {
        return Err(SentinelError::ConfigError(
            "--cpus must be at least 1".to_string(),
        ));
    }

    info!(
        "Simulating {} frames on {} CPUs ({})",
        frames,
        cpus,
        if concurrent { "concurrent" } else { "round-robin" }
    );

    let attachment = SimulatedHost::new(cpus).attach();
    let report = if concurrent {
        attachment.deliver_concurrently(&split_frames(frames, cpus))
    } else {
        attachment.deliver_round_robin(frames)
    };
    let snapshot = attachment.detach();

    debug!("Delivered {} frames, {} passed", report.delivered, report.passed);
    Ok(Metrics::from_snapshot("simulation", &snapshot).with_verdicts(report))
}

/// Spread `frames` over `cpus`, giving the remainder to the lowest CPUs
fn split_frames(frames: u64, cpus: usize) -> Vec<u64> {
    let cpus_u64 = cpus as u64;
    let base = frames / cpus_u64;
    let extra = frames % cpus_u64;
    (0..cpus_u64)
        .map(|cpu| base + u64::from(cpu < extra))
        .collect()
}

fn handle_info() -> Result<()> {
    println!("program:      {} (xdp)", PROGRAM_NAME);
    println!("map:          {} (percpu_array)", COUNTER_MAP_NAME);
    println!("max_entries:  {}", COUNTER_MAP_ENTRIES);
    println!("key:          u32 = {}", COUNTER_KEY);
    println!("value:        u64 per CPU");
    println!("verdict:      {} ({})", Verdict::Pass, Verdict::Pass.as_u32());
    println!("license:      {}", LICENSE);
    Ok(())
}
