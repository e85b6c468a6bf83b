//! sentinel-agent - attaches the XDP packet counter and reports totals
//!
//! The agent runs on each capture host and:
//! - Loads the XDP probe into the kernel
//! - Attaches it to the configured interface
//! - Polls the per-CPU counter and logs totals and frame rates
//! - Detaches and unpins on Ctrl+C

use anyhow::Result;

#[cfg(not(target_os = "linux"))]
fn main() -> Result<()> {
    eprintln!("Error: sentinel-agent requires Linux to run XDP programs");
    std::process::exit(1);
}

#[cfg(target_os = "linux")]
#[tokio::main]
async fn main() -> Result<()> {
    use clap::Parser;
    use log::{info, warn};
    use sentinel_agent::aggregator::RateTracker;
    use sentinel_agent::config::AgentConfig;
    use sentinel_agent::probe_loader::ProbeManager;
    use std::time::Instant;
    use tokio::signal;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AgentConfig::parse();

    if !config.enabled {
        info!("XDP collector disabled via XDP_ENABLED=false");
        return Ok(());
    }

    info!("sentinel-agent starting on {}...", config.iface);

    let mut manager = ProbeManager::new(config.object.as_deref())?;
    manager.attach(&config.iface, config.mode)?;

    if let Some(pin) = config.pin() {
        if let Err(e) = manager.pin_counters(pin) {
            warn!("Counter map not pinned, external readers will not see it: {:#}", e);
        }
    }

    info!("sentinel-agent running. Press Ctrl+C to exit.");

    let mut ticker = tokio::time::interval(config.poll_interval());
    let mut rates = RateTracker::new();

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
            _ = ticker.tick() => {
                match manager.read_counters() {
                    Ok(snapshot) => {
                        let total = snapshot.total();
                        match rates.observe(total, Instant::now()) {
                            Some(delta) if delta.reset => {
                                warn!("Counter went backwards, map was recreated; total={}", total);
                            }
                            Some(delta) => info!(
                                "packets_total={} cpus={} rate={:.1}/s",
                                total,
                                snapshot.cpus(),
                                delta.per_second()
                            ),
                            None => info!("packets_total={} cpus={}", total, snapshot.cpus()),
                        }
                    }
                    Err(e) => warn!("Failed to read counters: {:#}", e),
                }
            }
        }
    }

    if let Ok(snapshot) = manager.read_counters() {
        info!("Final packets_total={}", snapshot.total());
    }
    manager.unload();

    info!("sentinel-agent stopped");
    Ok(())
}
