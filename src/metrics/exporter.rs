use crate::metrics::collector::Metrics;
use crate::Result;
use clap::ValueEnum;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::fs;
use std::path::Path;
use tracing::info;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    #[default]
    Json,
    Yaml,
    Prometheus,
}

pub struct MetricsExporter {
    format: ExportFormat,
}

impl MetricsExporter {
    pub fn new(format: ExportFormat) -> Self {
        Self { format }
    }

    pub fn render(&self, metrics: &Metrics) -> Result<String> {
        match self.format {
            ExportFormat::Json => Ok(serde_json::to_string_pretty(metrics)? + "\n"),
            ExportFormat::Yaml => Ok(serde_yaml::to_string(metrics)?),
            ExportFormat::Prometheus => render_prometheus(metrics),
        }
    }

    /// Write rendered metrics to `output`, or to stdout when no path is given
    pub fn export(&self, metrics: &Metrics, output: Option<&Path>) -> Result<()> {
        let rendered = self.render(metrics)?;
        match output {
            Some(path) => {
                fs::write(path, rendered)?;
                info!("Metrics written to {}", path.display());
            }
            None => print!("{}", rendered),
        }
        Ok(())
    }
}

fn render_prometheus(metrics: &Metrics) -> Result<String> {
    let registry = Registry::new();

    let total = IntCounter::with_opts(Opts::new(
        "sentinel_xdp_packets_total",
        "Frames observed by the XDP receive hook across all CPUs",
    ))?;
    let per_cpu = IntCounterVec::new(
        Opts::new(
            "sentinel_xdp_cpu_packets_total",
            "Frames observed by the XDP receive hook per logical CPU",
        ),
        &["cpu"],
    )?;
    let cpus = IntGauge::with_opts(Opts::new(
        "sentinel_xdp_cpus",
        "Logical CPUs with a counter slot",
    ))?;

    registry.register(Box::new(total.clone()))?;
    registry.register(Box::new(per_cpu.clone()))?;
    registry.register(Box::new(cpus.clone()))?;

    total.inc_by(metrics.packets_total);
    cpus.set(i64::try_from(metrics.cpus).unwrap_or(i64::MAX));
    for (cpu, count) in metrics.per_cpu.iter().enumerate() {
        let label = cpu.to_string();
        per_cpu.with_label_values(&[label.as_str()]).inc_by(*count);
    }

    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| crate::SentinelError::MetricsError(e.to_string()))
}
