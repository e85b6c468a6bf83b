pub mod collector;
pub mod exporter;

pub use collector::{Metrics, VerdictSummary};
pub use exporter::{ExportFormat, MetricsExporter};
