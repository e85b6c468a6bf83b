use sentinel_agent::aggregator::CounterSnapshot;
use sentinel_agent::sim::DeliveryReport;
use serde::Serialize;

/// Counter totals ready for export
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Metrics {
    /// Where the counts came from: a pin path or "simulation"
    pub source: String,
    pub cpus: usize,
    pub packets_total: u64,
    pub per_cpu: Vec<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdicts: Option<VerdictSummary>,
}

/// Verdicts returned by the hook during a simulation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VerdictSummary {
    pub delivered: u64,
    pub passed: u64,
}

impl From<DeliveryReport> for VerdictSummary {
    fn from(report: DeliveryReport) -> Self {
        Self {
            delivered: report.delivered,
            passed: report.passed,
        }
    }
}

impl Metrics {
    pub fn from_snapshot(source: impl Into<String>, snapshot: &CounterSnapshot) -> Self {
        Self {
            source: source.into(),
            cpus: snapshot.cpus(),
            packets_total: snapshot.total(),
            per_cpu: snapshot.per_cpu().to_vec(),
            verdicts: None,
        }
    }

    pub fn with_verdicts(mut self, report: DeliveryReport) -> Self {
        self.verdicts = Some(report.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_from_snapshot() {
        let snapshot = CounterSnapshot::from_per_cpu([3, 4]);
        let metrics = Metrics::from_snapshot("simulation", &snapshot);
        assert_eq!(metrics.cpus, 2);
        assert_eq!(metrics.packets_total, 7);
        assert_eq!(metrics.per_cpu, vec![3, 4]);
        assert!(metrics.verdicts.is_none());
    }

    #[test]
    fn test_with_verdicts() {
        let metrics = Metrics::default().with_verdicts(DeliveryReport {
            delivered: 10,
            passed: 10,
        });
        assert_eq!(
            metrics.verdicts,
            Some(VerdictSummary {
                delivered: 10,
                passed: 10
            })
        );
    }
}
