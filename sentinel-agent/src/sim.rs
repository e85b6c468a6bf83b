//! In-process stand-in for the kernel's per-CPU counter map
//!
//! Runs the same `observe_frame` hook body the XDP program runs, against one
//! `AtomicU64` per simulated CPU. Used by tests and by `sentinel-xdp simulate` to check
//! counting behaviour without a NIC, root, or a BPF toolchain.

use crate::aggregator::CounterSnapshot;
use log::debug;
use sentinel_common::{observe_frame, CounterSlots, Verdict, COUNTER_KEY};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

/// One zero-initialized slot per CPU, like a `BPF_MAP_TYPE_PERCPU_ARRAY` with one entry
#[derive(Debug)]
pub struct PerCpuCounterMap {
    slots: Box<[AtomicU64]>,
}

impl PerCpuCounterMap {
    pub fn new(cpus: usize) -> Self {
        Self {
            slots: (0..cpus).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    pub fn cpus(&self) -> usize {
        self.slots.len()
    }

    /// The map as seen by code executing on `cpu`
    pub fn on_cpu(&self, cpu: usize) -> CpuView<'_> {
        CpuView {
            slot: self.slots.get(cpu),
        }
    }

    /// Read every CPU's slot in order
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot::from_per_cpu(self.slots.iter().map(|s| s.load(Ordering::Relaxed)))
    }
}

/// A single CPU's view of [`PerCpuCounterMap`]
#[derive(Debug, Clone, Copy)]
pub struct CpuView<'a> {
    slot: Option<&'a AtomicU64>,
}

impl CounterSlots for CpuView<'_> {
    fn lookup(&self, key: u32) -> Option<&AtomicU64> {
        // One entry only; any other key is out of range.
        if key != COUNTER_KEY {
            return None;
        }
        self.slot
    }
}

/// A map that was never created; every lookup misses
#[derive(Debug, Clone, Copy, Default)]
pub struct MissingMap;

impl CounterSlots for MissingMap {
    fn lookup(&self, _key: u32) -> Option<&AtomicU64> {
        None
    }
}

/// Verdict tally for a batch of delivered frames
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: u64,
    pub passed: u64,
}

impl DeliveryReport {
    pub fn record(&mut self, verdict: Verdict) {
        self.delivered += 1;
        if verdict == Verdict::Pass {
            self.passed += 1;
        }
    }

    pub fn merge(&mut self, other: DeliveryReport) {
        self.delivered += other.delivered;
        self.passed += other.passed;
    }

    pub fn all_passed(&self) -> bool {
        self.delivered == self.passed
    }
}

/// Creates attachments with the CPU count fixed at load time
#[derive(Debug, Clone, Copy)]
pub struct SimulatedHost {
    cpus: usize,
}

impl SimulatedHost {
    pub fn new(cpus: usize) -> Self {
        Self { cpus }
    }

    /// Load and attach: every attachment gets a fresh, zeroed map
    pub fn attach(&self) -> Attachment {
        debug!("Simulated attach with {} CPUs", self.cpus);
        Attachment {
            map: PerCpuCounterMap::new(self.cpus),
        }
    }
}

/// An attached hook and the map it owns
#[derive(Debug)]
pub struct Attachment {
    map: PerCpuCounterMap,
}

impl Attachment {
    pub fn cpus(&self) -> usize {
        self.map.cpus()
    }

    /// Run the hook for one frame received on `cpu`. An unknown CPU has no slot and
    /// behaves like a lookup miss.
    pub fn deliver(&self, cpu: usize) -> Verdict {
        observe_frame(&self.map.on_cpu(cpu))
    }

    /// Deliver `frames` frames back to back on one CPU
    pub fn deliver_on(&self, cpu: usize, frames: u64) -> DeliveryReport {
        let view = self.map.on_cpu(cpu);
        let mut report = DeliveryReport::default();
        for _ in 0..frames {
            report.record(observe_frame(&view));
        }
        report
    }

    /// Deliver `frames` frames, cycling through the CPUs in order
    pub fn deliver_round_robin(&self, frames: u64) -> DeliveryReport {
        let cpus = self.cpus().max(1) as u64;
        let mut report = DeliveryReport::default();
        for frame in 0..frames {
            report.record(self.deliver((frame % cpus) as usize));
        }
        report
    }

    /// Deliver `per_cpu_frames[cpu]` frames on each CPU in parallel, one thread per
    /// CPU, sequential within a CPU as a driver's receive loop is
    pub fn deliver_concurrently(&self, per_cpu_frames: &[u64]) -> DeliveryReport {
        thread::scope(|scope| {
            let handles: Vec<_> = per_cpu_frames
                .iter()
                .enumerate()
                .map(|(cpu, &frames)| scope.spawn(move || self.deliver_on(cpu, frames)))
                .collect();

            let mut report = DeliveryReport::default();
            for handle in handles {
                let cpu_report = handle
                    .join()
                    .unwrap_or_else(|err| std::panic::resume_unwind(err));
                report.merge(cpu_report);
            }
            report
        })
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        self.map.snapshot()
    }

    /// Detach and release the map, returning its final contents
    pub fn detach(self) -> CounterSnapshot {
        let snapshot = self.map.snapshot();
        debug!("Simulated detach, final total {}", snapshot.total());
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_cpu_counts_exactly() {
        let attachment = SimulatedHost::new(2).attach();
        let report = attachment.deliver_on(1, 37);
        assert_eq!(report.delivered, 37);
        assert!(report.all_passed());
        assert_eq!(attachment.snapshot().per_cpu(), &[0, 37]);
    }

    #[test]
    fn test_unknown_cpu_is_a_miss() {
        let attachment = SimulatedHost::new(2).attach();
        assert_eq!(attachment.deliver(9), Verdict::Pass);
        assert_eq!(attachment.snapshot().total(), 0);
    }

    #[test]
    fn test_view_rejects_other_keys() {
        let map = PerCpuCounterMap::new(1);
        assert!(map.on_cpu(0).lookup(COUNTER_KEY).is_some());
        assert!(map.on_cpu(0).lookup(1).is_none());
    }

    #[test]
    fn test_missing_map_passes() {
        assert_eq!(observe_frame(&MissingMap), Verdict::Pass);
    }

    #[test]
    fn test_round_robin_without_cpus_passes_everything() {
        let attachment = SimulatedHost::new(0).attach();
        let report = attachment.deliver_round_robin(5);
        assert_eq!(report, DeliveryReport { delivered: 5, passed: 5 });
        assert_eq!(attachment.detach().total(), 0);
    }

    #[test]
    fn test_report_merge() {
        let mut report = DeliveryReport { delivered: 3, passed: 3 };
        report.merge(DeliveryReport { delivered: 2, passed: 1 });
        assert_eq!(report, DeliveryReport { delivered: 5, passed: 4 });
        assert!(!report.all_passed());
    }
}
