//! Counter aggregation across per-CPU slots
//!
//! The hook only ever touches its own CPU's copy of `packet_cnt`. Readers get one value
//! per CPU and sum them here. Slots are read one after another, so a snapshot is an
//! eventually consistent view, never a transactional one.

use std::time::{Duration, Instant};

/// Per-CPU values of the counter slot, in CPU order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    per_cpu: Vec<u64>,
}

impl CounterSnapshot {
    /// Build a snapshot from values read in CPU order
    pub fn from_per_cpu<I>(values: I) -> Self
    where
        I: IntoIterator<Item = u64>,
    {
        Self {
            per_cpu: values.into_iter().collect(),
        }
    }

    pub fn per_cpu(&self) -> &[u64] {
        &self.per_cpu
    }

    pub fn cpus(&self) -> usize {
        self.per_cpu.len()
    }

    /// Sum of every CPU's partial count
    pub fn total(&self) -> u64 {
        sum_per_cpu(self.per_cpu.iter().copied())
    }
}

/// Sum per-CPU partial counts, saturating at `u64::MAX`
pub fn sum_per_cpu<I>(values: I) -> u64
where
    I: IntoIterator<Item = u64>,
{
    values
        .into_iter()
        .fold(0u64, |total, value| total.saturating_add(value))
}

/// Frames counted between two observations of the aggregate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CounterDelta {
    pub frames: u64,
    pub elapsed: Duration,
    /// The aggregate went backwards, so the map was recreated (re-attach).
    pub reset: bool,
}

impl CounterDelta {
    pub fn per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.frames as f64 / secs
        } else {
            0.0
        }
    }
}

/// Tracks successive aggregate totals to derive frame rates
#[derive(Debug, Default)]
pub struct RateTracker {
    last: Option<(u64, Instant)>,
}

impl RateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `total` observed at `at`; returns the delta since the previous call
    pub fn observe(&mut self, total: u64, at: Instant) -> Option<CounterDelta> {
        let previous = self.last.replace((total, at));
        let (last_total, last_at) = previous?;

        let reset = total < last_total;
        let frames = if reset { total } else { total - last_total };

        Some(CounterDelta {
            frames,
            elapsed: at.saturating_duration_since(last_at),
            reset,
        })
    }
}
