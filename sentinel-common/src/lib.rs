//! Shared contract between the XDP hook (kernel) and userspace
//!
//! This crate defines everything both sides must agree on:
//! - the names the loader uses to find the program and the counter map
//! - the fixed counter key and the map shape
//! - the `Verdict` values the driver understands
//! - the receive-hook logic itself, written against the [`CounterSlots`] seam
//!
//! The eBPF program calls [`observe_frame`] with the kernel's per-CPU array, and host
//! code calls the same function with an in-process stand-in, so tests exercise the code
//! that ships in the probe.

#![cfg_attr(not(feature = "userspace"), no_std)]

use core::sync::atomic::{AtomicU64, Ordering};

/// Name of the XDP entry point inside the eBPF object.
pub const PROGRAM_NAME: &str = "xdp_sentinel_prog";

/// Name of the per-CPU counter map inside the eBPF object.
pub const COUNTER_MAP_NAME: &str = "packet_cnt";

/// The one key of the counter map.
pub const COUNTER_KEY: u32 = 0;

/// Capacity of the counter map: one logical slot, replicated per CPU by the kernel.
pub const COUNTER_MAP_ENTRIES: u32 = 1;

/// License declared by the eBPF object. Must be GPL-compatible for the full helper set.
pub const LICENSE: &str = "GPL";

/// Disposition of a received frame, numbered as the kernel's `xdp_action`.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Aborted = 0,
    Drop = 1,
    Pass = 2,
    Tx = 3,
    Redirect = 4,
}

impl Verdict {
    pub const fn as_u32(self) -> u32 {
        self as u32
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Verdict::Aborted => "XDP_ABORTED",
            Verdict::Drop => "XDP_DROP",
            Verdict::Pass => "XDP_PASS",
            Verdict::Tx => "XDP_TX",
            Verdict::Redirect => "XDP_REDIRECT",
        }
    }
}

#[cfg(feature = "userspace")]
impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Access to the executing CPU's counter slot.
///
/// Implementations hand out the slot owned by the calling CPU only. No other CPU ever
/// touches that slot, so a relaxed atomic add is the only synchronization needed.
pub trait CounterSlots {
    /// Returns the calling CPU's slot for `key`, or `None` when the map is absent.
    fn lookup(&self, key: u32) -> Option<&AtomicU64>;
}

impl<T: CounterSlots + ?Sized> CounterSlots for &T {
    fn lookup(&self, key: u32) -> Option<&AtomicU64> {
        (**self).lookup(key)
    }
}

/// Receive-hook body: count the frame on the local CPU and let it through.
///
/// Straight-line: one lookup, at most one atomic add, no loops. A lookup miss is a
/// no-op and still yields [`Verdict::Pass`].
#[inline(always)]
pub fn observe_frame<S: CounterSlots + ?Sized>(slots: &S) -> Verdict {
    if let Some(slot) = slots.lookup(COUNTER_KEY) {
        // Result unused so the BPF backend can lower this to a plain atomic add.
        slot.fetch_add(1, Ordering::Relaxed);
    }
    Verdict::Pass
}

#[cfg(feature = "userspace")]
const _: () = {
    assert!(
        core::mem::size_of::<Verdict>() == 4,
        "Verdict must match the u32 returned by XDP programs"
    );
};

#[cfg(test)]
mod tests {
    use super::*;

    struct OneSlot(AtomicU64);

    impl CounterSlots for OneSlot {
        fn lookup(&self, key: u32) -> Option<&AtomicU64> {
            (key == COUNTER_KEY).then_some(&self.0)
        }
    }

    struct NoMap;

    impl CounterSlots for NoMap {
        fn lookup(&self, _key: u32) -> Option<&AtomicU64> {
            None
        }
    }

    #[test]
    fn test_observe_frame_increments_local_slot() {
        let slot = OneSlot(AtomicU64::new(41));
        assert_eq!(observe_frame(&slot), Verdict::Pass);
        assert_eq!(slot.0.load(Ordering::Relaxed), 42);
    }

    #[test]
    fn test_observe_frame_counts_every_frame() {
        let slot = OneSlot(AtomicU64::new(0));
        for _ in 0..250 {
            observe_frame(&slot);
        }
        assert_eq!(slot.0.load(Ordering::Relaxed), 250);
    }

    #[test]
    fn test_lookup_miss_still_passes() {
        assert_eq!(observe_frame(&NoMap), Verdict::Pass);
    }

    #[test]
    fn test_observe_frame_through_trait_object() {
        let slot = OneSlot(AtomicU64::new(0));
        let dyn_slots: &dyn CounterSlots = &slot;
        assert_eq!(observe_frame(dyn_slots), Verdict::Pass);
        assert_eq!(slot.0.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_verdict_codes_match_xdp_action() {
        assert_eq!(Verdict::Aborted.as_u32(), 0);
        assert_eq!(Verdict::Drop.as_u32(), 1);
        assert_eq!(Verdict::Pass.as_u32(), 2);
        assert_eq!(Verdict::Tx.as_u32(), 3);
        assert_eq!(Verdict::Redirect.as_u32(), 4);
    }

    #[cfg(feature = "userspace")]
    #[test]
    fn test_verdict_display() {
        assert_eq!(Verdict::Pass.to_string(), "XDP_PASS");
        assert_eq!(Verdict::Redirect.to_string(), "XDP_REDIRECT");
    }
}
