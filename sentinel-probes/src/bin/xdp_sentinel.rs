//! XDP receive hook that counts every frame and passes it up the stack
//!
//! This probe:
//! - Attaches to a network interface's XDP receive path
//! - Increments a per-CPU counter (`packet_cnt`, key 0) for every frame
//! - Returns XDP_PASS unconditionally; frames are never altered
//!
//! Note: This binary must be built for the bpfel-unknown-none target.
//! sentinel-agent's build.rs handles the cross-compilation.

#![no_std]
#![no_main]

use aya_ebpf::{
    macros::{map, xdp},
    maps::PerCpuArray,
    programs::XdpContext,
};
use core::sync::atomic::AtomicU64;
use sentinel_common::{observe_frame, CounterSlots, COUNTER_MAP_ENTRIES};

#[map(name = "packet_cnt")]
static PACKET_CNT: PerCpuArray<u64> = PerCpuArray::with_max_entries(COUNTER_MAP_ENTRIES, 0);

/// The current CPU's view of `packet_cnt`.
struct LocalCounter;

impl CounterSlots for LocalCounter {
    #[inline(always)]
    fn lookup(&self, key: u32) -> Option<&AtomicU64> {
        let ptr = PACKET_CNT.get_ptr_mut(key)?;
        // SAFETY: the kernel returns an 8-byte aligned value that lives as long as the
        // map, and only this CPU writes to its copy.
        Some(unsafe { AtomicU64::from_ptr(ptr) })
    }
}

#[xdp]
pub fn xdp_sentinel_prog(_ctx: XdpContext) -> u32 {
    observe_frame(&LocalCounter).as_u32()
}

#[link_section = "license"]
#[no_mangle]
static LICENSE: [u8; 4] = *b"GPL\0";

#[cfg(not(test))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {}
}
