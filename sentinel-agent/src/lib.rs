//! Node agent for the SENTINEL XDP packet counter
//!
//! Responsibilities:
//! - Load the XDP object and attach the receive hook to an interface
//! - Pin the per-CPU counter map for other readers
//! - Periodically read and aggregate the per-CPU counts
//! - Detach and release the map on shutdown

pub mod aggregator;
pub mod config;
pub mod pin;
pub mod sim;

#[cfg(target_os = "linux")]
pub mod probe_loader;
