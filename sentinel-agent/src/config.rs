//! Agent configuration
//!
//! Every option can come from the command line or from the environment, so the agent
//! runs unchanged as a systemd unit, a privileged container, or by hand.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_INTERFACE: &str = "eth0";
pub const DEFAULT_PIN_PATH: &str = "/sys/fs/bpf/sentinel/packet_cnt";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// How the XDP program is attached to the interface
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, ValueEnum)]
pub enum XdpMode {
    /// Let the kernel pick native mode when the driver supports it
    #[default]
    Auto,
    /// Generic (skb) mode, works on every interface
    Skb,
    /// Native driver mode
    Driver,
    /// Offloaded to the NIC
    Hw,
}

#[cfg(target_os = "linux")]
impl XdpMode {
    pub fn flags(self) -> aya::programs::XdpFlags {
        use aya::programs::XdpFlags;
        match self {
            XdpMode::Auto => XdpFlags::default(),
            XdpMode::Skb => XdpFlags::SKB_MODE,
            XdpMode::Driver => XdpFlags::DRV_MODE,
            XdpMode::Hw => XdpFlags::HW_MODE,
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "sentinel-agent")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Attach the SENTINEL XDP packet counter and report its totals", long_about = None)]
pub struct AgentConfig {
    /// Network interface to attach to
    #[arg(long, env = "XDP_INTERFACE", default_value = DEFAULT_INTERFACE)]
    pub iface: String,

    /// XDP attach mode
    #[arg(long, env = "XDP_MODE", value_enum, default_value_t = XdpMode::Auto)]
    pub mode: XdpMode,

    /// Set to false to start without attaching anything
    #[arg(
        long,
        env = "XDP_ENABLED",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub enabled: bool,

    /// Seconds between counter reads
    #[arg(long, env = "SENTINEL_POLL_INTERVAL_SECS", default_value_t = DEFAULT_POLL_INTERVAL_SECS)]
    pub poll_interval_secs: u64,

    /// bpffs path where the counter map is pinned for other readers
    #[arg(long, env = "SENTINEL_PIN_PATH", default_value = DEFAULT_PIN_PATH)]
    pub pin_path: PathBuf,

    /// Do not pin the counter map
    #[arg(long)]
    pub no_pin: bool,

    /// Compiled XDP object to load instead of the embedded one
    #[arg(long, env = "SENTINEL_EBPF_OBJECT", value_name = "PATH")]
    pub object: Option<PathBuf>,
}

impl AgentConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn pin(&self) -> Option<&PathBuf> {
        (!self.no_pin).then_some(&self.pin_path)
    }
}
