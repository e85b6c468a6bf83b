//! XDP probe loader and lifecycle management

use crate::aggregator::CounterSnapshot;
use crate::config::XdpMode;
use crate::pin;
use anyhow::{anyhow, bail, Context, Result};
use aya::{
    maps::{Map, MapData, MapInfo, PerCpuArray},
    programs::{loaded_programs, xdp::XdpLinkId, Xdp},
    Ebpf,
};
use log::{debug, info, warn};
use sentinel_common::{COUNTER_KEY, COUNTER_MAP_NAME, PROGRAM_NAME};
use std::borrow::Borrow;
use std::fs;
use std::mem;
use std::path::{Path, PathBuf};

/// Oldest kernel with generic XDP, per-CPU arrays and atomic map adds
const MIN_KERNEL: (u32, u32) = (4, 18);

/// Where a loaded object is in its one-way lifecycle.
///
/// A detached object keeps its verified program and its map, so it is never attached
/// again. Re-attaching means loading a new object, which brings a fresh zeroed map.
#[derive(Debug, PartialEq, Eq)]
enum Lifecycle<L> {
    Loaded,
    Verified,
    Attached(L),
    Detached,
}

impl<L> Lifecycle<L> {
    /// Whether an attach still has to load the program into the kernel first
    fn needs_load(&self) -> Result<bool> {
        match self {
            Lifecycle::Loaded => Ok(true),
            Lifecycle::Verified => Ok(false),
            Lifecycle::Attached(_) => bail!("{PROGRAM_NAME} is already attached"),
            Lifecycle::Detached => bail!(
                "{PROGRAM_NAME} was detached; load a new ProbeManager to attach again with a fresh map"
            ),
        }
    }

    fn detach(&mut self) -> Option<L> {
        match mem::replace(self, Lifecycle::Detached) {
            Lifecycle::Attached(link) => Some(link),
            _ => None,
        }
    }
}

struct PinnedMap {
    path: PathBuf,
    map_id: u32,
}

/// Manages the XDP probe lifecycle: load, attach, pin, read, detach
pub struct ProbeManager {
    bpf: Ebpf,
    state: Lifecycle<XdpLinkId>,
    pin: Option<PinnedMap>,
}

impl ProbeManager {
    /// Create a new ProbeManager and load the XDP object.
    ///
    /// Loads `object` when given, otherwise the object embedded at build time.
    pub fn new(object: Option<&Path>) -> Result<Self> {
        run_preflight_checks()?;

        info!("Loading XDP probe...");
        let bpf = load_xdp_probe(object)?;

        Ok(Self {
            bpf,
            state: Lifecycle::Loaded,
            pin: None,
        })
    }

    /// Verify and attach the receive hook to `iface`
    pub fn attach(&mut self, iface: &str, mode: XdpMode) -> Result<()> {
        let needs_load = self.state.needs_load()?;

        info!("Attaching {} to {} ({:?} mode)...", PROGRAM_NAME, iface, mode);

        let program: &mut Xdp = self
            .bpf
            .program_mut(PROGRAM_NAME)
            .ok_or_else(|| anyhow!("{PROGRAM_NAME} program not found in eBPF object"))?
            .try_into()
            .context("xdp program has wrong type")?;

        if needs_load {
            // The verifier runs here; a rejection surfaces as a load error.
            program.load().context("Failed to load xdp program")?;
            self.state = Lifecycle::Verified;
        }

        let link = program
            .attach(iface, mode.flags())
            .with_context(|| format!("Failed to attach XDP to interface '{iface}'"))?;
        self.state = Lifecycle::Attached(link);

        info!("XDP probe attached to {}", iface);
        Ok(())
    }

    /// Pin the counter map so readers in other processes can open it.
    ///
    /// A stale pin from an earlier run is replaced. A pin whose map is still held by a
    /// live program belongs to another agent and makes this fail instead.
    pub fn pin_counters(&mut self, path: &Path) -> Result<()> {
        pin::prepare(path, pinned_map_in_use)?;

        let map = self
            .bpf
            .map(COUNTER_MAP_NAME)
            .ok_or_else(|| anyhow!("{COUNTER_MAP_NAME} map not found in eBPF object"))?;
        let map_id = map_id(map)?;
        map.pin(path)
            .map_err(|e| anyhow!("failed to pin {COUNTER_MAP_NAME} at {}: {e}", path.display()))?;

        info!("Counter map {} pinned at {}", map_id, path.display());
        self.pin = Some(PinnedMap {
            path: path.to_path_buf(),
            map_id,
        });
        Ok(())
    }

    /// Get the per-CPU counter array
    pub fn counters(&self) -> Result<PerCpuArray<&MapData, u64>> {
        // Collect map names first to avoid borrow conflict in error path
        let available_maps: Vec<_> = self.bpf.maps().map(|(name, _)| name.to_string()).collect();
        let map = self.bpf.map(COUNTER_MAP_NAME).ok_or_else(|| {
            anyhow!(
                "{} map not found in eBPF object. Available maps: {:?}",
                COUNTER_MAP_NAME,
                available_maps
            )
        })?;
        PerCpuArray::try_from(map)
            .with_context(|| format!("Failed to create PerCpuArray from {COUNTER_MAP_NAME} map"))
    }

    /// Read every CPU's partial count
    pub fn read_counters(&self) -> Result<CounterSnapshot> {
        read_snapshot(&self.counters()?)
    }

    /// Detach the hook from its interface; the map stays readable until unload.
    ///
    /// The manager cannot be attached again afterwards.
    pub fn detach(&mut self) -> Result<()> {
        let Some(link) = self.state.detach() else {
            return Ok(());
        };

        let program: &mut Xdp = self
            .bpf
            .program_mut(PROGRAM_NAME)
            .ok_or_else(|| anyhow!("{PROGRAM_NAME} program not found in eBPF object"))?
            .try_into()
            .context("xdp program has wrong type")?;
        program.detach(link).context("Failed to detach xdp program")?;

        info!("XDP probe detached");
        Ok(())
    }

    /// Detach, release the map and remove the pin this manager created
    pub fn unload(mut self) {
        info!("Unloading XDP probe...");
        if let Err(e) = self.detach() {
            warn!("Detach during unload failed: {:#}", e);
        }

        let pin = self.pin.take();
        drop(self.bpf);

        if let Some(PinnedMap { path, map_id }) = pin {
            if let Err(e) = pin::release(&path, |p| Ok(pinned_map_id(p)? == map_id)) {
                warn!("Failed to remove counter pin {}: {:#}", path.display(), e);
            }
        }
        info!("Probe unloaded");
    }
}

fn map_id(map: &Map) -> Result<u32> {
    let Map::PerCpuArray(data) = map else {
        bail!("{COUNTER_MAP_NAME} is not a per-CPU array");
    };
    let info = data
        .info()
        .with_context(|| format!("Failed to query {COUNTER_MAP_NAME} map info"))?;
    Ok(info.id())
}

fn pinned_map_id(path: &Path) -> Result<u32> {
    let info = MapInfo::from_pin(path)
        .with_context(|| format!("failed to open pinned map {}", path.display()))?;
    Ok(info.id())
}

/// Whether any program loaded in the kernel still uses the map pinned at `path`
fn pinned_map_in_use(path: &Path) -> Result<bool> {
    let id = pinned_map_id(path)?;

    for program in loaded_programs() {
        let program = program.context("Failed to list loaded eBPF programs")?;
        let Some(map_ids) = program
            .map_ids()
            .context("Failed to read program map ids")?
        else {
            bail!("kernel does not report program map ids; cannot tell who holds map {id}");
        };
        if map_ids.contains(&id) {
            debug!("Pinned map {} is used by a live program", id);
            return Ok(true);
        }
    }
    Ok(false)
}

/// Read the counters from a map pinned by a running agent
pub fn read_pinned(path: &Path) -> Result<CounterSnapshot> {
    let map_data = MapData::from_pin(path)
        .map_err(|e| anyhow!("failed to open pinned map {}: {e}", path.display()))?;
    let map = Map::PerCpuArray(map_data);
    let array = PerCpuArray::<_, u64>::try_from(map)
        .map_err(|e| anyhow!("failed to convert to PerCpuArray: {e}"))?;
    read_snapshot(&array)
}

fn read_snapshot<T: Borrow<MapData>>(array: &PerCpuArray<T, u64>) -> Result<CounterSnapshot> {
    let values = array
        .get(&COUNTER_KEY, 0)
        .with_context(|| format!("Failed to read {COUNTER_MAP_NAME}[{COUNTER_KEY}]"))?;
    Ok(CounterSnapshot::from_per_cpu(values.iter().copied()))
}

/// Load the XDP object from a file or from the build-time embedded bytes
fn load_xdp_probe(object: Option<&Path>) -> Result<Ebpf> {
    match object {
        Some(path) => {
            info!("Loading eBPF object from {}", path.display());
            let data = fs::read(path)
                .with_context(|| format!("Failed to read eBPF object file {}", path.display()))?;
            Ebpf::load(&data).context("Failed to load eBPF program")
        }
        None => load_embedded(),
    }
}

#[cfg(sentinel_embedded_probe)]
fn load_embedded() -> Result<Ebpf> {
    Ebpf::load(aya::include_bytes_aligned!(concat!(
        env!("OUT_DIR"),
        "/xdp_sentinel"
    )))
    .context("Failed to load embedded eBPF program")
}

#[cfg(not(sentinel_embedded_probe))]
fn load_embedded() -> Result<Ebpf> {
    bail!("This build has no embedded XDP object. Pass --object <path> to a compiled probe")
}

/// Run pre-flight checks to validate the system can run XDP programs
fn run_preflight_checks() -> Result<()> {
    info!("Running pre-flight checks...");

    check_kernel_version()?;
    check_capabilities();

    info!("Pre-flight checks passed");
    Ok(())
}

fn check_kernel_version() -> Result<()> {
    let output = std::process::Command::new("uname")
        .arg("-r")
        .output()
        .context("Failed to get kernel version")?;

    let version_str = String::from_utf8(output.stdout)?;
    let (major, minor) = parse_kernel_version(&version_str)?;

    if (major, minor) < MIN_KERNEL {
        bail!(
            "Kernel {} is too old. The XDP probe requires kernel {}.{}+",
            version_str.trim(),
            MIN_KERNEL.0,
            MIN_KERNEL.1
        );
    }

    info!("Kernel version: {} (supported)", version_str.trim());
    Ok(())
}

/// Parse `major.minor` out of a `uname -r` release string
pub fn parse_kernel_version(release: &str) -> Result<(u32, u32)> {
    let mut parts = release.trim().split('.');

    let major: u32 = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow!("Could not parse kernel version: {release}"))?
        .parse()
        .context("Invalid kernel major version")?;

    let minor_str = parts
        .next()
        .ok_or_else(|| anyhow!("Could not parse kernel version: {release}"))?;
    let minor: u32 = minor_str
        .split(|c: char| !c.is_ascii_digit())
        .next()
        .unwrap_or_default()
        .parse()
        .context("Invalid kernel minor version")?;

    Ok((major, minor))
}

/// Loading and attaching needs CAP_BPF and CAP_NET_ADMIN; only warn, the load reports
/// the real error
fn check_capabilities() {
    let euid = unsafe { libc::geteuid() };

    if euid != 0 {
        warn!(
            "Not running as root (euid={}). Ensure CAP_BPF and CAP_NET_ADMIN are granted.",
            euid
        );
    } else {
        info!("Running with root privileges");
    }
}
