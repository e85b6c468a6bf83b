use anyhow::{anyhow, Context};
use aya_build::cargo_metadata;
use std::env;
use std::path::Path;

/// Set when the XDP object was compiled and can be embedded with `include_bytes_aligned!`.
const EMBEDDED_CFG: &str = "sentinel_embedded_probe";

fn main() -> anyhow::Result<()> {
    println!("cargo:rustc-check-cfg=cfg({EMBEDDED_CFG})");
    println!("cargo:rerun-if-env-changed=SENTINEL_SKIP_EBPF_BUILD");

    // Skip eBPF build if we're already building for the eBPF target
    if env::var("CARGO_CFG_TARGET_ARCH").unwrap_or_default() == "bpf" {
        return Ok(());
    }

    if env::consts::OS != "linux" {
        println!(
            "cargo:warning=eBPF compilation skipped on {}. Pass --object to the agent instead.",
            env::consts::OS
        );
        return Ok(());
    }

    if env::var("CI").is_ok() || env::var("SENTINEL_SKIP_EBPF_BUILD").is_ok() {
        println!("cargo:warning=eBPF compilation skipped. The agent will need --object.");
        return Ok(());
    }

    // A missing bpf-linker or nightly toolchain leaves the agent usable with --object.
    if let Err(e) = build_probe() {
        println!("cargo:warning=eBPF compilation failed, embedding disabled: {e:#}");
        return Ok(());
    }

    println!("cargo:rustc-cfg={EMBEDDED_CFG}");
    Ok(())
}

fn build_probe() -> anyhow::Result<()> {
    let manifest_dir = env::var("CARGO_MANIFEST_DIR")?;
    let probes_manifest = Path::new(&manifest_dir).join("../sentinel-probes/Cargo.toml");

    // sentinel-probes is excluded from the workspace, so ask for its metadata directly.
    let cargo_metadata::Metadata { packages, .. } =
        cargo_metadata::MetadataCommand::new()
            .manifest_path(&probes_manifest)
            .no_deps()
            .exec()
            .context("MetadataCommand::exec")?;

    let ebpf_package = packages
        .into_iter()
        .find(|pkg| pkg.name.as_str() == "sentinel-probes")
        .ok_or_else(|| anyhow!("sentinel-probes package not found"))?;

    aya_build::build_ebpf([ebpf_package])?;

    let out_dir = env::var("OUT_DIR")?;
    let probe_path = Path::new(&out_dir).join("xdp_sentinel");
    if !probe_path.exists() {
        return Err(anyhow!(
            "eBPF probe compilation failed: {} not found",
            probe_path.display()
        ));
    }

    Ok(())
}
