pub mod commands;

use crate::metrics::ExportFormat;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub const DEFAULT_PIN_PATH: &str = sentinel_agent::config::DEFAULT_PIN_PATH;

#[derive(Parser)]
#[command(name = "sentinel-xdp")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Read and export the SENTINEL XDP packet counter", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Read the pinned counter map of a running agent")]
    Stats {
        #[arg(short, long, default_value = DEFAULT_PIN_PATH, help = "Pinned counter map")]
        pin: PathBuf,

        #[arg(short, long, value_enum, default_value_t = ExportFormat::Json, help = "Output format")]
        format: ExportFormat,

        #[arg(short, long, help = "Output file path")]
        output: Option<PathBuf>,

        #[arg(short, long, value_name = "SECS", help = "Re-read every SECS seconds until Ctrl+C")]
        watch: Option<u64>,
    },
    #[command(about = "Drive the receive hook against an in-process per-CPU map")]
    Simulate {
        #[arg(long, default_value_t = 1000, help = "Frames to deliver")]
        frames: u64,

        #[arg(long, default_value_t = 4, help = "Logical CPUs")]
        cpus: usize,

        #[arg(long, help = "Deliver from one thread per CPU instead of round-robin")]
        concurrent: bool,

        #[arg(short, long, value_enum, default_value_t = ExportFormat::Json, help = "Output format")]
        format: ExportFormat,

        #[arg(short, long, help = "Output file path")]
        output: Option<PathBuf>,
    },
    #[command(about = "Show the program and map names a loader needs")]
    Info,
}
