pub mod cli;
pub mod error;
pub mod metrics;

pub use error::{Result, SentinelError};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
