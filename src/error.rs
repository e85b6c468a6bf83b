use thiserror::Error;

#[derive(Error, Debug)]
pub enum SentinelError {
    #[error("Failed to read counter map: {0}")]
    MapReadFailed(String),

    #[error("Metrics error: {0}")]
    MetricsError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Unsupported feature on this system: {0}")]
    UnsupportedFeature(String),
}

impl From<prometheus::Error> for SentinelError {
    fn from(err: prometheus::Error) -> Self {
        SentinelError::MetricsError(err.to_string())
    }
}

impl From<serde_json::Error> for SentinelError {
    fn from(err: serde_json::Error) -> Self {
        SentinelError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for SentinelError {
    fn from(err: serde_yaml::Error) -> Self {
        SentinelError::SerializationError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SentinelError>;
