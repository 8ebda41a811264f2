//! Error types for gpusched

use thiserror::Error;

/// Main error type for gpusched
#[derive(Error, Debug)]
pub enum GpuschedError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Device probe error
    #[error("Probe error: {0}")]
    Probe(String),

    /// Runtime error
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Scheduler error
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// Resource exhausted
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for gpusched operations
pub type GpuschedResult<T> = Result<T, GpuschedError>;

impl From<serde_json::Error> for GpuschedError {
    fn from(err: serde_json::Error) -> Self {
        GpuschedError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for GpuschedError {
    fn from(err: toml::de::Error) -> Self {
        GpuschedError::Config(err.to_string())
    }
}
