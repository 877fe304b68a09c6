use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Error type for the sheetmon monitoring pipeline
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("Metrics unavailable: {0}")]
    MetricsUnavailable(String),

    #[error("Failed to scan {path:?}: {source}")]
    DirectoryScan {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Transient delivery error: {0}")]
    DeliveryTransient(String),

    #[error("Fatal delivery error: {0}")]
    DeliveryFatal(String),

    #[error("Delivery failed after {attempts} attempts: {last_error}")]
    RetryExhausted { attempts: u32, last_error: String },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for sheetmon
pub type Result<T> = std::result::Result<T, MonitorError>;

impl MonitorError {
    /// Create a config validation error
    pub fn config_invalid<S: Into<String>>(msg: S) -> Self {
        MonitorError::ConfigInvalid(msg.into())
    }

    pub fn metrics_unavailable<S: Into<String>>(msg: S) -> Self {
        MonitorError::MetricsUnavailable(msg.into())
    }

    pub fn directory_scan<P: Into<PathBuf>>(path: P, source: io::Error) -> Self {
        MonitorError::DirectoryScan {
            path: path.into(),
            source,
        }
    }

    /// Create a generic error
    pub fn other<S: Into<String>>(msg: S) -> Self {
        MonitorError::Other(msg.into())
    }
}
