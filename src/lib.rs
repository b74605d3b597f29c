//! XOPS - CPU arithmetic throughput benchmark
//!
//! Measures sustained floating-point and integer giga-operations per second
//! on one or many threads, with an open-ended stress mode that is sampled live.

use std::fmt;

// Public re-exports
pub mod bench;
pub mod config;
pub mod models;
pub mod sampling;
pub mod suite;
pub mod util;

// Common error types
#[derive(Debug)]
pub enum XopsError {
    /// Iteration count exceeds what a kernel can represent
    OutOfRange(String),
    /// Rejected run or sampling parameters
    InvalidConfiguration(String),
    /// Worker thread could not be spawned, panicked or failed to join
    WorkerError(String),
    /// Sampling timer could not be armed
    TimerError(String),
    /// Configuration file loading or parsing error
    ConfigError(String),
    /// Results persistence error
    PersistenceError(String),
    /// I/O operation failed
    IoError(std::io::Error),
}

impl fmt::Display for XopsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            XopsError::OutOfRange(msg) => write!(f, "Out of range: {}", msg),
            XopsError::InvalidConfiguration(msg) => write!(f, "Invalid configuration: {}", msg),
            XopsError::WorkerError(msg) => write!(f, "Worker error: {}", msg),
            XopsError::TimerError(msg) => write!(f, "Timer error: {}", msg),
            XopsError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            XopsError::PersistenceError(msg) => write!(f, "Results persistence error: {}", msg),
            XopsError::IoError(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for XopsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            XopsError::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for XopsError {
    fn from(err: std::io::Error) -> Self {
        XopsError::IoError(err)
    }
}

impl From<serde_json::Error> for XopsError {
    fn from(err: serde_json::Error) -> Self {
        XopsError::PersistenceError(format!("JSON serialization error: {}", err))
    }
}

impl From<toml::de::Error> for XopsError {
    fn from(err: toml::de::Error) -> Self {
        XopsError::ConfigError(format!("TOML parsing error: {}", err))
    }
}

impl From<toml::ser::Error> for XopsError {
    fn from(err: toml::ser::Error) -> Self {
        XopsError::ConfigError(format!("TOML serialization error: {}", err))
    }
}

/// Result type alias for XOPS operations
pub type Result<T> = std::result::Result<T, XopsError>;

/// Error reporting helpers
pub mod error {
    use super::XopsError;

    /// Convert error to user-friendly message with suggestions
    pub fn user_friendly_message(error: &XopsError) -> String {
        match error {
            XopsError::OutOfRange(_) => {
                "Too many iterations for single precision floats. Use at most 16 million."
                    .to_string()
            }
            XopsError::InvalidConfiguration(msg) => {
                format!("Invalid configuration: {}. Check your settings.", msg)
            }
            XopsError::WorkerError(_) => {
                "A benchmark thread failed. The run did not complete and its results are discarded."
                    .to_string()
            }
            XopsError::TimerError(_) => {
                "Unable to start the sampling timer. Stress test must run inside an async runtime."
                    .to_string()
            }
            XopsError::ConfigError(msg) => {
                format!("Configuration error: {}. Check your settings file.", msg)
            }
            XopsError::PersistenceError(_) => {
                "Failed to save results. Check disk space and permissions.".to_string()
            }
            _ => error.to_string(),
        }
    }

    /// Whether the run produced no usable measurement
    pub fn invalidates_run(error: &XopsError) -> bool {
        matches!(
            error,
            XopsError::OutOfRange(_)
                | XopsError::InvalidConfiguration(_)
                | XopsError::WorkerError(_)
                | XopsError::TimerError(_)
        )
    }
}

// Common types and constants
pub const APP_NAME: &str = "xops";
pub const CONFIG_FILE: &str = "xops.toml";
pub const RESULTS_FILE: &str = "results.json";
pub const MAX_RESULTS_HISTORY: usize = 100;
