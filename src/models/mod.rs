//! Data models module
//!
//! Contains suite result data models and host information.

pub mod result;

// Re-export commonly used types
pub use result::{
    BenchmarkResult,
    RunMode,
    SystemInfo,
    ThroughputMetrics,
};
