//! Utility functions module
//!
//! Contains throughput arithmetic and formatting helpers.

pub mod units;

// Re-export commonly used functions
pub use units::{
    calculate_gops, sample_gops,
    format_gops, format_elapsed,
    default_thread_count,
};
