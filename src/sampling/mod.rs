//! Continuous sampling module
//!
//! Open-ended runs observed by a periodic sampler that keeps a smoothed
//! throughput series per provider.

pub mod continuous;
pub mod provider;
pub mod series;
pub mod stress;

// Re-export commonly used types
pub use crate::config::SamplingConfig;
pub use continuous::{ContinuousRun, SamplingPhase, SamplingUpdate};
pub use provider::{GopsProvider, ThroughputProvider};
pub use series::TimeSeries;
pub use stress::StressTest;
