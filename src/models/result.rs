//! Benchmark result data models
//!
//! Contains structures for storing and serializing suite results and the
//! host they were measured on.

use std::fmt;
use std::time::Duration;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::bench::engine::RunStats;
use crate::bench::kernel::Kernel;
use crate::util::units::{format_elapsed, format_gops};

/// Whether a result came from one thread or from the rendezvous engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunMode {
    SingleThread,
    MultiThread,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::SingleThread => write!(f, "single-thread"),
            RunMode::MultiThread => write!(f, "multi-thread"),
        }
    }
}

/// Aggregated results of repeated runs of one kernel in one mode
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkResult {
    /// Timestamp when the runs finished
    pub timestamp: DateTime<Utc>,
    pub kernel: Kernel,
    pub mode: RunMode,
    pub threads: usize,
    /// Iterations per thread and run
    pub iterations: u64,
    /// One entry per repeat
    pub runs: Vec<ThroughputMetrics>,
    /// Mean over `runs`
    pub average: ThroughputMetrics,
    pub system_info: SystemInfo,
}

/// Throughput of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThroughputMetrics {
    #[serde(with = "duration_serde")]
    pub elapsed: Duration,
    /// End-to-end ratio of total operations to elapsed time
    pub gops: f64,
    /// Mean of per-block throughput
    pub block_average_gops: f64,
}

/// System information captured at benchmark time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SystemInfo {
    pub os: String,
    pub arch: String,
    pub logical_cores: usize,
}

impl BenchmarkResult {
    /// Create a result from repeated runs with detected system info
    pub fn new(kernel: Kernel, mode: RunMode, threads: usize, iterations: u64, runs: Vec<ThroughputMetrics>) -> Self {
        Self::with_system_info(kernel, mode, threads, iterations, runs, SystemInfo::detect())
    }

    pub fn with_system_info(
        kernel: Kernel,
        mode: RunMode,
        threads: usize,
        iterations: u64,
        runs: Vec<ThroughputMetrics>,
        system_info: SystemInfo,
    ) -> Self {
        let average = ThroughputMetrics::average(&runs);
        Self {
            timestamp: Utc::now(),
            kernel,
            mode,
            threads,
            iterations,
            runs,
            average,
            system_info,
        }
    }

    /// Headline throughput: block average on one thread, end-to-end on many
    pub fn headline_gops(&self) -> f64 {
        self.average.headline(self.mode)
    }

    pub fn unit(&self) -> &'static str {
        self.kernel.unit()
    }

    /// Human-readable one-line summary
    pub fn summary(&self) -> String {
        format!(
            "{} - {} {} x{} - {} - {} avg",
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            self.kernel,
            self.mode,
            self.threads,
            format_gops(self.headline_gops(), self.unit()),
            format_elapsed(self.average.elapsed),
        )
    }
}

impl ThroughputMetrics {
    pub fn new(elapsed: Duration, gops: f64, block_average_gops: f64) -> Self {
        Self {
            elapsed,
            gops,
            block_average_gops,
        }
    }

    pub fn from_stats(stats: &RunStats) -> Self {
        Self::new(stats.elapsed, stats.gops, stats.block_average_gops)
    }

    /// Field-wise mean; zero for no runs
    pub fn average(runs: &[ThroughputMetrics]) -> Self {
        if runs.is_empty() {
            return Self::new(Duration::ZERO, 0.0, 0.0);
        }

        let count = runs.len() as f64;
        let elapsed = runs.iter().map(|r| r.elapsed.as_secs_f64()).sum::<f64>() / count;
        Self::new(
            Duration::from_secs_f64(elapsed),
            runs.iter().map(|r| r.gops).sum::<f64>() / count,
            runs.iter().map(|r| r.block_average_gops).sum::<f64>() / count,
        )
    }

    pub fn headline(&self, mode: RunMode) -> f64 {
        match mode {
            RunMode::SingleThread => self.block_average_gops,
            RunMode::MultiThread => self.gops,
        }
    }
}

impl SystemInfo {
    pub fn detect() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            logical_cores: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }
}

/// Durations stored as integer nanoseconds
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_nanos() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let nanos = u64::deserialize(deserializer)?;
        Ok(Duration::from_nanos(nanos))
    }
}
