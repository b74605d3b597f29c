//! Units formatting and conversion utilities
//!
//! Throughput arithmetic shared by every engine, plus human-readable
//! formatting of throughput and elapsed time.

use std::time::Duration;

/// Giga-operations per second for a run
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use xops::util::units::calculate_gops;
///
/// // 10 ops x 100M iterations x 2 threads in one second
/// let gops = calculate_gops(10, 100_000_000, 2, Duration::from_secs(1));
/// assert!((gops - 2.0).abs() < 1e-9);
/// ```
pub fn calculate_gops(ops_per_iteration: u32, iterations: u64, threads: usize, elapsed: Duration) -> f64 {
    if elapsed.is_zero() {
        return 0.0;
    }

    ops_per_iteration as f64 * iterations as f64 * threads as f64 / elapsed.as_secs_f64() / 1e9
}

/// Giga-operations per second for a sampled iteration delta
///
/// # Examples
/// ```
/// use xops::util::units::sample_gops;
///
/// assert!((sample_gops(9, 1_000_000_000, 1.0) - 9.0).abs() < 1e-9);
/// assert!((sample_gops(9, 1_000_000_000, 0.5) - 18.0).abs() < 1e-9);
/// ```
pub fn sample_gops(ops_per_iteration: u32, iterations_delta: u64, interval_secs: f64) -> f64 {
    if interval_secs <= 0.0 {
        return 0.0;
    }

    iterations_delta as f64 * ops_per_iteration as f64 / interval_secs / 1e9
}

/// Format a throughput value with its unit
///
/// # Examples
/// ```
/// use xops::util::units::format_gops;
///
/// assert_eq!(format_gops(12.346, "GFLOPS"), "12.35 GFLOPS");
/// ```
pub fn format_gops(gops: f64, unit: &str) -> String {
    format!("{:.2} {}", gops, unit)
}

/// Format elapsed time, truncated to milliseconds
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use xops::util::units::format_elapsed;
///
/// assert_eq!(format_elapsed(Duration::from_secs(90)), "1m 30s");
/// assert_eq!(format_elapsed(Duration::from_micros(1_500_250)), "1s 500ms");
/// ```
pub fn format_elapsed(elapsed: Duration) -> String {
    let truncated = Duration::from_millis(elapsed.as_millis() as u64);
    humantime::format_duration(truncated).to_string()
}

/// Default worker count: two per logical core
pub fn default_thread_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        * 2
}
