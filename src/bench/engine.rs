//! Single-thread run engine
//!
//! Runs a kernel on the calling thread in bounded blocks so that a cancel
//! request is observed within one block. Bounded runs report both the
//! end-to-end throughput and the mean of the per-block throughputs; open-ended
//! runs publish progress after every block until cancelled.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use crate::bench::barrier::StartBarrier;
use crate::bench::clock::Stopwatch;
use crate::bench::kernel::Kernel;
use crate::util::units::calculate_gops;
use crate::{Result, XopsError};

/// Default number of iterations between cancellation checks
pub const DEFAULT_MICRO_BLOCK_SIZE: u32 = 1_000_000;

/// Largest accepted block; also keeps every block within the FLT32 ceiling
pub const MAX_MICRO_BLOCK_SIZE: u32 = 16_000_000;

/// Raw iteration count meaning "run until cancelled"
pub const OPEN_ENDED: i64 = -1;

/// How long a run lasts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Iterations {
    /// Exactly this many iterations (per thread)
    Fixed(u64),
    /// Run until cancelled, publishing progress after each block
    OpenEnded,
}

impl Iterations {
    /// Interpret a raw count where `-1` means open-ended
    pub fn from_raw(count: i64) -> Result<Self> {
        match count {
            OPEN_ENDED => Ok(Iterations::OpenEnded),
            n if n >= 0 => Ok(Iterations::Fixed(n as u64)),
            n => Err(XopsError::InvalidConfiguration(format!(
                "iteration count must be >= 0 or {} for open-ended runs, got {}",
                OPEN_ENDED, n
            ))),
        }
    }

    pub fn is_open_ended(&self) -> bool {
        matches!(self, Iterations::OpenEnded)
    }

    /// Validate against the kernel ceiling; open-ended runs use block-sized chunks only
    pub(crate) fn check(&self, kernel: Kernel) -> Result<()> {
        match self {
            Iterations::Fixed(n) => kernel.check_iterations(*n),
            Iterations::OpenEnded => Ok(()),
        }
    }
}

pub(crate) fn check_micro_block_size(size: u32) -> Result<()> {
    if size == 0 || size > MAX_MICRO_BLOCK_SIZE {
        return Err(XopsError::InvalidConfiguration(format!(
            "micro block size must be between 1 and {}, got {}",
            MAX_MICRO_BLOCK_SIZE, size
        )));
    }
    Ok(())
}

/// State shared between an engine, its workers and its cancel handles.
///
/// `break_requested` may be set from any thread and is observed at block
/// boundaries. `progress` counts completed blocks of open-ended runs; it is
/// only ever changed with atomic read-modify-write operations and readers may
/// see a slightly stale value.
#[derive(Debug, Default)]
pub struct RunControl {
    break_requested: AtomicBool,
    progress: AtomicU64,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_break(&self) {
        self.break_requested.store(true, Ordering::SeqCst);
    }

    pub fn clear_break(&self) {
        self.break_requested.store(false, Ordering::SeqCst);
    }

    pub fn break_requested(&self) -> bool {
        self.break_requested.load(Ordering::SeqCst)
    }

    /// Completed blocks since the last reset
    pub fn progress(&self) -> u64 {
        self.progress.load(Ordering::Relaxed)
    }

    pub fn reset_progress(&self) {
        self.progress.store(0, Ordering::Relaxed);
    }

    pub(crate) fn record_block(&self) {
        self.progress.fetch_add(1, Ordering::Relaxed);
    }
}

/// Cloneable handle that cancels a run from another thread
#[derive(Debug, Clone)]
pub struct CancelHandle {
    control: Arc<RunControl>,
    barrier: Option<Arc<StartBarrier>>,
}

impl CancelHandle {
    pub(crate) fn new(control: Arc<RunControl>) -> Self {
        Self {
            control,
            barrier: None,
        }
    }

    pub(crate) fn with_barrier(control: Arc<RunControl>, barrier: Arc<StartBarrier>) -> Self {
        Self {
            control,
            barrier: Some(barrier),
        }
    }

    /// Request a stop at the next block boundary and release any pending rendezvous
    pub fn cancel(&self) {
        self.control.request_break();
        if let Some(barrier) = &self.barrier {
            barrier.collapse();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.control.break_requested()
    }
}

/// Measurements of a completed run
#[derive(Debug, Clone, PartialEq)]
pub struct RunStats {
    pub kernel: Kernel,
    /// Iterations executed by each thread
    pub iterations: u64,
    pub threads: usize,
    /// Measured wall-clock time
    pub elapsed: Duration,
    /// ops_per_iteration * iterations * threads / elapsed, in giga-ops/s
    pub gops: f64,
    /// Mean of per-block throughputs (summed across threads for parallel runs)
    pub block_average_gops: f64,
    /// Number of blocks each thread executed
    pub blocks: u64,
}

impl RunStats {
    /// Defined result of a zero-iteration run
    pub fn empty(kernel: Kernel, threads: usize) -> Self {
        Self {
            kernel,
            iterations: 0,
            threads,
            elapsed: Duration::ZERO,
            gops: 0.0,
            block_average_gops: 0.0,
            blocks: 0,
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }
}

/// Result of a run request
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Bounded run finished
    Completed(RunStats),
    /// Run was stopped before finishing; no timing is reported
    Cancelled,
    /// Open-ended parallel run was started and keeps running until cancelled
    OpenEnded,
}

impl RunOutcome {
    pub fn stats(&self) -> Option<&RunStats> {
        match self {
            RunOutcome::Completed(stats) => Some(stats),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RunOutcome::Cancelled)
    }
}

/// Runs kernels on the calling thread
#[derive(Debug)]
pub struct ComputeEngine {
    control: Arc<RunControl>,
    micro_block_size: u32,
    stopwatch: Stopwatch,
    last_result: Option<RunStats>,
}

impl ComputeEngine {
    /// Create an engine with the default block size
    pub fn new() -> Self {
        Self {
            control: Arc::new(RunControl::new()),
            micro_block_size: DEFAULT_MICRO_BLOCK_SIZE,
            stopwatch: Stopwatch::new(),
            last_result: None,
        }
    }

    /// Create an engine with a custom block size
    pub fn with_micro_block_size(micro_block_size: u32) -> Result<Self> {
        check_micro_block_size(micro_block_size)?;
        Ok(Self {
            micro_block_size,
            ..Self::new()
        })
    }

    /// Worker engine sharing the orchestrator's control state
    pub(crate) fn with_control(control: Arc<RunControl>, micro_block_size: u32) -> Self {
        Self {
            control,
            micro_block_size,
            stopwatch: Stopwatch::new(),
            last_result: None,
        }
    }

    pub fn micro_block_size(&self) -> u32 {
        self.micro_block_size
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle::new(self.control.clone())
    }

    /// Completed blocks of the current open-ended run
    pub fn progress(&self) -> u64 {
        self.control.progress()
    }

    pub fn last_result(&self) -> Option<&RunStats> {
        self.last_result.as_ref()
    }

    /// Run `kernel` on this thread.
    ///
    /// Clears any earlier cancel request first. An open-ended run only returns
    /// once cancelled.
    pub fn run(&mut self, kernel: Kernel, iterations: Iterations) -> Result<RunOutcome> {
        iterations.check(kernel)?;
        self.control.clear_break();
        self.control.reset_progress();

        let outcome = self.execute(kernel, iterations)?;
        if let RunOutcome::Completed(stats) = &outcome {
            debug!(
                kernel = %kernel,
                iterations = stats.iterations,
                elapsed_ms = stats.elapsed.as_millis() as u64,
                gops = stats.gops,
                "single-thread run completed"
            );
            self.last_result = Some(stats.clone());
        }
        Ok(outcome)
    }

    /// Block loop shared by single-thread runs and parallel workers
    pub(crate) fn execute(&mut self, kernel: Kernel, iterations: Iterations) -> Result<RunOutcome> {
        self.stopwatch.reset();
        match iterations {
            Iterations::Fixed(total) => self.execute_fixed(kernel, total),
            Iterations::OpenEnded => self.execute_open_ended(kernel),
        }
    }

    fn execute_fixed(&mut self, kernel: Kernel, total: u64) -> Result<RunOutcome> {
        if total == 0 {
            return Ok(RunOutcome::Completed(RunStats::empty(kernel, 1)));
        }

        let block_size = self.micro_block_size as u64;
        let ops = kernel.ops_per_iteration();
        let mut remaining = total;
        let mut block_gops_sum = 0.0;
        let mut blocks = 0u64;

        while remaining > 0 {
            if self.control.break_requested() {
                return Ok(RunOutcome::Cancelled);
            }

            let current = remaining.min(block_size);
            let before = self.stopwatch.elapsed();
            kernel.run(current as u32, &mut self.stopwatch)?;
            let block_elapsed = self.stopwatch.elapsed().saturating_sub(before);

            block_gops_sum += calculate_gops(ops, current, 1, block_elapsed);
            blocks += 1;
            remaining -= current;
        }

        let elapsed = self.stopwatch.elapsed();
        Ok(RunOutcome::Completed(RunStats {
            kernel,
            iterations: total,
            threads: 1,
            elapsed,
            gops: calculate_gops(ops, total, 1, elapsed),
            block_average_gops: block_gops_sum / blocks as f64,
            blocks,
        }))
    }

    fn execute_open_ended(&mut self, kernel: Kernel) -> Result<RunOutcome> {
        loop {
            if self.control.break_requested() {
                return Ok(RunOutcome::Cancelled);
            }
            kernel.run(self.micro_block_size, &mut self.stopwatch)?;
            self.control.record_block();
        }
    }
}

impl Default for ComputeEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bench::kernel::FLT32_MAX_ITERATIONS;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_iterations_from_raw() {
        assert_eq!(Iterations::from_raw(-1).unwrap(), Iterations::OpenEnded);
        assert_eq!(Iterations::from_raw(0).unwrap(), Iterations::Fixed(0));
        assert_eq!(Iterations::from_raw(42).unwrap(), Iterations::Fixed(42));
        assert!(matches!(
            Iterations::from_raw(-2),
            Err(XopsError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_micro_block_size_validation() {
        assert!(ComputeEngine::with_micro_block_size(0).is_err());
        assert!(ComputeEngine::with_micro_block_size(MAX_MICRO_BLOCK_SIZE + 1).is_err());
        assert_eq!(
            ComputeEngine::with_micro_block_size(1000).unwrap().micro_block_size(),
            1000
        );
    }

    #[test]
    fn test_zero_iterations_defined_result() {
        let mut engine = ComputeEngine::new();
        for kernel in Kernel::ALL {
            let outcome = engine.run(kernel, Iterations::Fixed(0)).unwrap();
            let stats = outcome.stats().unwrap();
            assert_eq!(stats.elapsed, Duration::ZERO);
            assert_eq!(stats.gops, 0.0);
            assert_eq!(stats.blocks, 0);
        }
    }

    #[test]
    fn test_bounded_run_reports_both_metrics() {
        let mut engine = ComputeEngine::with_micro_block_size(100_000).unwrap();
        for kernel in Kernel::ALL {
            let outcome = engine.run(kernel, Iterations::Fixed(450_000)).unwrap();
            let stats = outcome.stats().unwrap();
            assert_eq!(stats.iterations, 450_000);
            assert_eq!(stats.blocks, 5); // 4 full blocks and a 50k tail
            assert!(stats.elapsed > Duration::ZERO);
            assert!(stats.gops.is_finite() && stats.gops > 0.0);
            assert!(stats.block_average_gops.is_finite() && stats.block_average_gops > 0.0);
        }
        assert_eq!(engine.last_result().unwrap().kernel, Kernel::Int64);
    }

    #[test]
    fn test_gops_matches_elapsed() {
        let mut engine = ComputeEngine::new();
        let outcome = engine.run(Kernel::Int32, Iterations::Fixed(2_000_000)).unwrap();
        let stats = outcome.stats().unwrap();
        let expected = calculate_gops(Kernel::Int32.ops_per_iteration(), 2_000_000, 1, stats.elapsed);
        assert!((stats.gops - expected).abs() < 1e-9);
    }

    #[test]
    fn test_flt32_cap_enforced_before_run() {
        let mut engine = ComputeEngine::new();
        let result = engine.run(Kernel::Flt32, Iterations::Fixed(FLT32_MAX_ITERATIONS + 1));
        assert!(matches!(result, Err(XopsError::OutOfRange(_))));
        assert!(engine.last_result().is_none());
    }

    #[test]
    fn test_flt32_at_cap_succeeds() {
        let mut engine = ComputeEngine::new();
        let outcome = engine.run(Kernel::Flt32, Iterations::Fixed(FLT32_MAX_ITERATIONS)).unwrap();
        assert_eq!(outcome.stats().unwrap().iterations, FLT32_MAX_ITERATIONS);
    }

    #[test]
    fn test_repeated_runs_same_order_of_magnitude() {
        let mut engine = ComputeEngine::new();
        let a = engine.run(Kernel::Flt64, Iterations::Fixed(3_000_000)).unwrap();
        let b = engine.run(Kernel::Flt64, Iterations::Fixed(3_000_000)).unwrap();
        let (a, b) = (a.stats().unwrap().gops, b.stats().unwrap().gops);
        let ratio = a / b;
        assert!(ratio > 0.1 && ratio < 10.0, "ratio {} out of range", ratio);
    }

    #[test]
    fn test_open_ended_run_cancelled_from_other_thread() {
        let mut engine = ComputeEngine::with_micro_block_size(10_000).unwrap();
        let cancel = engine.cancel_handle();

        let finished = Arc::new(AtomicBool::new(false));
        let canceller = {
            let finished = finished.clone();
            // run() clears earlier requests when it starts, so keep asking
            thread::spawn(move || {
                while !finished.load(Ordering::SeqCst) {
                    thread::sleep(Duration::from_millis(25));
                    cancel.cancel();
                }
            })
        };

        let started = Instant::now();
        let outcome = engine.run(Kernel::Int64, Iterations::OpenEnded).unwrap();
        finished.store(true, Ordering::SeqCst);
        canceller.join().unwrap();

        assert_eq!(outcome, RunOutcome::Cancelled);
        assert!(engine.progress() > 0);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(engine.last_result().is_none());
    }

    #[test]
    fn test_run_clears_previous_cancel() {
        let mut engine = ComputeEngine::new();
        engine.cancel_handle().cancel();
        let outcome = engine.run(Kernel::Int32, Iterations::Fixed(1000)).unwrap();
        assert!(outcome.stats().is_some());
    }
}
