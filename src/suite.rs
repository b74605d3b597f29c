//! Benchmark suite
//!
//! Runs every configured kernel on one thread and on the configured number of
//! threads, `repeats` times each, and aggregates the runs into results.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};
use crate::bench::engine::{CancelHandle, ComputeEngine, Iterations, RunOutcome};
use crate::bench::kernel::Kernel;
use crate::bench::parallel::ParallelEngine;
use crate::config::HarnessConfig;
use crate::models::result::{BenchmarkResult, RunMode, ThroughputMetrics};
use crate::util::units::format_gops;
use crate::Result;

/// Stops a suite from another thread
#[derive(Debug, Clone)]
pub struct SuiteCancel {
    stopped: Arc<AtomicBool>,
    single: CancelHandle,
    parallel: CancelHandle,
}

impl SuiteCancel {
    /// Cancel the current run and skip the remaining ones
    pub fn cancel(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.single.cancel();
        self.parallel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

pub struct BenchmarkSuite {
    config: HarnessConfig,
    threads: usize,
    single: ComputeEngine,
    parallel: ParallelEngine,
    stopped: Arc<AtomicBool>,
}

impl BenchmarkSuite {
    pub fn new(config: HarnessConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            threads: config.effective_thread_count(),
            single: ComputeEngine::with_micro_block_size(config.micro_block_size)?,
            parallel: ParallelEngine::with_micro_block_size(config.micro_block_size)?,
            config,
            stopped: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Worker count used for multi-thread runs
    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn cancel_handle(&self) -> SuiteCancel {
        SuiteCancel {
            stopped: self.stopped.clone(),
            single: self.single.cancel_handle(),
            parallel: self.parallel.cancel_handle(),
        }
    }

    /// Repeated single-thread runs of one kernel; `None` when cancelled
    pub fn run_single(&mut self, kernel: Kernel) -> Result<Option<BenchmarkResult>> {
        let iterations = Iterations::Fixed(self.config.iterations);
        let mut runs = Vec::with_capacity(self.config.repeats as usize);

        for _ in 0..self.config.repeats {
            if self.is_cancelled() {
                return Ok(None);
            }
            match self.single.run(kernel, iterations)? {
                // A cancel can be cleared by the engine as the run starts
                RunOutcome::Completed(_) if self.is_cancelled() => return Ok(None),
                RunOutcome::Completed(stats) => runs.push(ThroughputMetrics::from_stats(&stats)),
                _ => return Ok(None),
            }
        }

        Ok(Some(self.finish(kernel, RunMode::SingleThread, 1, runs)))
    }

    /// Repeated multi-thread runs of one kernel; `None` when cancelled
    pub fn run_multi(&mut self, kernel: Kernel) -> Result<Option<BenchmarkResult>> {
        let iterations = Iterations::Fixed(self.config.iterations);
        let mut runs = Vec::with_capacity(self.config.repeats as usize);

        for _ in 0..self.config.repeats {
            if self.is_cancelled() {
                return Ok(None);
            }
            match self
                .parallel
                .run_parallel(kernel, iterations, self.threads, self.config.dispatch)?
            {
                RunOutcome::Completed(_) if self.is_cancelled() => return Ok(None),
                RunOutcome::Completed(stats) => runs.push(ThroughputMetrics::from_stats(&stats)),
                _ => return Ok(None),
            }
        }

        Ok(Some(self.finish(kernel, RunMode::MultiThread, self.threads, runs)))
    }

    /// Run every configured kernel in both modes
    pub fn run(&mut self) -> Result<Vec<BenchmarkResult>> {
        self.run_with(|_| {})
    }

    /// Like `run`, calling `on_result` as each result becomes available.
    /// Cancellation returns what finished so far.
    pub fn run_with<F>(&mut self, mut on_result: F) -> Result<Vec<BenchmarkResult>>
    where
        F: FnMut(&BenchmarkResult),
    {
        let mut results = Vec::with_capacity(self.config.kernels.len() * 2);

        for kernel in self.config.kernels.clone() {
            for mode in [RunMode::SingleThread, RunMode::MultiThread] {
                let result = match mode {
                    RunMode::SingleThread => self.run_single(kernel)?,
                    RunMode::MultiThread => self.run_multi(kernel)?,
                };
                match result {
                    Some(result) => {
                        on_result(&result);
                        results.push(result);
                    }
                    None => {
                        warn!(kernel = %kernel, %mode, "suite cancelled");
                        return Ok(results);
                    }
                }
            }
        }

        Ok(results)
    }

    fn is_cancelled(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn finish(&self, kernel: Kernel, mode: RunMode, threads: usize, runs: Vec<ThroughputMetrics>) -> BenchmarkResult {
        let result = BenchmarkResult::new(kernel, mode, threads, self.config.iterations, runs);
        info!(
            kernel = %kernel,
            %mode,
            threads,
            throughput = %format_gops(result.headline_gops(), kernel.unit()),
            "suite entry finished"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::XopsError;

    fn quick(kernels: Vec<Kernel>) -> HarnessConfig {
        HarnessConfig::quick()
            .with_iterations(200_000)
            .with_micro_block_size(50_000)
            .with_repeats(2)
            .with_thread_count(2)
            .with_kernels(kernels)
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        assert!(matches!(
            BenchmarkSuite::new(HarnessConfig::default().with_repeats(0)),
            Err(XopsError::ConfigError(_))
        ));
    }

    #[test]
    fn test_single_entry() {
        let mut suite = BenchmarkSuite::new(quick(vec![Kernel::Int32])).unwrap();
        let result = suite.run_single(Kernel::Int32).unwrap().unwrap();

        assert_eq!(result.mode, RunMode::SingleThread);
        assert_eq!(result.threads, 1);
        assert_eq!(result.runs.len(), 2);
        assert!(result.runs.iter().all(|r| r.gops > 0.0 && r.gops.is_finite()));
        assert_eq!(result.headline_gops(), result.average.block_average_gops);
    }

    #[test]
    fn test_full_suite_order() {
        let mut suite = BenchmarkSuite::new(quick(vec![Kernel::Flt32, Kernel::Int64])).unwrap();
        let mut seen = 0;
        let results = suite.run_with(|_| seen += 1).unwrap();

        assert_eq!(seen, 4);
        let entries: Vec<_> = results.iter().map(|r| (r.kernel, r.mode, r.threads)).collect();
        assert_eq!(
            entries,
            vec![
                (Kernel::Flt32, RunMode::SingleThread, 1),
                (Kernel::Flt32, RunMode::MultiThread, 2),
                (Kernel::Int64, RunMode::SingleThread, 1),
                (Kernel::Int64, RunMode::MultiThread, 2),
            ]
        );
        let multi = &results[1];
        assert_eq!(multi.headline_gops(), multi.average.gops);
        assert!(multi.average.elapsed > std::time::Duration::ZERO);
    }

    #[test]
    fn test_single_cancel_during_entry_is_honoured() {
        let config = quick(vec![Kernel::Flt64])
            .with_iterations(16_000_000)
            .with_micro_block_size(1_000_000)
            .with_repeats(3);
        let mut suite = BenchmarkSuite::new(config).unwrap();
        let cancel = suite.cancel_handle();

        // One request only; it must not be lost whatever point the run has reached
        let canceller = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(5));
            cancel.cancel();
        });
        let result = suite.run_single(Kernel::Flt64).unwrap();
        canceller.join().unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_cancelled_suite_returns_nothing_further() {
        let mut suite = BenchmarkSuite::new(quick(Kernel::ALL.to_vec())).unwrap();
        let cancel = suite.cancel_handle();
        cancel.cancel();
        assert!(cancel.is_cancelled());

        let results = suite.run().unwrap();
        assert!(results.is_empty());
        assert!(suite.run_multi(Kernel::Int32).unwrap().is_none());
    }
}
