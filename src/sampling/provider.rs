//! Progress providers for continuous sampling

use tracing::debug;
use crate::bench::engine::{Iterations, RunOutcome, DEFAULT_MICRO_BLOCK_SIZE};
use crate::bench::kernel::Kernel;
use crate::bench::parallel::{ParallelEngine, WorkerDispatch};
use crate::{Result, XopsError};

/// Source of a monotonically growing iteration count.
///
/// The sampler turns the difference between two reads into a throughput
/// sample; reads may lag slightly behind the workers.
pub trait ThroughputProvider: Send {
    /// Name used for the provider's series
    fn label(&self) -> &str;

    fn ops_per_iteration(&self) -> u32;

    /// Begin open-ended work
    fn start(&mut self) -> Result<()>;

    /// Cancel the work and wait for it to wind down
    fn stop(&mut self) -> Result<()>;

    /// Iterations completed since start or the last baseline reset
    fn progress(&self) -> u64;

    /// Restart counting from zero, used when warm-up ends
    fn reset_baseline(&mut self);
}

/// Multi-thread open-ended kernel run exposed as a provider
pub struct GopsProvider {
    label: String,
    kernel: Kernel,
    threads: usize,
    dispatch: WorkerDispatch,
    engine: ParallelEngine,
}

impl GopsProvider {
    pub fn new(kernel: Kernel, threads: usize) -> Result<Self> {
        Self::with_micro_block_size(kernel, threads, DEFAULT_MICRO_BLOCK_SIZE)
    }

    pub fn with_micro_block_size(kernel: Kernel, threads: usize, micro_block_size: u32) -> Result<Self> {
        if threads == 0 {
            return Err(XopsError::InvalidConfiguration(
                "provider thread count must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            label: kernel.unit().to_string(),
            kernel,
            threads,
            dispatch: WorkerDispatch::DedicatedThreads,
            engine: ParallelEngine::with_micro_block_size(micro_block_size)?,
        })
    }

    /// Single precision floating point provider
    pub fn gflops(threads: usize) -> Result<Self> {
        Self::new(Kernel::Flt32, threads)
    }

    /// 32-bit integer provider
    pub fn ginops(threads: usize) -> Result<Self> {
        Self::new(Kernel::Int32, threads)
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn kernel(&self) -> Kernel {
        self.kernel
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn is_running(&self) -> bool {
        self.engine.is_running()
    }
}

impl ThroughputProvider for GopsProvider {
    fn label(&self) -> &str {
        &self.label
    }

    fn ops_per_iteration(&self) -> u32 {
        self.kernel.ops_per_iteration()
    }

    fn start(&mut self) -> Result<()> {
        match self
            .engine
            .run_parallel(self.kernel, Iterations::OpenEnded, self.threads, self.dispatch)?
        {
            RunOutcome::OpenEnded => {
                debug!(provider = %self.label, threads = self.threads, "provider started");
                Ok(())
            }
            other => Err(XopsError::WorkerError(format!(
                "{} provider did not start an open-ended run: {:?}",
                self.label, other
            ))),
        }
    }

    fn stop(&mut self) -> Result<()> {
        debug!(provider = %self.label, "provider stopping");
        self.engine.stop()
    }

    fn progress(&self) -> u64 {
        self.engine.progress_iterations()
    }

    fn reset_baseline(&mut self) {
        self.engine.reset_progress();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_provider_presets() {
        let flops = GopsProvider::gflops(2).unwrap();
        assert_eq!(flops.kernel(), Kernel::Flt32);
        assert_eq!(flops.label(), "GFLOPS");
        assert_eq!(flops.ops_per_iteration(), Kernel::Flt32.ops_per_iteration());

        let inops = GopsProvider::ginops(2).unwrap().with_label("int");
        assert_eq!(inops.kernel(), Kernel::Int32);
        assert_eq!(inops.label(), "int");
        assert_eq!(inops.threads(), 2);
    }

    #[test]
    fn test_provider_rejects_zero_threads() {
        assert!(matches!(
            GopsProvider::gflops(0),
            Err(XopsError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_provider_progress_and_reset() {
        let mut provider = GopsProvider::with_micro_block_size(Kernel::Int64, 2, 10_000).unwrap();
        provider.start().unwrap();
        assert!(provider.is_running());

        thread::sleep(Duration::from_millis(50));
        let progress = provider.progress();
        assert!(progress > 0);
        assert_eq!(progress % 10_000, 0);

        provider.reset_baseline();
        assert!(provider.progress() < progress);

        provider.stop().unwrap();
        assert!(!provider.is_running());
    }
}
