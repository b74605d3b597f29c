//! Combined floating point and integer stress test

use std::ops::{Deref, DerefMut};
use crate::bench::engine::DEFAULT_MICRO_BLOCK_SIZE;
use crate::bench::kernel::Kernel;
use crate::config::SamplingConfig;
use crate::sampling::continuous::ContinuousRun;
use crate::sampling::provider::GopsProvider;
use crate::sampling::series::TimeSeries;
use crate::Result;

/// A sampling run over a GFLOPS provider and a GINOPS provider
pub struct StressTest {
    run: ContinuousRun,
    threads_each: usize,
}

impl StressTest {
    pub fn new(threads_each: usize, sampling: SamplingConfig) -> Result<Self> {
        Self::with_micro_block_size(threads_each, sampling, DEFAULT_MICRO_BLOCK_SIZE)
    }

    pub fn with_micro_block_size(threads_each: usize, sampling: SamplingConfig, micro_block_size: u32) -> Result<Self> {
        let mut run = ContinuousRun::new(sampling)?;
        run.add_provider(Box::new(GopsProvider::with_micro_block_size(
            Kernel::Flt32,
            threads_each,
            micro_block_size,
        )?))?;
        run.add_provider(Box::new(GopsProvider::with_micro_block_size(
            Kernel::Int32,
            threads_each,
            micro_block_size,
        )?))?;

        Ok(Self { run, threads_each })
    }

    pub fn threads_each(&self) -> usize {
        self.threads_each
    }

    pub fn gflops(&self) -> Option<TimeSeries> {
        self.run.series_for(Kernel::Flt32.unit())
    }

    pub fn ginops(&self) -> Option<TimeSeries> {
        self.run.series_for(Kernel::Int32.unit())
    }
}

impl Deref for StressTest {
    type Target = ContinuousRun;

    fn deref(&self) -> &Self::Target {
        &self.run
    }
}

impl DerefMut for StressTest {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.run
    }
}
