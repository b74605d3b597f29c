//! Configuration management module
//!
//! Handles loading, saving, and validation of harness and sampling settings.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::bench::engine::{DEFAULT_MICRO_BLOCK_SIZE, MAX_MICRO_BLOCK_SIZE};
use crate::bench::kernel::Kernel;
use crate::bench::parallel::WorkerDispatch;
use crate::util::units::default_thread_count;
use crate::{XopsError, Result, APP_NAME, CONFIG_FILE};

pub mod persistence;

/// Sampling parameters for continuous runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Timer period in milliseconds
    pub interval_ms: u64,
    /// Window of the trailing average
    pub smoothing_points: usize,
    /// Ticks discarded before sampling begins
    pub warm_up_samples: u32,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            smoothing_points: 3,
            warm_up_samples: 2,
        }
    }
}

impl SamplingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.interval_ms == 0 {
            return Err(XopsError::InvalidConfiguration(
                "Sampling interval must be greater than 0".to_string()
            ));
        }

        if self.smoothing_points == 0 {
            return Err(XopsError::InvalidConfiguration(
                "Smoothing points must be greater than 0".to_string()
            ));
        }

        Ok(())
    }

    pub fn with_interval_ms(mut self, interval_ms: u64) -> Self {
        self.interval_ms = interval_ms;
        self
    }

    pub fn with_smoothing_points(mut self, points: usize) -> Self {
        self.smoothing_points = points;
        self
    }

    pub fn with_warm_up_samples(mut self, samples: u32) -> Self {
        self.warm_up_samples = samples;
        self
    }
}

/// Harness configuration for the benchmark suite and stress test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Iterations per run and per thread
    pub iterations: u64,
    /// Iterations per timed block
    pub micro_block_size: u32,
    /// Runs per kernel and mode in the suite
    pub repeats: u32,
    /// Worker threads for multi-thread runs; 0 picks twice the logical cores
    pub thread_count: usize,
    /// Kernels exercised by the suite
    pub kernels: Vec<Kernel>,
    /// Worker scheduling for multi-thread runs
    pub dispatch: WorkerDispatch,
    pub sampling: SamplingConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            iterations: 16_000_000,
            micro_block_size: DEFAULT_MICRO_BLOCK_SIZE,
            repeats: 3,
            thread_count: 0,
            kernels: Kernel::ALL.to_vec(),
            dispatch: WorkerDispatch::DedicatedThreads,
            sampling: SamplingConfig::default(),
        }
    }
}

impl HarnessConfig {
    /// Create a new harness configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Short runs for smoke testing
    pub fn quick() -> Self {
        Self {
            iterations: 1_000_000,
            micro_block_size: 100_000,
            repeats: 1,
            ..Self::default()
        }
    }

    /// Validate the configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.iterations == 0 {
            return Err(XopsError::ConfigError(
                "Iterations must be greater than 0".to_string()
            ));
        }

        for kernel in &self.kernels {
            kernel.check_iterations(self.iterations)?;
        }

        if self.micro_block_size == 0 || self.micro_block_size > MAX_MICRO_BLOCK_SIZE {
            return Err(XopsError::ConfigError(
                format!("Micro block size must be between 1 and {}", MAX_MICRO_BLOCK_SIZE)
            ));
        }

        if self.repeats == 0 {
            return Err(XopsError::ConfigError(
                "Repeats must be greater than 0".to_string()
            ));
        }

        const MAX_THREADS: usize = 1024;
        if self.thread_count > MAX_THREADS {
            return Err(XopsError::ConfigError(
                format!("Too many threads: {} (max: {})", self.thread_count, MAX_THREADS)
            ));
        }

        if self.kernels.is_empty() {
            return Err(XopsError::ConfigError(
                "At least one kernel must be selected".to_string()
            ));
        }

        self.sampling.validate()
    }

    /// Thread count with the automatic default applied
    pub fn effective_thread_count(&self) -> usize {
        match self.thread_count {
            0 => default_thread_count(),
            n => n,
        }
    }

    pub fn with_iterations(mut self, iterations: u64) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_micro_block_size(mut self, size: u32) -> Self {
        self.micro_block_size = size;
        self
    }

    pub fn with_repeats(mut self, repeats: u32) -> Self {
        self.repeats = repeats;
        self
    }

    pub fn with_thread_count(mut self, count: usize) -> Self {
        self.thread_count = count;
        self
    }

    pub fn with_kernels(mut self, kernels: Vec<Kernel>) -> Self {
        self.kernels = kernels;
        self
    }

    pub fn with_dispatch(mut self, dispatch: WorkerDispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn with_sampling(mut self, sampling: SamplingConfig) -> Self {
        self.sampling = sampling;
        self
    }

    /// Load configuration from the standard config file location.
    /// Returns default configuration if the file doesn't exist.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file_path()?)
    }

    /// Save configuration to the standard config file location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .map_err(|e| XopsError::ConfigError(
                format!("Failed to read config file {}: {}", path.display(), e)
            ))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| XopsError::ConfigError(
                format!("Failed to parse config file {}: {}", path.display(), e)
            ))?;

        config.validate()?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        self.validate()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| XopsError::ConfigError(
                    format!("Failed to create config directory {}: {}", parent.display(), e)
                ))?;
        }

        let content = toml::to_string_pretty(self)?;

        fs::write(path, content)
            .map_err(|e| XopsError::ConfigError(
                format!("Failed to write config file {}: {}", path.display(), e)
            ))?;

        Ok(())
    }

    /// Uses $CONFIG_HOME/xops/xops.toml
    pub fn config_file_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| XopsError::ConfigError(
                "Unable to determine config directory".to_string()
            ))?;

        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }
}
