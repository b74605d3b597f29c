//! Continuous sampling of open-ended runs
//!
//! A tokio interval task reads every provider's progress once per period and
//! appends the resulting throughput to that provider's series. The first
//! `warm_up_samples` ticks are discarded so ramp-up does not skew the series.

use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use crate::config::SamplingConfig;
use crate::sampling::provider::ThroughputProvider;
use crate::sampling::series::TimeSeries;
use crate::util::units::sample_gops;
use crate::{Result, XopsError};

const UPDATE_CHANNEL_CAPACITY: usize = 64;

/// Lifecycle of a continuous run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplingPhase {
    Idle,
    WarmingUp,
    Sampling,
    Stopped,
}

/// Notification sent after every timer tick
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingUpdate {
    /// 1-based tick number
    pub tick: u64,
    /// Phase after the tick was handled
    pub phase: SamplingPhase,
    /// Time since the run started
    pub elapsed: Duration,
}

struct SamplerState {
    providers: Vec<Box<dyn ThroughputProvider>>,
    last_progress: Vec<u64>,
    phase: SamplingPhase,
    warm_up_remaining: u32,
    ticks: u64,
}

impl SamplerState {
    fn on_tick(
        &mut self,
        interval_secs: f64,
        series: &RwLock<Vec<TimeSeries>>,
        elapsed: Duration,
    ) -> Option<SamplingUpdate> {
        match self.phase {
            SamplingPhase::Idle | SamplingPhase::Stopped => return None,
            SamplingPhase::WarmingUp => {
                self.warm_up_remaining = self.warm_up_remaining.saturating_sub(1);
                if self.warm_up_remaining == 0 {
                    for (provider, last) in self.providers.iter_mut().zip(self.last_progress.iter_mut()) {
                        provider.reset_baseline();
                        *last = provider.progress();
                    }
                    self.phase = SamplingPhase::Sampling;
                    info!("warm-up complete, sampling started");
                }
            }
            SamplingPhase::Sampling => {
                let mut series = write(series);
                for ((provider, last), series) in self
                    .providers
                    .iter()
                    .zip(self.last_progress.iter_mut())
                    .zip(series.iter_mut())
                {
                    let current = provider.progress();
                    let delta = current.saturating_sub(*last);
                    *last = current;
                    series.add(sample_gops(provider.ops_per_iteration(), delta, interval_secs));
                }
            }
        }

        self.ticks += 1;
        Some(SamplingUpdate {
            tick: self.ticks,
            phase: self.phase,
            elapsed,
        })
    }
}

fn lock(state: &Mutex<SamplerState>) -> MutexGuard<'_, SamplerState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write(series: &RwLock<Vec<TimeSeries>>) -> std::sync::RwLockWriteGuard<'_, Vec<TimeSeries>> {
    series.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn read(series: &RwLock<Vec<TimeSeries>>) -> std::sync::RwLockReadGuard<'_, Vec<TimeSeries>> {
    series.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Periodic throughput sampler over a set of providers
pub struct ContinuousRun {
    config: SamplingConfig,
    labels: Vec<String>,
    state: Arc<Mutex<SamplerState>>,
    series: Arc<RwLock<Vec<TimeSeries>>>,
    updates: broadcast::Sender<SamplingUpdate>,
    timer: Option<JoinHandle<()>>,
    started_at: Option<Instant>,
    stopped_after: Option<Duration>,
}

impl ContinuousRun {
    pub fn new(config: SamplingConfig) -> Result<Self> {
        config.validate()?;
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);

        Ok(Self {
            config,
            labels: Vec::new(),
            state: Arc::new(Mutex::new(SamplerState {
                providers: Vec::new(),
                last_progress: Vec::new(),
                phase: SamplingPhase::Idle,
                warm_up_remaining: 0,
                ticks: 0,
            })),
            series: Arc::new(RwLock::new(Vec::new())),
            updates,
            timer: None,
            started_at: None,
            stopped_after: None,
        })
    }

    /// Register a provider; only allowed before `start`
    pub fn add_provider(&mut self, provider: Box<dyn ThroughputProvider>) -> Result<()> {
        let mut state = lock(&self.state);
        if state.phase != SamplingPhase::Idle {
            return Err(XopsError::InvalidConfiguration(
                "providers can only be added before sampling starts".to_string(),
            ));
        }

        self.labels.push(provider.label().to_string());
        write(&self.series).push(TimeSeries::new(self.config.smoothing_points));
        state.last_progress.push(0);
        state.providers.push(provider);
        Ok(())
    }

    /// Start every provider and arm the sampling timer on the current runtime
    pub fn start(&mut self) -> Result<()> {
        let runtime = Handle::try_current()
            .map_err(|e| XopsError::TimerError(format!("no tokio runtime available: {}", e)))?;

        {
            let mut guard = lock(&self.state);
            let state = &mut *guard;
            if state.phase != SamplingPhase::Idle {
                return Err(XopsError::InvalidConfiguration(
                    "a sampling run cannot be restarted".to_string(),
                ));
            }

            for index in 0..state.providers.len() {
                if let Err(e) = state.providers[index].start() {
                    warn!(provider = %self.labels[index], error = %e, "provider failed to start");
                    for started in state.providers[..index].iter_mut() {
                        let _ = started.stop();
                    }
                    return Err(e);
                }
            }

            for (provider, last) in state.providers.iter().zip(state.last_progress.iter_mut()) {
                *last = provider.progress();
            }
            state.warm_up_remaining = self.config.warm_up_samples;
            state.phase = if self.config.warm_up_samples > 0 {
                SamplingPhase::WarmingUp
            } else {
                SamplingPhase::Sampling
            };
        }

        let started_at = Instant::now();
        let period = self.config.interval();
        let interval_secs = period.as_secs_f64();
        let state = Arc::clone(&self.state);
        let series = Arc::clone(&self.series);
        let updates = self.updates.clone();

        self.timer = Some(runtime.spawn(async move {
            let mut interval = tokio::time::interval_at(started_at + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let update = lock(&state).on_tick(interval_secs, &series, started_at.elapsed());
                match update {
                    // No subscribers is not an error
                    Some(update) => {
                        let _ = updates.send(update);
                    }
                    None => break,
                }
            }
        }));
        self.started_at = Some(started_at);

        info!(
            providers = self.labels.len(),
            interval_ms = self.config.interval_ms,
            warm_up = self.config.warm_up_samples,
            "sampling run started"
        );
        Ok(())
    }

    /// Abort the timer and stop every provider. Safe to call repeatedly.
    pub fn stop(&mut self) -> Result<()> {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }

        let mut state = lock(&self.state);
        if state.phase == SamplingPhase::Stopped {
            return Ok(());
        }
        let was_running = state.phase != SamplingPhase::Idle;
        state.phase = SamplingPhase::Stopped;

        let mut failure = None;
        if was_running {
            self.stopped_after = self.started_at.map(|t| t.elapsed());
            for provider in state.providers.iter_mut() {
                if let Err(e) = provider.stop() {
                    failure.get_or_insert(e);
                }
            }
            info!(ticks = state.ticks, "sampling run stopped");
        } else {
            debug!("sampling run stopped before start");
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn phase(&self) -> SamplingPhase {
        lock(&self.state).phase
    }

    pub fn is_warming_up(&self) -> bool {
        self.phase() == SamplingPhase::WarmingUp
    }

    pub fn is_running(&self) -> bool {
        matches!(self.phase(), SamplingPhase::WarmingUp | SamplingPhase::Sampling)
    }

    /// Ticks handled so far, warm-up included
    pub fn tick_count(&self) -> u64 {
        lock(&self.state).ticks
    }

    pub fn config(&self) -> &SamplingConfig {
        &self.config
    }

    /// Provider labels in registration order
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Snapshot of every series in registration order
    pub fn series(&self) -> Vec<TimeSeries> {
        read(&self.series).clone()
    }

    /// Snapshot of one provider's series
    pub fn series_for(&self, label: &str) -> Option<TimeSeries> {
        let index = self.labels.iter().position(|l| l == label)?;
        read(&self.series).get(index).cloned()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SamplingUpdate> {
        self.updates.subscribe()
    }

    /// Time since start; frozen once stopped
    pub fn elapsed(&self) -> Duration {
        match (self.stopped_after, self.started_at) {
            (Some(elapsed), _) => elapsed,
            (None, Some(started_at)) => started_at.elapsed(),
            (None, None) => Duration::ZERO,
        }
    }
}

impl Drop for ContinuousRun {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.stop();
        } else if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}
