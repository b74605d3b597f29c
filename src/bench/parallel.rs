//! Multi-thread run engine
//!
//! Spawns a fixed set of workers, holds them at a start barrier until every
//! one has arrived and only then starts the clock. Thread creation and
//! scheduler onboarding therefore never show up in the measured window.
//!
//! Workers run on dedicated OS threads by default. A general purpose task
//! scheduler may hold back many simultaneously queued tasks for a long time,
//! which breaks the simultaneous start, so the blocking pool dispatch exists
//! for comparison only.

use std::sync::{mpsc, Arc};
use std::thread;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use crate::bench::barrier::{DoneGuard, StartBarrier};
use crate::bench::engine::{
    check_micro_block_size, CancelHandle, ComputeEngine, Iterations, RunControl, RunOutcome,
    RunStats, DEFAULT_MICRO_BLOCK_SIZE,
};
use crate::bench::kernel::Kernel;
use crate::util::units::calculate_gops;
use crate::{Result, XopsError};

/// How worker bodies are scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WorkerDispatch {
    /// One named OS thread per worker
    #[default]
    DedicatedThreads,
    /// tokio's blocking pool; needs a runtime and gives no start guarantees
    BlockingPool,
}

/// Workers of one run, reporting through a channel
struct WorkerSet {
    reports: mpsc::Receiver<Result<RunOutcome>>,
    threads: Vec<thread::JoinHandle<()>>,
    count: usize,
}

impl WorkerSet {
    /// Wait for every worker to exit and return their outcomes
    fn collect(self) -> Result<Vec<RunOutcome>> {
        let mut outcomes = Vec::with_capacity(self.count);
        let mut failure = None;

        for _ in 0..self.count {
            match self.reports.recv() {
                Ok(Ok(outcome)) => outcomes.push(outcome),
                Ok(Err(e)) => {
                    failure.get_or_insert(e);
                }
                Err(_) => {
                    failure.get_or_insert(XopsError::WorkerError(
                        "worker exited without reporting".to_string(),
                    ));
                    break;
                }
            }
        }

        for handle in self.threads {
            if handle.join().is_err() {
                failure.get_or_insert(XopsError::WorkerError("worker thread panicked".to_string()));
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(outcomes),
        }
    }
}

/// Runs kernels on many threads with a simultaneous start
pub struct ParallelEngine {
    control: Arc<RunControl>,
    barrier: Arc<StartBarrier>,
    micro_block_size: u32,
    active: Option<WorkerSet>,
    last_result: Option<RunStats>,
}

impl ParallelEngine {
    pub fn new() -> Self {
        Self {
            control: Arc::new(RunControl::new()),
            barrier: Arc::new(StartBarrier::new()),
            micro_block_size: DEFAULT_MICRO_BLOCK_SIZE,
            active: None,
            last_result: None,
        }
    }

    pub fn with_micro_block_size(micro_block_size: u32) -> Result<Self> {
        check_micro_block_size(micro_block_size)?;
        let mut engine = Self::new();
        engine.micro_block_size = micro_block_size;
        Ok(engine)
    }

    pub fn micro_block_size(&self) -> u32 {
        self.micro_block_size
    }

    /// Handle that cancels the current run from any thread
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle::with_barrier(self.control.clone(), self.barrier.clone())
    }

    /// Stop all workers at their next block boundary and release the barrier
    pub fn cancel(&self) {
        debug!("cancelling parallel run");
        self.cancel_handle().cancel();
    }

    /// Whether an open-ended run still has workers attached
    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    /// Blocks completed by all workers of the current open-ended run
    pub fn progress(&self) -> u64 {
        self.control.progress()
    }

    /// Iterations completed by all workers of the current open-ended run
    pub fn progress_iterations(&self) -> u64 {
        self.progress() * self.micro_block_size as u64
    }

    pub fn reset_progress(&self) {
        self.control.reset_progress();
    }

    pub fn last_result(&self) -> Option<&RunStats> {
        self.last_result.as_ref()
    }

    /// Wait for the workers of a cancelled open-ended run to exit
    pub fn join_workers(&mut self) -> Result<()> {
        match self.active.take() {
            Some(workers) => workers.collect().map(|_| ()),
            None => Ok(()),
        }
    }

    /// Cancel the current run and wait for its workers
    pub fn stop(&mut self) -> Result<()> {
        self.cancel();
        self.join_workers()
    }

    /// Run `kernel` on `threads` workers, each executing `iterations`.
    ///
    /// Bounded runs block until every worker is done and report the time
    /// between the simultaneous start and the last finish. Open-ended runs
    /// return `RunOutcome::OpenEnded` as soon as the workers are released.
    pub fn run_parallel(
        &mut self,
        kernel: Kernel,
        iterations: Iterations,
        threads: usize,
        dispatch: WorkerDispatch,
    ) -> Result<RunOutcome> {
        if threads == 0 {
            return Err(XopsError::InvalidConfiguration(
                "thread count must be greater than 0".to_string(),
            ));
        }
        iterations.check(kernel)?;

        if self.active.is_some() {
            if !self.control.break_requested() {
                return Err(XopsError::InvalidConfiguration(
                    "an open-ended run is still active; cancel it first".to_string(),
                ));
            }
            self.join_workers()?;
        }

        self.control.clear_break();
        self.control.reset_progress();
        self.barrier.arm(threads);
        self.launch(kernel, iterations, threads, dispatch)
    }

    /// Spawn, rendezvous and measure; the barrier must already be armed
    fn launch(
        &mut self,
        kernel: Kernel,
        iterations: Iterations,
        threads: usize,
        dispatch: WorkerDispatch,
    ) -> Result<RunOutcome> {
        debug!(kernel = %kernel, threads, ?dispatch, "spawning workers");
        let workers = self.spawn_workers(kernel, iterations, threads, dispatch)?;

        self.barrier.wait_ready();
        if self.control.break_requested() {
            // A cancel that landed before arming left the gate closed
            self.barrier.collapse();
            workers.collect()?;
            return Ok(RunOutcome::Cancelled);
        }
        let started_at = self.barrier.release();

        if iterations.is_open_ended() {
            info!(kernel = %kernel, threads, "open-ended run started");
            self.active = Some(workers);
            return Ok(RunOutcome::OpenEnded);
        }

        self.barrier.wait_done();
        let elapsed = started_at.elapsed();
        let outcomes = workers.collect()?;

        if self.control.break_requested() || outcomes.iter().any(RunOutcome::is_cancelled) {
            info!(kernel = %kernel, threads, "parallel run cancelled");
            return Ok(RunOutcome::Cancelled);
        }

        let total = match iterations {
            Iterations::Fixed(n) => n,
            Iterations::OpenEnded => 0,
        };
        if total == 0 {
            let stats = RunStats::empty(kernel, threads);
            self.last_result = Some(stats.clone());
            return Ok(RunOutcome::Completed(stats));
        }

        let worker_stats: Vec<&RunStats> = outcomes.iter().filter_map(RunOutcome::stats).collect();
        let stats = RunStats {
            kernel,
            iterations: total,
            threads,
            elapsed,
            gops: calculate_gops(kernel.ops_per_iteration(), total, threads, elapsed),
            block_average_gops: worker_stats.iter().map(|s| s.block_average_gops).sum(),
            blocks: worker_stats.first().map(|s| s.blocks).unwrap_or(0),
        };

        info!(
            kernel = %kernel,
            threads,
            elapsed_ms = elapsed.as_millis() as u64,
            gops = stats.gops,
            "parallel run completed"
        );
        self.last_result = Some(stats.clone());
        Ok(RunOutcome::Completed(stats))
    }

    fn spawn_workers(
        &self,
        kernel: Kernel,
        iterations: Iterations,
        threads: usize,
        dispatch: WorkerDispatch,
    ) -> Result<WorkerSet> {
        let runtime = match dispatch {
            WorkerDispatch::DedicatedThreads => None,
            WorkerDispatch::BlockingPool => Some(tokio::runtime::Handle::try_current().map_err(
                |e| XopsError::WorkerError(format!("blocking pool dispatch needs a tokio runtime: {}", e)),
            )?),
        };

        let (report_tx, reports) = mpsc::channel();
        let mut handles = Vec::with_capacity(threads);

        for id in 0..threads {
            let barrier = self.barrier.clone();
            let control = self.control.clone();
            let tx = report_tx.clone();
            let micro_block_size = self.micro_block_size;
            let body = move || {
                let outcome = worker_body(&barrier, control, kernel, iterations, micro_block_size);
                let _ = tx.send(outcome);
            };

            let spawned = match &runtime {
                Some(handle) => {
                    // Detached; the report channel tells us when it is done
                    drop(handle.spawn_blocking(body));
                    Ok(())
                }
                None => thread::Builder::new()
                    .name(format!("xops-worker-{}", id))
                    .spawn(body)
                    .map(|handle| handles.push(handle)),
            };

            if let Err(e) = spawned {
                warn!(worker = id, error = %e, "failed to spawn worker");
                self.cancel();
                drop(report_tx);
                let partial = WorkerSet {
                    reports,
                    threads: handles,
                    count: id,
                };
                let _ = partial.collect();
                return Err(XopsError::WorkerError(format!("failed to spawn worker {}: {}", id, e)));
            }
        }

        Ok(WorkerSet {
            reports,
            threads: handles,
            count: threads,
        })
    }
}

impl Default for ParallelEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ParallelEngine {
    fn drop(&mut self) {
        if self.active.is_some() {
            self.cancel();
            let _ = self.join_workers();
        }
    }
}

fn worker_body(
    barrier: &StartBarrier,
    control: Arc<RunControl>,
    kernel: Kernel,
    iterations: Iterations,
    micro_block_size: u32,
) -> Result<RunOutcome> {
    let _done = DoneGuard::new(barrier);

    // Always arrive, so the orchestrator's ready wait cannot be stranded
    if !barrier.arrive_and_wait() || control.break_requested() {
        return Ok(RunOutcome::Cancelled);
    }

    let mut engine = ComputeEngine::with_control(control, micro_block_size);
    engine.execute(kernel, iterations)
}
