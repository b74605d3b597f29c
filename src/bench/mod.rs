//! Benchmark engine module
//!
//! Contains the workload kernels, the single-thread block runner and the
//! multi-thread engine with its start barrier.

pub mod barrier;
pub mod clock;
pub mod engine;
pub mod kernel;
pub mod parallel;

// Re-export commonly used types
pub use barrier::StartBarrier;
pub use engine::{CancelHandle, ComputeEngine, Iterations, RunOutcome, RunStats, OPEN_ENDED};
pub use kernel::{Kernel, OpClass, Precision};
pub use parallel::{ParallelEngine, WorkerDispatch};
