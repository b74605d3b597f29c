//! Two-phase start barrier
//!
//! Workers count down `ready`, then block on the start gate. The orchestrator
//! waits for `ready` to reach zero, takes its clock reading, opens the gate and
//! then waits for `done`. Collapsing the barrier zeroes both countdowns and
//! opens the gate so that no waiter on either side can be stranded.

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Instant;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panicking worker must not wedge the rendezvous for everyone else
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Counter that releases its waiters when it reaches zero
#[derive(Debug, Default)]
pub struct Countdown {
    remaining: Mutex<usize>,
    zero: Condvar,
}

impl Countdown {
    pub fn new(count: usize) -> Self {
        Self {
            remaining: Mutex::new(count),
            zero: Condvar::new(),
        }
    }

    pub fn reset(&self, count: usize) {
        let mut remaining = lock(&self.remaining);
        *remaining = count;
        if count == 0 {
            self.zero.notify_all();
        }
    }

    /// Decrement the counter; returns `false` if it was already zero
    pub fn signal(&self) -> bool {
        let mut remaining = lock(&self.remaining);
        if *remaining == 0 {
            return false;
        }
        *remaining -= 1;
        if *remaining == 0 {
            self.zero.notify_all();
        }
        true
    }

    /// Block until the counter reaches zero
    pub fn wait(&self) {
        let mut remaining = lock(&self.remaining);
        while *remaining > 0 {
            remaining = self
                .zero
                .wait(remaining)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    /// Force the counter to zero, releasing every waiter
    pub fn collapse(&self) {
        self.reset(0);
    }

    pub fn remaining(&self) -> usize {
        *lock(&self.remaining)
    }

    pub fn is_set(&self) -> bool {
        self.remaining() == 0
    }
}

/// Manually reset gate; closed until opened, stays open until closed
#[derive(Debug, Default)]
pub struct Gate {
    open: Mutex<bool>,
    opened: Condvar,
}

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self) {
        let mut open = lock(&self.open);
        *open = true;
        self.opened.notify_all();
    }

    pub fn close(&self) {
        *lock(&self.open) = false;
    }

    pub fn wait(&self) {
        let mut open = lock(&self.open);
        while !*open {
            open = self
                .opened
                .wait(open)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    pub fn is_open(&self) -> bool {
        *lock(&self.open)
    }
}

/// Rendezvous shared by the orchestrator and its workers.
///
/// Must be re-armed before every run and never shared by two runs at once.
#[derive(Debug, Default)]
pub struct StartBarrier {
    ready: Countdown,
    done: Countdown,
    gate: Gate,
}

impl StartBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepare for `threads` workers with the gate closed
    pub fn arm(&self, threads: usize) {
        self.gate.close();
        self.ready.reset(threads);
        self.done.reset(threads);
    }

    /// Worker side: report ready and block until released.
    ///
    /// Returns `false` without blocking if the barrier was collapsed before
    /// this worker arrived.
    pub fn arrive_and_wait(&self) -> bool {
        if !self.ready.signal() {
            return false;
        }
        self.gate.wait();
        true
    }

    /// Orchestrator side: block until every worker reported ready
    pub fn wait_ready(&self) {
        self.ready.wait();
    }

    /// Take the start reading, then let all workers go
    pub fn release(&self) -> Instant {
        let started_at = Instant::now();
        self.gate.open();
        started_at
    }

    pub fn signal_done(&self) {
        self.done.signal();
    }

    pub fn wait_done(&self) {
        self.done.wait();
    }

    /// Release every waiter on both sides
    pub fn collapse(&self) {
        self.ready.collapse();
        self.done.collapse();
        self.gate.open();
    }

    pub fn pending_ready(&self) -> usize {
        self.ready.remaining()
    }

    pub fn pending_done(&self) -> usize {
        self.done.remaining()
    }

    pub fn is_released(&self) -> bool {
        self.gate.is_open()
    }
}

/// Signals `done` when dropped, so a worker that errors or panics still
/// counts as finished
pub(crate) struct DoneGuard<'a> {
    barrier: &'a StartBarrier,
}

impl<'a> DoneGuard<'a> {
    pub(crate) fn new(barrier: &'a StartBarrier) -> Self {
        Self { barrier }
    }
}

impl Drop for DoneGuard<'_> {
    fn drop(&mut self) {
        self.barrier.signal_done();
    }
}
