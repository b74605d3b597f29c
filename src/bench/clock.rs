//! Accumulating stopwatch
//!
//! Start/stop pairs add to a running total, so a run split into many blocks
//! reports the time spent inside the loops only.

use std::time::{Duration, Instant};

#[derive(Debug, Default, Clone)]
pub struct Stopwatch {
    accumulated: Duration,
    started_at: Option<Instant>,
}

impl Stopwatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or keep) the clock running
    pub fn start(&mut self) {
        if self.started_at.is_none() {
            self.started_at = Some(Instant::now());
        }
    }

    /// Stop the clock, folding the running interval into the total
    pub fn stop(&mut self) {
        if let Some(started_at) = self.started_at.take() {
            self.accumulated += started_at.elapsed();
        }
    }

    pub fn reset(&mut self) {
        self.accumulated = Duration::ZERO;
        self.started_at = None;
    }

    pub fn is_running(&self) -> bool {
        self.started_at.is_some()
    }

    /// Total measured time, including the current interval if running
    pub fn elapsed(&self) -> Duration {
        match self.started_at {
            Some(started_at) => self.accumulated + started_at.elapsed(),
            None => self.accumulated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_stopwatch_accumulates_intervals() {
        let mut sw = Stopwatch::new();
        assert_eq!(sw.elapsed(), Duration::ZERO);

        sw.start();
        thread::sleep(Duration::from_millis(5));
        sw.stop();
        let first = sw.elapsed();
        assert!(first >= Duration::from_millis(5));

        // Time outside start/stop is not counted
        thread::sleep(Duration::from_millis(20));
        assert_eq!(sw.elapsed(), first);

        sw.start();
        thread::sleep(Duration::from_millis(5));
        sw.stop();
        assert!(sw.elapsed() >= first + Duration::from_millis(5));
    }

    #[test]
    fn test_stopwatch_reset() {
        let mut sw = Stopwatch::new();
        sw.start();
        assert!(sw.is_running());
        sw.reset();
        assert!(!sw.is_running());
        assert_eq!(sw.elapsed(), Duration::ZERO);
    }
}
