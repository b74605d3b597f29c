//! Throughput time series
//!
//! Append-only samples with running extremes and a trailing average over the
//! last `smoothing_points` samples.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    smoothing_points: usize,
    samples: Vec<f64>,
    /// Trailing average after each sample
    smoothed: Vec<f64>,
    min: Option<f64>,
    max: Option<f64>,
    min_smooth: Option<f64>,
    max_smooth: Option<f64>,
    /// Average of the first `smoothing_points` samples, fixed once known
    start_value: Option<f64>,
}

impl TimeSeries {
    /// Create an empty series; a window below one sample is treated as one
    pub fn new(smoothing_points: usize) -> Self {
        Self {
            smoothing_points: smoothing_points.max(1),
            samples: Vec::new(),
            smoothed: Vec::new(),
            min: None,
            max: None,
            min_smooth: None,
            max_smooth: None,
            start_value: None,
        }
    }

    pub fn smoothing_points(&self) -> usize {
        self.smoothing_points
    }

    /// Append a sample
    pub fn add(&mut self, value: f64) {
        self.min = Some(self.min.map_or(value, |m| m.min(value)));
        self.max = Some(self.max.map_or(value, |m| m.max(value)));
        self.samples.push(value);

        let window = self.samples.len().min(self.smoothing_points);
        let smooth = mean(&self.samples[self.samples.len() - window..]);
        self.min_smooth = Some(self.min_smooth.map_or(smooth, |m| m.min(smooth)));
        self.max_smooth = Some(self.max_smooth.map_or(smooth, |m| m.max(smooth)));
        self.smoothed.push(smooth);

        if self.start_value.is_none() && self.samples.len() == self.smoothing_points {
            self.start_value = Some(smooth);
        }
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn smoothed(&self) -> &[f64] {
        &self.smoothed
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn min(&self) -> Option<f64> {
        self.min
    }

    pub fn max(&self) -> Option<f64> {
        self.max
    }

    pub fn min_smooth(&self) -> Option<f64> {
        self.min_smooth
    }

    pub fn max_smooth(&self) -> Option<f64> {
        self.max_smooth
    }

    /// Trailing average over the most recent samples
    pub fn current_value(&self) -> Option<f64> {
        self.smoothed.last().copied()
    }

    /// Initial throughput level.
    ///
    /// Until `smoothing_points` samples exist this is the provisional average
    /// of what has arrived; afterwards it never changes.
    pub fn start_value(&self) -> Option<f64> {
        match self.start_value {
            Some(value) => Some(value),
            None if self.samples.is_empty() => None,
            None => Some(mean(&self.samples)),
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}
