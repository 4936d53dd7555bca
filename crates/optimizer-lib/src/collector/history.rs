//! Bounded metrics history
//!
//! Keeps the most recent samples in a ring buffer with FIFO eviction and
//! mirrors every sample into a larger training accumulator used by the
//! load predictor.

use crate::models::MetricSample;
use std::collections::VecDeque;

/// Default number of samples kept for analysis
pub const DEFAULT_BUFFER_CAPACITY: usize = 1000;

/// Default number of samples kept for predictor training
pub const DEFAULT_TRAINING_CAPACITY: usize = 10_000;

/// Ring buffer of recent samples plus the training accumulator
#[derive(Debug, Clone)]
pub struct MetricsHistory {
    samples: VecDeque<MetricSample>,
    training: VecDeque<MetricSample>,
    capacity: usize,
    training_capacity: usize,
    total_ingested: u64,
}

impl Default for MetricsHistory {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY, DEFAULT_TRAINING_CAPACITY)
    }
}

impl MetricsHistory {
    pub fn new(capacity: usize, training_capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let training_capacity = training_capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            training: VecDeque::with_capacity(training_capacity.min(DEFAULT_BUFFER_CAPACITY)),
            capacity,
            training_capacity,
            total_ingested: 0,
        }
    }

    /// Append a sample, evicting the oldest entries beyond capacity
    pub fn push(&mut self, sample: MetricSample) {
        while self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        while self.training.len() >= self.training_capacity {
            self.training.pop_front();
        }
        self.training.push_back(sample.clone());
        self.samples.push_back(sample);
        self.total_ingested += 1;
    }

    /// The most recent `n` samples, oldest first
    pub fn latest(&self, n: usize) -> Vec<MetricSample> {
        let skip = self.samples.len().saturating_sub(n);
        self.samples.iter().skip(skip).cloned().collect()
    }

    /// Newest sample, if any
    pub fn last(&self) -> Option<&MetricSample> {
        self.samples.back()
    }

    /// The most recent `n` training samples, oldest first
    pub fn training_window(&self, n: usize) -> Vec<MetricSample> {
        let skip = self.training.len().saturating_sub(n);
        self.training.iter().skip(skip).cloned().collect()
    }

    /// All buffered samples, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &MetricSample> {
        self.samples.iter()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn training_len(&self) -> usize {
        self.training.len()
    }

    /// Number of samples ever recorded, including evicted ones
    pub fn total_ingested(&self) -> u64 {
        self.total_ingested
    }
}
