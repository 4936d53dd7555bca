//! Trend analysis over the metrics history
//!
//! Produces the cycle's analysis diff between the last two samples and
//! the recomputed performance baseline.

mod baseline;
mod trend;

pub use baseline::{compute_baseline, BaselineTargets};
pub use trend::{resource_trend, trend, RESOURCE_TREND_THRESHOLD, TREND_WINDOW};

use crate::models::{MetricSample, PerformanceBaseline, ResourceTrend};
use serde::{Deserialize, Serialize};

/// Change between the two most recent samples
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub response_time_change: f64,
    pub throughput_change: f64,
    pub quality_change: f64,
    pub resource_trend: ResourceTrend,
}

/// Diff the last two samples. `None` with fewer than two samples.
pub fn analyze(samples: &[MetricSample]) -> Option<Analysis> {
    if samples.len() < 2 {
        return None;
    }
    let previous = &samples[samples.len() - 2];
    let latest = &samples[samples.len() - 1];

    Some(Analysis {
        response_time_change: latest.performance.response_time_ms
            - previous.performance.response_time_ms,
        throughput_change: latest.performance.throughput - previous.performance.throughput,
        quality_change: latest.quality.overall - previous.quality.overall,
        resource_trend: resource_trend(samples),
    })
}

/// Analysis and baseline for one optimization cycle
#[derive(Debug, Clone)]
pub struct TrendAnalyzer {
    targets: BaselineTargets,
}

impl Default for TrendAnalyzer {
    fn default() -> Self {
        Self::new(BaselineTargets::default())
    }
}

impl TrendAnalyzer {
    pub fn new(targets: BaselineTargets) -> Self {
        Self { targets }
    }

    pub fn targets(&self) -> &BaselineTargets {
        &self.targets
    }

    pub fn analyze(&self, samples: &[MetricSample]) -> (Option<Analysis>, PerformanceBaseline) {
        (analyze(samples), compute_baseline(&self.targets, samples))
    }
}
