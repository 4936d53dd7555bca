//! Performance baseline against fixed targets

use super::trend;
use crate::models::{BaselineEntry, MetricKind, MetricSample, PerformanceBaseline};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Target value per metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineTargets {
    pub response_time_ms: f64,
    pub throughput: f64,
    pub quality: f64,
    pub cpu: f64,
    pub memory: f64,
}

impl Default for BaselineTargets {
    fn default() -> Self {
        Self {
            response_time_ms: 200.0,
            throughput: 100.0,
            quality: 90.0,
            cpu: 70.0,
            memory: 75.0,
        }
    }
}

impl BaselineTargets {
    pub fn target(&self, metric: MetricKind) -> f64 {
        match metric {
            MetricKind::ResponseTime => self.response_time_ms,
            MetricKind::Throughput => self.throughput,
            MetricKind::Quality => self.quality,
            MetricKind::Cpu => self.cpu,
            MetricKind::Memory => self.memory,
        }
    }
}

/// Recompute the baseline from the most recent samples
///
/// Returns an empty baseline when there is no history yet.
pub fn compute_baseline(targets: &BaselineTargets, samples: &[MetricSample]) -> PerformanceBaseline {
    let Some(latest) = samples.last() else {
        return PerformanceBaseline::default();
    };

    let metrics: BTreeMap<MetricKind, BaselineEntry> = MetricKind::ALL
        .iter()
        .map(|&metric| {
            (
                metric,
                BaselineEntry {
                    target: targets.target(metric),
                    current: metric.value(latest),
                    trend: trend(metric, samples),
                },
            )
        })
        .collect();

    PerformanceBaseline {
        computed_at: Some(Utc::now()),
        metrics,
    }
}
