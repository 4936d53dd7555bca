//! Metrics collection job
//!
//! Fetches one snapshot per tick, converts it into a `MetricSample` and
//! appends it to the shared history. A failed fetch skips the tick.

use super::{detect_bottlenecks, MetricsHistory, MetricsSource, RawSnapshot};
use crate::error::{OptimizerError, OptimizerResult};
use crate::health::{components, HealthRegistry};
use crate::models::{
    MetricSample, PerformanceMetrics, QualityMetrics, ResourceUtilization, WorkloadCounters,
};
use crate::observability::OptimizerMetrics;
use crate::supervisor::PeriodicJob;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Default collection cadence
pub const DEFAULT_COLLECTION_INTERVAL_SECS: u64 = 30;

/// Samples metrics into the bounded history
pub struct MetricsCollector {
    source: Arc<dyn MetricsSource>,
    history: Arc<RwLock<MetricsHistory>>,
    health: HealthRegistry,
    metrics: OptimizerMetrics,
}

impl MetricsCollector {
    pub fn new(
        source: Arc<dyn MetricsSource>,
        history: Arc<RwLock<MetricsHistory>>,
        health: HealthRegistry,
    ) -> Self {
        Self {
            source,
            history,
            health,
            metrics: OptimizerMetrics::new(),
        }
    }

    /// Shared handle to the history this collector writes
    pub fn history(&self) -> Arc<RwLock<MetricsHistory>> {
        self.history.clone()
    }

    /// Fetch one snapshot and record it
    pub async fn collect_once(&self) -> OptimizerResult<MetricSample> {
        let start = Instant::now();

        let snapshot = match self.source.fetch().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.metrics.inc_collection_errors();
                warn!(error = %e, "Metrics fetch failed, skipping tick");
                self.health
                    .set_degraded(components::COLLECTOR, format!("metrics fetch failed: {}", e))
                    .await;
                return Err(OptimizerError::TransientMetrics(format!("{:#}", e)));
            }
        };

        let sample = build_sample(&snapshot, Utc::now());

        let (buffered, training) = {
            let mut history = self.history.write().await;
            history.push(sample.clone());
            (history.len(), history.training_len())
        };

        self.metrics.set_history_sizes(buffered, training);
        self.metrics
            .observe_collection_latency(start.elapsed().as_secs_f64());
        self.health.set_healthy(components::COLLECTOR).await;

        debug!(
            response_time_ms = sample.performance.response_time_ms,
            throughput = sample.performance.throughput,
            cpu = sample.resource_utilization.cpu,
            bottlenecks = ?sample.bottlenecks.identified,
            buffered,
            "Metrics sample recorded"
        );

        Ok(sample)
    }
}

#[async_trait]
impl PeriodicJob for MetricsCollector {
    fn name(&self) -> &'static str {
        components::COLLECTOR
    }

    async fn run_once(&self) {
        // Failures are already logged and counted
        let _ = self.collect_once().await;
    }
}

/// Convert a raw snapshot into a sample
pub fn build_sample(snapshot: &RawSnapshot, timestamp: DateTime<Utc>) -> MetricSample {
    let quality = snapshot.workflows.success_rate * 100.0;

    let mut by_component = HashMap::new();
    by_component.insert("workflow_engine".to_string(), quality);

    MetricSample {
        timestamp,
        performance: PerformanceMetrics {
            response_time_ms: snapshot.workflows.avg_response_time_ms,
            throughput: snapshot.coordinator.throughput,
            cpu_usage: snapshot.system.cpu_usage,
            memory_usage: snapshot.system.memory_usage,
            disk_usage: snapshot.system.disk_usage,
            network_latency_ms: snapshot.system.network_latency_ms,
        },
        quality: QualityMetrics {
            overall: quality,
            by_component,
        },
        resource_utilization: ResourceUtilization {
            cpu: snapshot.system.cpu_usage,
            memory: snapshot.system.memory_usage,
            storage: snapshot.system.disk_usage,
            network: snapshot.system.network_usage,
        },
        workload: WorkloadCounters {
            active_tasks: snapshot.coordinator.active_tasks,
            queue_length: snapshot.coordinator.queue_length,
            active_workflows: snapshot.workflows.active_workflows,
        },
        bottlenecks: detect_bottlenecks(snapshot),
    }
}
