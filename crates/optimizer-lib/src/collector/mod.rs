//! Metrics collection from the platform's collaborators
//!
//! A `MetricsSource` produces one raw snapshot per tick. The default
//! `CompositeSource` asks the workload coordinator, the workflow engine
//! and a system sampler concurrently; the collector turns the snapshot into
//! an immutable `MetricSample` and appends it to the bounded history.

mod bottleneck;
mod cgroup_v2;
mod history;
mod r#loop;


pub use bottleneck::{
    detect_bottlenecks, ACTIVE_WORKFLOWS_THRESHOLD, CPU_USAGE_THRESHOLD, QUEUE_LENGTH_THRESHOLD,
};
pub use cgroup_v2::CgroupSampler;
pub use history::{MetricsHistory, DEFAULT_BUFFER_CAPACITY, DEFAULT_TRAINING_CAPACITY};
pub use r#loop::{build_sample, MetricsCollector, DEFAULT_COLLECTION_INTERVAL_SECS};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Counters reported by the workload coordinator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorMetrics {
    pub active_tasks: u32,
    pub queue_length: u32,
    /// Completed tasks per second
    pub throughput: f64,
}

/// Counters reported by the workflow engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowMetrics {
    pub active_workflows: u32,
    /// Fraction of workflows that finished successfully (0-1)
    pub success_rate: f64,
    pub avg_response_time_ms: f64,
}

/// Host-level telemetry, percentages in 0-100
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemTelemetry {
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub disk_usage: f64,
    pub network_usage: f64,
    pub network_latency_ms: f64,
}

/// Everything fetched for one collection tick
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawSnapshot {
    pub coordinator: CoordinatorMetrics,
    pub workflows: WorkflowMetrics,
    pub system: SystemTelemetry,
}

/// Produces raw snapshots on demand
#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn fetch(&self) -> Result<RawSnapshot>;
}

/// Workload coordinator capability
#[async_trait]
pub trait WorkloadCoordinator: Send + Sync {
    async fn get_metrics(&self) -> Result<CoordinatorMetrics>;
}

/// Workflow DAG engine capability
#[async_trait]
pub trait WorkflowEngine: Send + Sync {
    async fn get_metrics(&self) -> Result<WorkflowMetrics>;
}

/// Host telemetry capability
#[async_trait]
pub trait SystemSampler: Send + Sync {
    async fn sample(&self) -> Result<SystemTelemetry>;
}

/// Source that joins the three collaborators into one snapshot
pub struct CompositeSource {
    coordinator: Arc<dyn WorkloadCoordinator>,
    engine: Arc<dyn WorkflowEngine>,
    sampler: Arc<dyn SystemSampler>,
}

impl CompositeSource {
    pub fn new(
        coordinator: Arc<dyn WorkloadCoordinator>,
        engine: Arc<dyn WorkflowEngine>,
        sampler: Arc<dyn SystemSampler>,
    ) -> Self {
        Self {
            coordinator,
            engine,
            sampler,
        }
    }
}

#[async_trait]
impl MetricsSource for CompositeSource {
    async fn fetch(&self) -> Result<RawSnapshot> {
        let (coordinator, workflows, system) = tokio::try_join!(
            self.coordinator.get_metrics(),
            self.engine.get_metrics(),
            self.sampler.sample(),
        )?;

        Ok(RawSnapshot {
            coordinator,
            workflows,
            system,
        })
    }
}
