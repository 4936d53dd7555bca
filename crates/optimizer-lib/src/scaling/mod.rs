//! Safety-gated auto-scaling
//!
//! The decision engine turns a load signal into at most one scaling action
//! per evaluation, bounded by the policy's replica range, step size, cost
//! ceiling, cooldowns and sustained-threshold windows. Every executed action
//! is validated against the policy's safety thresholds and rolled back to
//! the prior replica count when validation fails.

mod engine;
mod infra;
mod policy;

pub use engine::{DecisionEngine, EnginePhase, LoadSignal, ScalingDecision};
pub use infra::InMemoryInfrastructure;
pub use policy::{validate_policy, PolicyRegistry};

use crate::models::RolloutStrategy;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Result of asking the infrastructure to converge on a replica count
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingOutcome {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    /// Replica count after the call
    pub replicas: u32,
}

/// Health of the scaled workload as reported by the infrastructure
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InfraHealth {
    /// Fraction of failed requests (0-1)
    pub error_rate: f64,
    pub latency_ms: f64,
    #[serde(default)]
    pub ready_replicas: u32,
}

impl Default for InfraHealth {
    fn default() -> Self {
        Self {
            error_rate: 0.0,
            latency_ms: 100.0,
            ready_replicas: 0,
        }
    }
}

/// Infrastructure manager capability
#[async_trait]
pub trait InfrastructureManager: Send + Sync {
    /// Roll the workload to `target_replicas`
    async fn apply_scaling(
        &self,
        target_replicas: u32,
        strategy: RolloutStrategy,
    ) -> Result<ScalingOutcome>;

    async fn get_health(&self) -> Result<InfraHealth>;

    async fn current_replicas(&self) -> Result<u32>;
}
