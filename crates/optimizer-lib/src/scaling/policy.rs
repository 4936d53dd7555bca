//! Scaling policy registry

use crate::error::{OptimizerError, OptimizerResult};
use crate::models::ScalingPolicy;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::info;

/// Reject policies that could never be honoured
pub fn validate_policy(policy: &ScalingPolicy) -> OptimizerResult<()> {
    let invalid = |reason: String| Err(OptimizerError::InvalidPolicy(reason));

    if policy.id.trim().is_empty() {
        return invalid("policy id must not be empty".to_string());
    }
    if policy.min_replicas > policy.max_replicas {
        return invalid(format!(
            "min_replicas ({}) exceeds max_replicas ({})",
            policy.min_replicas, policy.max_replicas
        ));
    }
    if policy.max_scale_up_step < 1 {
        return invalid("max_scale_up_step must be at least 1".to_string());
    }
    if !(0.0..=1.0).contains(&policy.confidence_threshold) {
        return invalid(format!(
            "confidence_threshold {} is outside [0, 1]",
            policy.confidence_threshold
        ));
    }
    if policy.scale_down.value >= policy.scale_up.value {
        return invalid(format!(
            "scale_down threshold ({}) must be below scale_up threshold ({})",
            policy.scale_down.value, policy.scale_up.value
        ));
    }
    if policy.target_metrics.is_empty() {
        return invalid("at least one target metric is required".to_string());
    }
    if let Some(cost) = &policy.cost_constraints {
        if cost.cost_per_replica_hour < 0.0 || cost.max_hourly_cost < 0.0 {
            return invalid("cost constraints must not be negative".to_string());
        }
    }
    Ok(())
}

/// Named scaling policies
#[derive(Default)]
pub struct PolicyRegistry {
    policies: RwLock<HashMap<String, ScalingPolicy>>,
}

impl PolicyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry seeded from configuration
    pub fn with_policies(policies: Vec<ScalingPolicy>) -> OptimizerResult<Self> {
        let mut map = HashMap::with_capacity(policies.len());
        for policy in policies {
            validate_policy(&policy)?;
            if map.contains_key(&policy.id) {
                return Err(OptimizerError::InvalidPolicy(format!(
                    "duplicate policy id '{}'",
                    policy.id
                )));
            }
            map.insert(policy.id.clone(), policy);
        }
        Ok(Self {
            policies: RwLock::new(map),
        })
    }

    pub async fn create(&self, policy: ScalingPolicy) -> OptimizerResult<ScalingPolicy> {
        validate_policy(&policy)?;

        let mut policies = self.policies.write().await;
        if policies.contains_key(&policy.id) {
            return Err(OptimizerError::InvalidPolicy(format!(
                "policy '{}' already exists",
                policy.id
            )));
        }
        info!(policy_id = %policy.id, "Scaling policy created");
        policies.insert(policy.id.clone(), policy.clone());
        Ok(policy)
    }

    pub async fn get(&self, id: &str) -> OptimizerResult<ScalingPolicy> {
        self.policies
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| OptimizerError::PolicyNotFound(id.to_string()))
    }

    /// All policies ordered by id
    pub async fn list(&self) -> Vec<ScalingPolicy> {
        let mut all: Vec<_> = self.policies.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Replace a policy; the path id wins over the body id
    pub async fn update(&self, id: &str, mut policy: ScalingPolicy) -> OptimizerResult<ScalingPolicy> {
        policy.id = id.to_string();
        validate_policy(&policy)?;

        let mut policies = self.policies.write().await;
        let slot = policies
            .get_mut(id)
            .ok_or_else(|| OptimizerError::PolicyNotFound(id.to_string()))?;
        *slot = policy.clone();
        info!(policy_id = %id, "Scaling policy updated");
        Ok(policy)
    }

    pub async fn delete(&self, id: &str) -> OptimizerResult<ScalingPolicy> {
        let removed = self
            .policies
            .write()
            .await
            .remove(id)
            .ok_or_else(|| OptimizerError::PolicyNotFound(id.to_string()))?;
        info!(policy_id = %id, "Scaling policy deleted");
        Ok(removed)
    }
}
