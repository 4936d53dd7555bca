//! In-process infrastructure manager

use super::{InfraHealth, InfrastructureManager, ScalingOutcome};
use crate::models::RolloutStrategy;
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use tokio::sync::Mutex;
use tracing::info;

/// Tracks replicas in memory
///
/// Used when no infrastructure endpoint is configured. Health readings can be
/// scripted: each call pops the next reading and the last one repeats.
pub struct InMemoryInfrastructure {
    replicas: Mutex<u32>,
    health: Mutex<VecDeque<InfraHealth>>,
    failing_applies: Mutex<u32>,
    applied: Mutex<Vec<u32>>,
}

impl InMemoryInfrastructure {
    pub fn new(replicas: u32) -> Self {
        Self {
            replicas: Mutex::new(replicas),
            health: Mutex::new(VecDeque::from([InfraHealth::default()])),
            failing_applies: Mutex::new(0),
            applied: Mutex::new(Vec::new()),
        }
    }

    /// Replace the health readings returned by `get_health`
    pub async fn script_health(&self, readings: Vec<InfraHealth>) {
        let mut health = self.health.lock().await;
        *health = readings.into();
        if health.is_empty() {
            health.push_back(InfraHealth::default());
        }
    }

    /// Make the next `n` scaling calls fail
    pub async fn fail_next_applies(&self, n: u32) {
        *self.failing_applies.lock().await = n;
    }

    /// Every target passed to `apply_scaling`, in call order
    pub async fn applied(&self) -> Vec<u32> {
        self.applied.lock().await.clone()
    }
}

#[async_trait]
impl InfrastructureManager for InMemoryInfrastructure {
    async fn apply_scaling(
        &self,
        target_replicas: u32,
        strategy: RolloutStrategy,
    ) -> Result<ScalingOutcome> {
        self.applied.lock().await.push(target_replicas);

        {
            let mut failing = self.failing_applies.lock().await;
            if *failing > 0 {
                *failing -= 1;
                bail!("rollout to {} replicas failed", target_replicas);
            }
        }

        let mut replicas = self.replicas.lock().await;
        info!(
            from = *replicas,
            to = target_replicas,
            max_unavailable = strategy.max_unavailable,
            max_surge = strategy.max_surge,
            "Rolling replicas"
        );
        *replicas = target_replicas;

        Ok(ScalingOutcome {
            success: true,
            message: String::new(),
            replicas: target_replicas,
        })
    }

    async fn get_health(&self) -> Result<InfraHealth> {
        let replicas = *self.replicas.lock().await;
        let mut health = self.health.lock().await;
        let reading = if health.len() > 1 {
            health.pop_front()
        } else {
            health.front().copied()
        };
        Ok(InfraHealth {
            ready_replicas: replicas,
            ..reading.unwrap_or_default()
        })
    }

    async fn current_replicas(&self) -> Result<u32> {
        Ok(*self.replicas.lock().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_apply_updates_replicas() {
        let infra = InMemoryInfrastructure::new(3);
        let outcome = infra
            .apply_scaling(5, RolloutStrategy::default())
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(infra.current_replicas().await.unwrap(), 5);
        assert_eq!(infra.get_health().await.unwrap().ready_replicas, 5);
        assert_eq!(infra.applied().await, vec![5]);
    }

    #[tokio::test]
    async fn test_scripted_failures_and_health() {
        let infra = InMemoryInfrastructure::new(3);
        infra.fail_next_applies(1).await;
        infra
            .script_health(vec![
                InfraHealth::default(),
                InfraHealth {
                    error_rate: 0.3,
                    ..Default::default()
                },
            ])
            .await;

        assert!(infra.apply_scaling(4, RolloutStrategy::default()).await.is_err());
        assert_eq!(infra.current_replicas().await.unwrap(), 3);
        assert!(infra.apply_scaling(4, RolloutStrategy::default()).await.is_ok());

        assert_eq!(infra.get_health().await.unwrap().error_rate, 0.0);
        assert_eq!(infra.get_health().await.unwrap().error_rate, 0.3);
        // Last reading repeats
        assert_eq!(infra.get_health().await.unwrap().error_rate, 0.3);
    }
}
