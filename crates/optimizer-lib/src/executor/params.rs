//! In-memory live tunables

use super::ActionApplier;
use crate::models::{ActionParams, Component, ComponentState, MetricKind};
use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Live values of every tunable component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tunables {
    pub max_concurrency: u32,
    pub quality_threshold: f64,
    pub auto_balance: bool,
    pub replicas: u32,
    pub cache_size_mb: u64,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            max_concurrency: 10,
            quality_threshold: 80.0,
            auto_balance: false,
            replicas: 1,
            cache_size_mb: 512,
        }
    }
}

/// Kicks off an out-of-band model retraining
#[async_trait]
pub trait RetrainingTrigger: Send + Sync {
    async fn request_retraining(&self, metric: MetricKind) -> Result<()>;
}

/// Owner of the workload's replica count
///
/// Optimization actions never write replicas directly; they ask the
/// controller, which applies the same limits as policy-driven scaling.
#[async_trait]
pub trait ReplicaController: Send + Sync {
    async fn current_replicas(&self) -> Result<u32>;

    /// Move the replica count by `delta`; returns the resulting count
    async fn adjust_replicas(&self, delta: i32) -> Result<u32>;

    /// Return to a previously captured replica count
    async fn restore_replicas(&self, replicas: u32) -> Result<()>;
}

/// Default applier keeping tunables in memory
///
/// Replica changes go through the replica controller when one is attached;
/// retraining requests go to the attached trigger.
pub struct ParameterStore {
    tunables: RwLock<Tunables>,
    replicas: Option<Arc<dyn ReplicaController>>,
    retraining: RwLock<Option<Arc<dyn RetrainingTrigger>>>,
}

impl Default for ParameterStore {
    fn default() -> Self {
        Self::new(Tunables::default())
    }
}

impl ParameterStore {
    pub fn new(tunables: Tunables) -> Self {
        Self {
            tunables: RwLock::new(tunables),
            replicas: None,
            retraining: RwLock::new(None),
        }
    }

    pub fn with_replica_controller(mut self, controller: Arc<dyn ReplicaController>) -> Self {
        self.replicas = Some(controller);
        self
    }

    /// Attach the retraining trigger once the feedback loop exists
    pub async fn set_retraining(&self, trigger: Arc<dyn RetrainingTrigger>) {
        *self.retraining.write().await = Some(trigger);
    }

    pub async fn tunables(&self) -> Tunables {
        self.tunables.read().await.clone()
    }

    async fn current_replicas(&self) -> Result<u32> {
        match &self.replicas {
            Some(controller) => controller.current_replicas().await,
            None => Ok(self.tunables.read().await.replicas),
        }
    }

    async fn adjust_replicas(&self, delta: i32) -> Result<()> {
        let current = self.current_replicas().await?;
        let next = match &self.replicas {
            Some(controller) => controller.adjust_replicas(delta).await?,
            None => (current as i64 + delta as i64).max(1) as u32,
        };
        info!(from = current, to = next, "Scaled replicas");
        self.tunables.write().await.replicas = next;
        Ok(())
    }

    async fn restore_replicas(&self, replicas: u32) -> Result<()> {
        if let Some(controller) = &self.replicas {
            controller.restore_replicas(replicas).await?;
        }
        self.tunables.write().await.replicas = replicas;
        Ok(())
    }
}

fn scale_pct(value: f64, pct: f64) -> f64 {
    value * (1.0 + pct / 100.0)
}

#[async_trait]
impl ActionApplier for ParameterStore {
    async fn capture(&self, component: Component) -> Result<Option<ComponentState>> {
        let state = match component {
            Component::Coordinator => Some(ComponentState::Coordinator {
                max_concurrency: self.tunables.read().await.max_concurrency,
            }),
            Component::Qa => Some(ComponentState::Qa {
                quality_threshold: self.tunables.read().await.quality_threshold,
            }),
            Component::LoadBalancer => Some(ComponentState::LoadBalancer {
                auto_balance: self.tunables.read().await.auto_balance,
            }),
            Component::Infrastructure => Some(ComponentState::Scaling {
                replicas: self.current_replicas().await?,
            }),
            Component::Cache => Some(ComponentState::Cache {
                size_mb: self.tunables.read().await.cache_size_mb,
            }),
            Component::Predictor => None,
        };
        Ok(state)
    }

    async fn apply(&self, params: &ActionParams) -> Result<()> {
        match params {
            ActionParams::Coordinator {
                concurrency_change_pct,
            } => {
                let mut t = self.tunables.write().await;
                let next = scale_pct(t.max_concurrency as f64, *concurrency_change_pct)
                    .round()
                    .max(1.0) as u32;
                info!(from = t.max_concurrency, to = next, "Adjusting coordinator concurrency");
                t.max_concurrency = next;
            }
            ActionParams::Qa {
                quality_threshold_delta,
            } => {
                let mut t = self.tunables.write().await;
                let next = (t.quality_threshold + quality_threshold_delta).clamp(0.0, 100.0);
                info!(from = t.quality_threshold, to = next, "Adjusting quality threshold");
                t.quality_threshold = next;
            }
            ActionParams::LoadBalancer { auto_balance } => {
                info!(auto_balance, "Setting automatic load balancing");
                self.tunables.write().await.auto_balance = *auto_balance;
            }
            ActionParams::Scaling { replica_delta } => {
                self.adjust_replicas(*replica_delta).await?;
            }
            ActionParams::Cache { size_change_pct } => {
                let mut t = self.tunables.write().await;
                let next = scale_pct(t.cache_size_mb as f64, *size_change_pct)
                    .round()
                    .max(1.0) as u64;
                info!(from = t.cache_size_mb, to = next, "Resizing cache");
                t.cache_size_mb = next;
            }
            ActionParams::Model { metric } => {
                let trigger = self.retraining.read().await.clone();
                match trigger {
                    Some(trigger) => trigger.request_retraining(*metric).await?,
                    None => bail!("no model trainer attached"),
                }
            }
        }
        Ok(())
    }

    async fn restore(&self, state: &ComponentState) -> Result<()> {
        match state {
            ComponentState::Coordinator { max_concurrency } => {
                self.tunables.write().await.max_concurrency = *max_concurrency;
            }
            ComponentState::Qa { quality_threshold } => {
                self.tunables.write().await.quality_threshold = *quality_threshold;
            }
            ComponentState::LoadBalancer { auto_balance } => {
                self.tunables.write().await.auto_balance = *auto_balance;
            }
            ComponentState::Scaling { replicas } => {
                self.restore_replicas(*replicas).await?;
            }
            ComponentState::Cache { size_mb } => {
                self.tunables.write().await.cache_size_mb = *size_mb;
            }
        }
        info!(component = %state.component(), "Component state restored");
        Ok(())
    }
}
