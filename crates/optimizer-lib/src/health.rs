//! Health of the control loops
//!
//! The collector, planner, executor, scaling engine and feedback loop each
//! report their latest outcome here. The service turns the registry into
//! `/healthz` and `/readyz`: any unhealthy loop makes the optimizer
//! unhealthy and not ready, a degraded loop only shows up in the report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Loop names reported into the registry
pub mod components {
    pub const COLLECTOR: &str = "collector";
    pub const PLANNER: &str = "planner";
    pub const EXECUTOR: &str = "executor";
    pub const SCALING: &str = "scaling";
    pub const FEEDBACK: &str = "feedback";

    pub const ALL: [&str; 5] = [COLLECTOR, PLANNER, EXECUTOR, SCALING, FEEDBACK];
}

/// Ordered from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Last iteration hit a recoverable problem, e.g. a skipped tick or a
    /// failed retraining
    Degraded,
    Unhealthy,
}

/// Latest report of one loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// When the loop entered its current status
    pub since: DateTime<Utc>,
    /// Reports in a row that were not healthy
    pub failures_in_a_row: u32,
}

impl ComponentHealth {
    fn new(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            since: Utc::now(),
            failures_in_a_row: u32::from(status != ComponentStatus::Healthy),
        }
    }

    /// Fold a new report into the previous one
    fn next(&self, status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            since: if status == self.status {
                self.since
            } else {
                Utc::now()
            },
            failures_in_a_row: match status {
                ComponentStatus::Healthy => 0,
                _ => self.failures_in_a_row.saturating_add(1),
            },
        }
    }
}

/// Body of `/healthz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Worst status across all loops
    pub status: ComponentStatus,
    pub components: BTreeMap<String, ComponentHealth>,
}

/// Body of `/readyz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Default)]
struct Loops {
    components: BTreeMap<String, ComponentHealth>,
    started: bool,
}

/// Shared, cloneable view of every loop's health
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    inner: Arc<RwLock<Loops>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every control loop registered as healthy
    pub async fn with_default_components() -> Self {
        let registry = Self::new();
        for name in components::ALL {
            registry.register(name).await;
        }
        registry
    }

    pub async fn register(&self, name: &str) {
        self.inner
            .write()
            .await
            .components
            .insert(name.to_string(), ComponentHealth::new(ComponentStatus::Healthy, None));
    }

    pub async fn component(&self, name: &str) -> Option<ComponentHealth> {
        self.inner.read().await.components.get(name).cloned()
    }

    async fn report(&self, name: &str, status: ComponentStatus, message: Option<String>) {
        let mut loops = self.inner.write().await;
        let health = match loops.components.get(name) {
            Some(previous) => previous.next(status, message),
            None => ComponentHealth::new(status, message),
        };
        loops.components.insert(name.to_string(), health);
    }

    pub async fn set_healthy(&self, name: &str) {
        self.report(name, ComponentStatus::Healthy, None).await;
    }

    pub async fn set_degraded(&self, name: &str, message: impl Into<String>) {
        self.report(name, ComponentStatus::Degraded, Some(message.into()))
            .await;
    }

    pub async fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        self.report(name, ComponentStatus::Unhealthy, Some(message.into()))
            .await;
    }

    /// Flipped on by `start` and off by `stop`
    pub async fn set_ready(&self, ready: bool) {
        self.inner.write().await.started = ready;
    }

    pub async fn health(&self) -> HealthResponse {
        let loops = self.inner.read().await;
        let status = loops
            .components
            .values()
            .map(|c| c.status)
            .max()
            .unwrap_or(ComponentStatus::Healthy);
        HealthResponse {
            status,
            components: loops.components.clone(),
        }
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        let loops = self.inner.read().await;
        if !loops.started {
            return ReadinessResponse {
                ready: false,
                reason: Some("control loops not started".to_string()),
            };
        }

        let unhealthy = loops
            .components
            .iter()
            .find(|(_, c)| c.status == ComponentStatus::Unhealthy);
        match unhealthy {
            Some((name, c)) => ReadinessResponse {
                ready: false,
                reason: Some(format!(
                    "{} unhealthy: {}",
                    name,
                    c.message.as_deref().unwrap_or("no detail")
                )),
            },
            None => ReadinessResponse {
                ready: true,
                reason: None,
            },
        }
    }
}
