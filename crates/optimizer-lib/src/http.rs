//! HTTP clients for external collaborators
//!
//! Each collaborator (workload coordinator, workflow engine, infrastructure
//! manager) is reached through a JSON API rooted at its own base URL.

use crate::collector::{CoordinatorMetrics, WorkflowEngine, WorkflowMetrics, WorkloadCoordinator};
use crate::models::RolloutStrategy;
use crate::scaling::{InfraHealth, InfrastructureManager, ScalingOutcome};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Default request timeout for collaborator calls
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// JSON client for one collaborator
pub struct CollaboratorClient {
    client: Client,
    base_url: Url,
}

#[derive(Debug, Serialize)]
struct ScalingRequest {
    target_replicas: u32,
    strategy: RolloutStrategy,
}

#[derive(Debug, Deserialize)]
struct ReplicaCount {
    replicas: u32,
}

impl CollaboratorClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        let mut base_url = Url::parse(base_url).context("Invalid collaborator URL")?;
        // Relative joins replace the last segment unless the path ends with '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", url))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("{} returned {}: {}", url, status, body);
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse response from {}", url))
    }

    async fn post<T: DeserializeOwned, B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .post(url.clone())
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", url))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("{} returned {}: {}", url, status, body);
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse response from {}", url))
    }
}

#[async_trait]
impl WorkloadCoordinator for CollaboratorClient {
    async fn get_metrics(&self) -> Result<CoordinatorMetrics> {
        self.get("metrics").await
    }
}

#[async_trait]
impl WorkflowEngine for CollaboratorClient {
    async fn get_metrics(&self) -> Result<WorkflowMetrics> {
        self.get("metrics").await
    }
}

#[async_trait]
impl InfrastructureManager for CollaboratorClient {
    async fn apply_scaling(
        &self,
        target_replicas: u32,
        strategy: RolloutStrategy,
    ) -> Result<ScalingOutcome> {
        self.post(
            "scaling",
            &ScalingRequest {
                target_replicas,
                strategy,
            },
        )
        .await
    }

    async fn get_health(&self) -> Result<InfraHealth> {
        self.get("health").await
    }

    async fn current_replicas(&self) -> Result<u32> {
        let count: ReplicaCount = self.get("replicas").await?;
        Ok(count.replicas)
    }
}
