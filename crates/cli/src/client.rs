//! API client for communicating with the Adaptive Optimizer API

use anyhow::{Context, Result};
use reqwest::{Client, Method, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// API client for the Adaptive Optimizer API
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            // Manual optimization runs execute the plan before responding
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let url = self.base_url.join(path).context("Invalid path")?;
        Ok(self.client.request(method, url))
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request.send().await.context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            anyhow::bail!("API error ({}): {}", status, message);
        }

        response.json().await.context("Failed to parse response")
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(self.request(Method::GET, path)?).await
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        self.send(self.request(Method::POST, path)?.json(body)).await
    }

    /// Make a PUT request with JSON body
    pub async fn put<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        self.send(self.request(Method::PUT, path)?.json(body)).await
    }

    /// Make a DELETE request
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(self.request(Method::DELETE, path)?).await
    }
}

// API response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tunables {
    pub max_concurrency: u32,
    pub quality_threshold: f64,
    pub auto_balance: bool,
    pub replicas: u32,
    pub cache_size_mb: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationMetrics {
    pub buffered_samples: usize,
    pub buffer_capacity: usize,
    pub training_samples: usize,
    pub total_samples: u64,
    pub auto_execute: bool,
    pub model_version: String,
    #[serde(default)]
    pub prediction_accuracy: BTreeMap<String, f64>,
    pub feedback_records: usize,
    pub retraining_in_flight: bool,
    pub history_entries: usize,
    pub tunables: Tunables,
    #[serde(default)]
    pub last_cycle: Option<CycleReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineEntry {
    pub target: f64,
    pub current: f64,
    pub trend: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceBaseline {
    pub computed_at: Option<String>,
    #[serde(default)]
    pub metrics: BTreeMap<String, BaselineEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedAction {
    pub id: String,
    #[serde(rename = "type")]
    pub action_type: String,
    pub params: serde_json::Value,
    pub expected_improvement: f64,
    pub risk: String,
    pub target_metric: String,
}

impl PlannedAction {
    pub fn component(&self) -> &str {
        self.params
            .get("component")
            .and_then(|c| c.as_str())
            .unwrap_or("-")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    pub action: PlannedAction,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub rollback_attempted: bool,
    pub finished_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetSpec {
    pub from_replicas: u32,
    pub to_replicas: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionDetails {
    pub finished_at: Option<String>,
    pub rollback_required: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalingAction {
    pub id: String,
    pub policy_id: String,
    pub action: String,
    pub target_spec: TargetSpec,
    #[serde(default)]
    pub reasoning: Vec<String>,
    pub status: String,
    pub execution_details: ExecutionDetails,
    pub trigger: String,
    pub confidence: f64,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HistoryEntry {
    Optimization(ActionRecord),
    Scaling(ScalingAction),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalingEvaluation {
    pub policy_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ScalingAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declined: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    pub trigger: String,
    pub started_at: String,
    pub duration_ms: u64,
    #[serde(default)]
    pub plan: Vec<PlannedAction>,
    pub executed: bool,
    #[serde(default)]
    pub outcomes: Vec<ActionRecord>,
    #[serde(default)]
    pub scaling: Vec<ScalingEvaluation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Threshold {
    pub value: f64,
    #[serde(default)]
    pub sustained_secs: u64,
}

/// Scaling policy; fields the CLI does not display are carried through untouched
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    pub id: String,
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub min_replicas: u32,
    pub max_replicas: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_metrics: Vec<String>,
    pub scale_up: Threshold,
    pub scale_down: Threshold,
    #[serde(flatten)]
    pub rest: serde_json::Map<String, serde_json::Value>,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadSignal {
    pub metric: String,
    pub value: f64,
    pub confidence: f64,
    pub trigger: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalingDecision {
    pub policy_id: String,
    pub action: Option<String>,
    pub current_replicas: u32,
    pub target_replicas: u32,
    pub signal: LoadSignal,
    #[serde(default)]
    pub reasoning: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
