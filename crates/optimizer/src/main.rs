//! Adaptive Optimizer - optimization and auto-scaling control loop
//!
//! Collects workload metrics, plans and executes optimization actions,
//! scales replicas under safety policies, and serves the HTTP API.

use adaptive_optimizer::{api, config::ServiceConfig};
use anyhow::{Context, Result};
use optimizer_lib::{
    collector::{CgroupSampler, CompositeSource},
    history::{HistoryStore, InMemoryHistoryStore, JsonlHistoryStore},
    http::CollaboratorClient,
    scaling::{InMemoryInfrastructure, InfrastructureManager},
    AdaptiveOptimizer, Collaborators, HealthRegistry,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

async fn build_collaborators(config: &ServiceConfig) -> Result<Collaborators> {
    let c = &config.collaborators;
    let timeout = Duration::from_secs(c.request_timeout_secs);

    let sampler = CgroupSampler::new(&c.cgroup_root);
    if let Err(e) = sampler.prime().await {
        warn!(
            cgroup = %c.cgroup_root.display(),
            error = %e,
            "CPU baseline unavailable, first collection will be skipped"
        );
    }

    let source = CompositeSource::new(
        Arc::new(CollaboratorClient::new(&c.coordinator_url, timeout)?),
        Arc::new(CollaboratorClient::new(&c.workflow_engine_url, timeout)?),
        Arc::new(sampler),
    );

    let infrastructure: Arc<dyn InfrastructureManager> = match &c.infrastructure_url {
        Some(url) => Arc::new(CollaboratorClient::new(url, timeout)?),
        None => {
            warn!(
                replicas = c.initial_replicas,
                "No infrastructure manager configured, scaling is simulated in-process"
            );
            Arc::new(InMemoryInfrastructure::new(c.initial_replicas))
        }
    };

    let history: Arc<dyn HistoryStore> = match &config.history_path {
        Some(path) => Arc::new(
            JsonlHistoryStore::open(path)
                .with_context(|| format!("Failed to open history at {}", path.display()))?,
        ),
        None => Arc::new(InMemoryHistoryStore::new()),
    };

    Ok(Collaborators {
        source: Arc::new(source),
        infrastructure,
        history,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting adaptive-optimizer");

    let config = ServiceConfig::load()?;
    info!(
        instance = %config.optimizer.instance,
        policies = config.policies.len(),
        auto_execute = config.optimizer.auto_execute,
        "Optimizer configured"
    );

    let collaborators = build_collaborators(&config).await?;
    let health = HealthRegistry::with_default_components().await;

    let optimizer = AdaptiveOptimizer::new(
        config.optimizer.clone(),
        collaborators,
        config.policies.clone(),
        health,
    )
    .await
    .context("Failed to initialize optimizer")?;

    optimizer.start().await;

    let app_state = Arc::new(api::AppState::new(optimizer.clone()));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            info!("Shutdown signal received");
        }
        result = api_handle => {
            match result {
                Ok(Ok(())) => warn!("API server exited"),
                Ok(Err(e)) => error!(error = %e, "API server failed"),
                Err(e) => error!(error = %e, "API server task panicked"),
            }
        }
    }

    optimizer.stop().await;
    info!("Shutdown complete");

    Ok(())
}
