//! Service configuration
//!
//! Layered from an optional file named by `OPTIMIZER_CONFIG` (format chosen
//! by extension) and `OPTIMIZER_*` environment variables, with `__`
//! separating nested keys, e.g. `OPTIMIZER_OPTIMIZER__AUTO_EXECUTE=false`.

use anyhow::{Context, Result};
use optimizer_lib::{OptimizerSettings, ScalingPolicy};
use serde::Deserialize;
use std::path::PathBuf;

/// Environment variable naming the configuration file
pub const CONFIG_PATH_ENV: &str = "OPTIMIZER_CONFIG";

/// Collaborator endpoints and samplers
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CollaboratorConfig {
    pub coordinator_url: String,
    pub workflow_engine_url: String,
    /// Scaling goes to an in-process simulator when unset
    pub infrastructure_url: Option<String>,
    pub request_timeout_secs: u64,
    /// cgroup v2 directory the system sampler reads
    pub cgroup_root: PathBuf,
    /// Replica count the in-process simulator starts from
    pub initial_replicas: u32,
}

impl Default for CollaboratorConfig {
    fn default() -> Self {
        Self {
            coordinator_url: "http://workload-coordinator:8081".to_string(),
            workflow_engine_url: "http://workflow-engine:8082".to_string(),
            infrastructure_url: None,
            request_timeout_secs: 10,
            cgroup_root: PathBuf::from("/sys/fs/cgroup"),
            initial_replicas: 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Port of the HTTP API
    pub api_port: u16,
    /// JSON-lines history file; history is kept in memory when unset
    pub history_path: Option<PathBuf>,
    pub collaborators: CollaboratorConfig,
    pub optimizer: OptimizerSettings,
    /// Scaling policies registered at startup
    pub policies: Vec<ScalingPolicy>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            api_port: 8080,
            history_path: None,
            collaborators: CollaboratorConfig::default(),
            optimizer: OptimizerSettings::default(),
            policies: Vec::new(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from the optional file and the environment
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).ok();
        Self::load_from(path.as_deref())
    }

    pub fn load_from(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix("OPTIMIZER")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration")?;

        config
            .try_deserialize()
            .context("Invalid configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.api_port, 8080);
        assert!(config.history_path.is_none());
        assert!(config.optimizer.auto_execute);
        assert_eq!(config.optimizer.optimization_interval_secs, 300);
        assert!(config.policies.is_empty());
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
api_port = 9100
history_path = "/tmp/history.jsonl"

[optimizer]
auto_execute = false
action_pacing_ms = 250

[optimizer.normalization]
preset = "benefit_oriented"

[[policies]]
id = "web"
name = "Web tier"
min_replicas = 2
max_replicas = 20
scale_up = {{ value = 80.0, sustained_secs = 60 }}
scale_down = {{ value = 30.0 }}
"#
        )
        .unwrap();

        let config = ServiceConfig::load_from(file.path().to_str()).unwrap();

        assert_eq!(config.api_port, 9100);
        assert_eq!(config.history_path, Some(PathBuf::from("/tmp/history.jsonl")));
        assert!(!config.optimizer.auto_execute);
        assert_eq!(config.optimizer.action_pacing_ms, 250);
        // Unset fields keep their defaults
        assert_eq!(config.optimizer.collection_interval_secs, 30);
        assert_eq!(config.policies.len(), 1);
        assert_eq!(config.policies[0].scale_up.sustained_secs, 60);
        assert_eq!(config.policies[0].max_scale_up_step, 2);
    }
}
