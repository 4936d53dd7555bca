//! Scaling policy and decision CLI commands

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;
use tabled::Tabled;

use crate::client::{ApiClient, Policy, ScalingDecision};
use crate::output::{
    color_status, format_percent, print_heading, print_json, print_success, print_table,
    print_warning, OutputFormat,
};

/// Row for the policies table
#[derive(Tabled)]
struct PolicyRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Replicas")]
    replicas: String,
    #[tabled(rename = "Metrics")]
    metrics: String,
    #[tabled(rename = "Up / Down")]
    thresholds: String,
}

fn policy_row(policy: &Policy) -> PolicyRow {
    PolicyRow {
        id: policy.id.clone(),
        name: policy.name.clone(),
        state: color_status(if policy.enabled { "enabled" } else { "disabled" }),
        replicas: format!("{}-{}", policy.min_replicas, policy.max_replicas),
        metrics: policy.target_metrics.join(","),
        thresholds: format!("{:.0} / {:.0}", policy.scale_up.value, policy.scale_down.value),
    }
}

/// List scaling policies
pub async fn list_policies(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let policies: Vec<Policy> = client.get("api/v1/policies").await?;

    if format == OutputFormat::Json {
        return print_json(&policies);
    }

    if policies.is_empty() {
        print_warning("No scaling policies configured");
        return Ok(());
    }

    print_table(policies.iter().map(policy_row).collect());
    println!("\nTotal: {} policies", policies.len());

    Ok(())
}

/// Show one policy in full
pub async fn get_policy(client: &ApiClient, id: &str, format: OutputFormat) -> Result<()> {
    let policy: Policy = client.get(&format!("api/v1/policies/{}", id)).await?;

    match format {
        OutputFormat::Json => print_json(&policy),
        OutputFormat::Table => {
            print_table(vec![policy_row(&policy)]);
            if !policy.rest.is_empty() {
                println!();
                print_json(&policy.rest)?;
            }
            Ok(())
        }
    }
}

/// Read a policy file (JSON)
pub fn read_policy_file(path: &Path) -> Result<Policy> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid policy in {}", path.display()))
}

/// Create the policy, or replace it when one with the same id exists
pub async fn apply_policy(client: &ApiClient, file: &Path, format: OutputFormat) -> Result<()> {
    let policy = read_policy_file(file)?;

    let existing: Vec<Policy> = client.get("api/v1/policies").await?;
    let (saved, verb): (Policy, &str) = if existing.iter().any(|p| p.id == policy.id) {
        (
            client
                .put(&format!("api/v1/policies/{}", policy.id), &policy)
                .await?,
            "updated",
        )
    } else {
        (client.post("api/v1/policies", &policy).await?, "created")
    };

    match format {
        OutputFormat::Json => print_json(&saved),
        OutputFormat::Table => {
            print_success(&format!("Policy {} {}", saved.id.cyan(), verb));
            Ok(())
        }
    }
}

pub async fn delete_policy(client: &ApiClient, id: &str, format: OutputFormat) -> Result<()> {
    let deleted: Policy = client.delete(&format!("api/v1/policies/{}", id)).await?;

    match format {
        OutputFormat::Json => print_json(&deleted),
        OutputFormat::Table => {
            print_success(&format!("Policy {} deleted", deleted.id.cyan()));
            Ok(())
        }
    }
}

/// Show what the engine would decide for a policy right now
pub async fn show_decision(client: &ApiClient, policy_id: &str, format: OutputFormat) -> Result<()> {
    let decision: ScalingDecision = client
        .get(&format!("api/v1/policies/{}/decision", policy_id))
        .await?;

    if format == OutputFormat::Json {
        return print_json(&decision);
    }

    print_heading("Scaling Decision");
    println!("Policy:     {}", decision.policy_id.cyan());
    println!(
        "Signal:     {} = {:.2} ({}, confidence {})",
        decision.signal.metric,
        decision.signal.value,
        decision.signal.trigger,
        format_percent(decision.signal.confidence)
    );
    match &decision.action {
        Some(action) => println!(
            "Decision:   {} {} -> {}",
            action.green().bold(),
            decision.current_replicas,
            decision.target_replicas
        ),
        None => println!(
            "Decision:   {} (stay at {})",
            "none".yellow().bold(),
            decision.current_replicas
        ),
    }

    if !decision.reasoning.is_empty() {
        println!();
        println!("{}", "Reasoning".bold());
        for reason in &decision.reasoning {
            println!("  - {}", reason);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_file_keeps_unknown_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("web.json");
        std::fs::write(
            &path,
            r#"{
                "id": "web",
                "name": "Web tier",
                "min_replicas": 2,
                "max_replicas": 20,
                "scale_up": {"value": 80.0, "sustained_secs": 60},
                "scale_down": {"value": 30.0},
                "cooldowns": {"scale_up_secs": 120, "scale_down_secs": 600}
            }"#,
        )
        .unwrap();

        let policy = read_policy_file(&path).unwrap();
        assert!(policy.enabled);
        assert_eq!(policy.scale_up.sustained_secs, 60);

        let json = serde_json::to_value(&policy).unwrap();
        assert_eq!(json["cooldowns"]["scale_up_secs"], 120);
    }

    #[test]
    fn test_policy_row() {
        let policy: Policy = serde_json::from_value(serde_json::json!({
            "id": "web",
            "name": "Web tier",
            "enabled": false,
            "min_replicas": 2,
            "max_replicas": 20,
            "target_metrics": ["cpu", "memory"],
            "scale_up": {"value": 80.0},
            "scale_down": {"value": 30.0}
        }))
        .unwrap();

        let row = policy_row(&policy);
        assert_eq!(row.replicas, "2-20");
        assert_eq!(row.metrics, "cpu,memory");
        assert_eq!(row.thresholds, "80 / 30");
        assert!(row.state.contains("disabled"));
    }
}
