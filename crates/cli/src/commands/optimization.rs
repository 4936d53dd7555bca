//! Optimization-related CLI commands

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{
    ActionRecord, ApiClient, CycleReport, HistoryEntry, OptimizationMetrics, PerformanceBaseline,
    RunRequest,
};
use crate::output::{
    color_accuracy, color_status, format_change, format_timestamp, print_heading, print_info,
    print_json, print_success, print_table, print_warning, OutputFormat,
};

/// Row for the baseline table
#[derive(Tabled)]
struct BaselineRow {
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Current")]
    current: String,
    #[tabled(rename = "Target")]
    target: String,
    #[tabled(rename = "Trend")]
    trend: String,
}

/// Row for the history table
#[derive(Tabled)]
struct HistoryRow {
    #[tabled(rename = "Finished")]
    finished: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Target")]
    target: String,
    #[tabled(rename = "Change")]
    change: String,
    #[tabled(rename = "Status")]
    status: String,
}

/// Row for planned actions
#[derive(Tabled)]
struct PlanRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Type")]
    action_type: String,
    #[tabled(rename = "Component")]
    component: String,
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Expected")]
    expected: String,
    #[tabled(rename = "Risk")]
    risk: String,
    #[tabled(rename = "Status")]
    status: String,
}

/// Show optimizer state
pub async fn show_status(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let metrics: OptimizationMetrics = client.get("api/v1/optimization/metrics").await?;

    if format == OutputFormat::Json {
        return print_json(&metrics);
    }

    print_heading("Optimizer Status");
    println!(
        "Samples:        {} buffered / {} capacity, {} training, {} total",
        metrics.buffered_samples,
        metrics.buffer_capacity,
        metrics.training_samples,
        metrics.total_samples
    );
    println!(
        "Auto-execute:   {}",
        if metrics.auto_execute {
            "on".green()
        } else {
            "off".yellow()
        }
    );
    println!("Model:          {}", metrics.model_version.cyan());
    println!(
        "Feedback:       {} records{}",
        metrics.feedback_records,
        if metrics.retraining_in_flight {
            ", retraining"
        } else {
            ""
        }
    );
    println!("History:        {} entries", metrics.history_entries);

    let t = &metrics.tunables;
    println!();
    println!("{}", "Tunables".bold());
    println!("  max_concurrency    {}", t.max_concurrency);
    println!("  quality_threshold  {:.1}", t.quality_threshold);
    println!("  auto_balance       {}", t.auto_balance);
    println!("  replicas           {}", t.replicas);
    println!("  cache_size_mb      {}", t.cache_size_mb);

    if !metrics.prediction_accuracy.is_empty() {
        println!();
        println!("{}", "Prediction accuracy".bold());
        for (metric, accuracy) in &metrics.prediction_accuracy {
            println!("  {:<18} {}", metric, color_accuracy(*accuracy));
        }
    }

    match &metrics.last_cycle {
        Some(cycle) => {
            println!();
            println!(
                "Last cycle: {} ({}) in {}ms, {} planned, {} executed",
                format_timestamp(&cycle.started_at),
                cycle.trigger,
                cycle.duration_ms,
                cycle.plan.len(),
                cycle.outcomes.len()
            );
        }
        None => {
            println!();
            print_info("No optimization cycle has run yet");
        }
    }

    Ok(())
}

/// Show the performance baseline
pub async fn show_baseline(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let baseline: PerformanceBaseline = client.get("api/v1/optimization/baseline").await?;

    if format == OutputFormat::Json {
        return print_json(&baseline);
    }

    if baseline.metrics.is_empty() {
        print_warning("No baseline yet, the optimizer has not collected enough samples");
        return Ok(());
    }

    let rows: Vec<BaselineRow> = baseline
        .metrics
        .iter()
        .map(|(metric, entry)| BaselineRow {
            metric: metric.clone(),
            current: format!("{:.2}", entry.current),
            target: format!("{:.2}", entry.target),
            trend: entry.trend.clone(),
        })
        .collect();

    print_table(rows);
    if let Some(at) = &baseline.computed_at {
        println!("\nComputed at {}", format_timestamp(at));
    }

    Ok(())
}

fn history_row(entry: &HistoryEntry) -> HistoryRow {
    match entry {
        HistoryEntry::Optimization(record) => HistoryRow {
            finished: format_timestamp(&record.finished_at),
            kind: "optimization".to_string(),
            id: record.action.id.clone(),
            target: record.action.component().to_string(),
            change: format!(
                "{} {}",
                record.action.target_metric,
                format_change(record.action.expected_improvement)
            ),
            status: color_status(&record.status),
        },
        HistoryEntry::Scaling(action) => HistoryRow {
            finished: action
                .execution_details
                .finished_at
                .as_deref()
                .map(format_timestamp)
                .unwrap_or_else(|| format_timestamp(&action.created_at)),
            kind: "scaling".to_string(),
            id: action.id.clone(),
            target: action.policy_id.clone(),
            change: format!(
                "{} {} -> {}",
                action.action, action.target_spec.from_replicas, action.target_spec.to_replicas
            ),
            status: color_status(&action.status),
        },
    }
}

/// Show recent history entries
pub async fn show_history(client: &ApiClient, limit: usize, format: OutputFormat) -> Result<()> {
    let path = format!("api/v1/optimization/history?limit={}", limit);
    let entries: Vec<HistoryEntry> = client.get(&path).await?;

    if format == OutputFormat::Json {
        return print_json(&entries);
    }

    if entries.is_empty() {
        print_warning("No history entries found");
        return Ok(());
    }

    print_table(entries.iter().map(history_row).collect());
    println!("\nTotal: {} entries", entries.len());

    Ok(())
}

fn plan_rows(report: &CycleReport) -> Vec<PlanRow> {
    report
        .plan
        .iter()
        .map(|action| {
            let status = report
                .outcomes
                .iter()
                .find(|r: &&ActionRecord| r.action.id == action.id)
                .map(|r| color_status(&r.status))
                .unwrap_or_else(|| "planned".to_string());
            PlanRow {
                id: action.id.clone(),
                action_type: action.action_type.clone(),
                component: action.component().to_string(),
                metric: action.target_metric.clone(),
                expected: format_change(action.expected_improvement),
                risk: action.risk.clone(),
                status,
            }
        })
        .collect()
}

/// Trigger an optimization run
pub async fn run_optimization(
    client: &ApiClient,
    component: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let report: CycleReport = client
        .post("api/v1/optimization/run", &RunRequest { component })
        .await?;

    if format == OutputFormat::Json {
        return print_json(&report);
    }

    if report.plan.is_empty() {
        print_info("No optimization opportunities found");
        return Ok(());
    }

    print_table(plan_rows(&report));

    let failed: Vec<&ActionRecord> = report
        .outcomes
        .iter()
        .filter(|r| r.status != "completed")
        .collect();
    if failed.is_empty() {
        print_success(&format!(
            "Executed {} action(s) in {}ms",
            report.outcomes.len(),
            report.duration_ms
        ));
    } else {
        for record in failed {
            print_warning(&format!(
                "{} {}: {}",
                record.action.id,
                record.status,
                record.error.as_deref().unwrap_or("no details")
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> CycleReport {
        serde_json::from_value(serde_json::json!({
            "trigger": "manual",
            "started_at": "2024-03-01T12:00:00Z",
            "duration_ms": 12,
            "plan": [{
                "id": "opt-1",
                "type": "parameter_adjustment",
                "params": {"component": "coordinator", "concurrency_change_pct": 20.0},
                "expected_improvement": -30.0,
                "risk": "low",
                "target_metric": "response_time"
            }, {
                "id": "opt-2",
                "type": "load_balancing",
                "params": {"component": "load_balancer", "auto_balance": true},
                "expected_improvement": 25.0,
                "risk": "low",
                "target_metric": "throughput"
            }],
            "executed": true,
            "outcomes": [{
                "action": {
                    "id": "opt-1",
                    "type": "parameter_adjustment",
                    "params": {"component": "coordinator", "concurrency_change_pct": 20.0},
                    "expected_improvement": -30.0,
                    "risk": "low",
                    "target_metric": "response_time"
                },
                "status": "completed",
                "rollback_attempted": false,
                "started_at": "2024-03-01T12:00:00Z",
                "finished_at": "2024-03-01T12:00:00Z"
            }],
            "scaling": []
        }))
        .unwrap()
    }

    #[test]
    fn test_plan_rows_join_outcomes() {
        let rows = plan_rows(&report());

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].component, "coordinator");
        assert_eq!(rows[0].expected, "-30.0");
        assert!(rows[0].status.contains("completed"));
        assert_eq!(rows[1].status, "planned");
    }

    #[test]
    fn test_history_row_for_scaling_entry() {
        let entry: HistoryEntry = serde_json::from_value(serde_json::json!({
            "kind": "scaling",
            "id": "scale-3",
            "policy_id": "web",
            "action": "scale-up",
            "target_spec": {"from_replicas": 5, "to_replicas": 7, "strategy": {"max_unavailable": 1, "max_surge": 1}},
            "reasoning": ["cpu 85.0 above 80.0"],
            "status": "completed",
            "execution_details": {"started_at": null, "finished_at": "2024-03-01T12:05:00Z", "rollback_required": false},
            "trigger": "prediction",
            "confidence": 0.9,
            "created_at": "2024-03-01T12:04:59Z"
        }))
        .unwrap();

        let row = history_row(&entry);
        assert_eq!(row.kind, "scaling");
        assert_eq!(row.target, "web");
        assert_eq!(row.change, "scale-up 5 -> 7");
        assert_eq!(row.finished, "2024-03-01 12:05:00");
    }
}
