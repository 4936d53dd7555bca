//! CLI integration tests

use std::process::{Command, Output};

/// Run optctl with an isolated home directory and no colors
fn optctl(args: &[&str]) -> Output {
    let home = tempfile::tempdir().expect("Failed to create temp home");
    Command::new(env!("CARGO_BIN_EXE_optctl"))
        .args(args)
        .env("HOME", home.path())
        .env("NO_COLOR", "1")
        .env_remove("OPTCTL_API_URL")
        .output()
        .expect("Failed to execute command")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = optctl(&["--help"]);
    let stdout = stdout(&output);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("Adaptive Optimizer"), "Should show app name");
    for command in ["status", "baseline", "history", "optimize", "policies", "decision"] {
        assert!(stdout.contains(command), "Should show {} command", command);
    }
    assert!(stdout.contains("--format"), "Should show format option");
    assert!(stdout.contains("OPTCTL_API_URL"), "Should show env var");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = optctl(&["--version"]);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout(&output).contains("optctl"), "Should show binary name");
}

#[test]
fn test_policies_apply_help() {
    let output = optctl(&["policies", "apply", "--help"]);

    assert!(output.status.success());
    assert!(stdout(&output).contains("--file"));
}

#[test]
fn test_status_json() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("GET", "/api/v1/optimization/metrics")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{
                "buffered_samples": 12, "buffer_capacity": 1000,
                "training_samples": 12, "total_samples": 40,
                "latest_sample": null, "auto_execute": true,
                "model_version": "cal-0123456789ab",
                "prediction_accuracy": {"cpu": 0.92},
                "feedback_records": 3, "retraining_in_flight": false,
                "history_entries": 5,
                "tunables": {"max_concurrency": 12, "quality_threshold": 80.0,
                             "auto_balance": false, "replicas": 1, "cache_size_mb": 256},
                "last_cycle": null
            }"#,
        )
        .create();

    let output = optctl(&["--api-url", &server.url(), "--format", "json", "status"]);

    mock.assert();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let json: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(json["tunables"]["max_concurrency"], 12);
    assert_eq!(json["prediction_accuracy"]["cpu"], 0.92);
}

#[test]
fn test_optimize_sends_component() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("POST", "/api/v1/optimization/run")
        .match_body(mockito::Matcher::Json(serde_json::json!({"component": "cache"})))
        .with_status(200)
        .with_body(
            r#"{"trigger": "manual", "started_at": "2024-03-01T12:00:00Z",
                "duration_ms": 3, "analysis": null, "predictions": [],
                "plan": [], "executed": false, "outcomes": [], "scaling": []}"#,
        )
        .create();

    let output = optctl(&["--api-url", &server.url(), "optimize", "--component", "cache"]);

    mock.assert();
    assert!(output.status.success());
    assert!(stdout(&output).contains("No optimization opportunities found"));
}

#[test]
fn test_history_table() {
    let mut server = mockito::Server::new();
    server
        .mock("GET", "/api/v1/optimization/history")
        .match_query(mockito::Matcher::UrlEncoded("limit".into(), "5".into()))
        .with_status(200)
        .with_body(
            r#"[{
                "kind": "optimization",
                "action": {"id": "opt-7", "type": "parameter_adjustment",
                           "params": {"component": "coordinator", "concurrency_change_pct": 20.0},
                           "expected_improvement": -30.0, "risk": "low",
                           "target_metric": "response_time"},
                "status": "rolled_back", "error": "store unavailable",
                "rollback_attempted": true,
                "started_at": "2024-03-01T12:00:00Z", "finished_at": "2024-03-01T12:00:01Z"
            }]"#,
        )
        .create();

    let output = optctl(&["--api-url", &server.url(), "history", "--limit", "5"]);
    let stdout = stdout(&output);

    assert!(output.status.success());
    assert!(stdout.contains("opt-7"));
    assert!(stdout.contains("rolled_back"));
    assert!(stdout.contains("Total: 1 entries"));
}

#[test]
fn test_decision_not_found_reports_api_error() {
    let mut server = mockito::Server::new();
    server
        .mock("GET", "/api/v1/policies/missing/decision")
        .with_status(404)
        .with_body(r#"{"error": "scaling policy 'missing' not found"}"#)
        .create();

    let output = optctl(&["--api-url", &server.url(), "decision", "missing"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("404"));
    assert!(stderr.contains("scaling policy 'missing' not found"));
}

#[test]
fn test_policies_apply_updates_existing() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("web.json");
    std::fs::write(
        &file,
        r#"{"id": "web", "name": "Web tier", "min_replicas": 2, "max_replicas": 30,
            "scale_up": {"value": 75.0}, "scale_down": {"value": 25.0}}"#,
    )
    .unwrap();

    let policy = r#"{"id": "web", "name": "Web tier", "enabled": true,
                     "min_replicas": 2, "max_replicas": 30, "target_metrics": ["cpu"],
                     "scale_up": {"value": 75.0, "sustained_secs": 0},
                     "scale_down": {"value": 25.0, "sustained_secs": 0}}"#;

    let mut server = mockito::Server::new();
    server
        .mock("GET", "/api/v1/policies")
        .with_status(200)
        .with_body(format!("[{}]", policy))
        .create();
    let put = server
        .mock("PUT", "/api/v1/policies/web")
        .match_body(mockito::Matcher::PartialJson(
            serde_json::json!({"id": "web", "max_replicas": 30}),
        ))
        .with_status(200)
        .with_body(policy)
        .create();

    let output = optctl(&[
        "--api-url",
        &server.url(),
        "policies",
        "apply",
        "-f",
        file.to_str().unwrap(),
    ]);

    put.assert();
    assert!(output.status.success());
    assert!(stdout(&output).contains("Policy web updated"));
}

/// Test invalid command error handling
#[test]
fn test_invalid_command() {
    let output = optctl(&["invalid-command"]);

    assert!(!output.status.success(), "Invalid command should fail");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("error") || stderr.contains("invalid"),
        "Should show error message"
    );
}

/// Test missing required argument error handling
#[test]
fn test_missing_argument() {
    let output = optctl(&["decision"]);

    assert!(!output.status.success(), "Missing argument should fail");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("required") || stderr.contains("error"),
        "Should show error about missing argument"
    );
}
