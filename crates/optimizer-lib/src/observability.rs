//! Observability infrastructure for the optimizer
//!
//! Provides:
//! - Prometheus metrics (collection/cycle latency, action outcomes, replicas, accuracy)
//! - Structured JSON logging with tracing

use crate::history::ActionRecord;
use crate::models::{ActionStatus, ScalingAction};
use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter, register_int_counter_vec,
    register_int_gauge, register_int_gauge_vec, GaugeVec, Histogram, IntCounter, IntCounterVec,
    IntGauge, IntGaugeVec,
};
use std::sync::OnceLock;
use tracing::{error, info, warn};

/// Histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<OptimizerMetricsInner> = OnceLock::new();

struct OptimizerMetricsInner {
    collection_latency_seconds: Histogram,
    cycle_latency_seconds: Histogram,
    buffered_samples: IntGauge,
    training_samples: IntGauge,
    collection_errors: IntCounter,
    actions_total: IntCounterVec,
    rollback_failures: IntCounter,
    scaling_actions_total: IntCounterVec,
    replicas: IntGaugeVec,
    prediction_accuracy: GaugeVec,
    retraining_runs: IntCounter,
}

impl OptimizerMetricsInner {
    fn new() -> Self {
        Self {
            collection_latency_seconds: register_histogram!(
                "optimizer_collection_latency_seconds",
                "Time spent fetching and recording one metrics sample",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register collection_latency_seconds"),

            cycle_latency_seconds: register_histogram!(
                "optimizer_cycle_latency_seconds",
                "Time spent running one optimization cycle",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register cycle_latency_seconds"),

            buffered_samples: register_int_gauge!(
                "optimizer_buffered_samples",
                "Number of samples in the bounded metrics history"
            )
            .expect("Failed to register buffered_samples"),

            training_samples: register_int_gauge!(
                "optimizer_training_samples",
                "Number of samples in the predictor training accumulator"
            )
            .expect("Failed to register training_samples"),

            collection_errors: register_int_counter!(
                "optimizer_collection_errors_total",
                "Total number of skipped collection ticks"
            )
            .expect("Failed to register collection_errors"),

            actions_total: register_int_counter_vec!(
                "optimizer_actions_total",
                "Optimization actions by terminal outcome",
                &["outcome"]
            )
            .expect("Failed to register actions_total"),

            rollback_failures: register_int_counter!(
                "optimizer_rollback_failures_total",
                "Rollbacks that failed and were escalated"
            )
            .expect("Failed to register rollback_failures"),

            scaling_actions_total: register_int_counter_vec!(
                "optimizer_scaling_actions_total",
                "Scaling actions by policy, kind and terminal status",
                &["policy", "action", "status"]
            )
            .expect("Failed to register scaling_actions_total"),

            replicas: register_int_gauge_vec!(
                "optimizer_policy_replicas",
                "Last known replica count per scaling policy",
                &["policy"]
            )
            .expect("Failed to register replicas"),

            prediction_accuracy: register_gauge_vec!(
                "optimizer_prediction_accuracy",
                "Rolling prediction accuracy per metric",
                &["metric"]
            )
            .expect("Failed to register prediction_accuracy"),

            retraining_runs: register_int_counter!(
                "optimizer_retraining_runs_total",
                "Completed model retraining runs"
            )
            .expect("Failed to register retraining_runs"),
        }
    }
}

/// Optimizer metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct OptimizerMetrics {
    _private: (),
}

impl Default for OptimizerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl OptimizerMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(OptimizerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &OptimizerMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn observe_collection_latency(&self, duration_secs: f64) {
        self.inner().collection_latency_seconds.observe(duration_secs);
    }

    pub fn observe_cycle_latency(&self, duration_secs: f64) {
        self.inner().cycle_latency_seconds.observe(duration_secs);
    }

    pub fn set_history_sizes(&self, buffered: usize, training: usize) {
        self.inner().buffered_samples.set(buffered as i64);
        self.inner().training_samples.set(training as i64);
    }

    pub fn inc_collection_errors(&self) {
        self.inner().collection_errors.inc();
    }

    /// Count a terminal optimization action outcome
    pub fn record_action_outcome(&self, status: ActionStatus) {
        let outcome = match status {
            ActionStatus::Completed => "completed",
            ActionStatus::Failed => "failed",
            ActionStatus::RolledBack => "rolled_back",
            ActionStatus::RollbackFailed => "rollback_failed",
            _ => "other",
        };
        self.inner().actions_total.with_label_values(&[outcome]).inc();
        if status == ActionStatus::RollbackFailed {
            self.inner().rollback_failures.inc();
        }
    }

    pub fn record_scaling_action(&self, action: &ScalingAction) {
        let status = serde_json::to_value(action.status)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        let kind = action.action.to_string();
        self.inner()
            .scaling_actions_total
            .with_label_values(&[action.policy_id.as_str(), kind.as_str(), status.as_str()])
            .inc();
    }

    pub fn set_replicas(&self, policy_id: &str, replicas: u32) {
        self.inner()
            .replicas
            .with_label_values(&[policy_id])
            .set(replicas as i64);
    }

    pub fn set_prediction_accuracy(&self, metric: &str, accuracy: f64) {
        self.inner()
            .prediction_accuracy
            .with_label_values(&[metric])
            .set(accuracy);
    }

    pub fn inc_retraining_runs(&self) {
        self.inner().retraining_runs.inc();
    }
}

/// Structured logger for optimizer events
///
/// Provides consistent JSON-formatted logging for action outcomes,
/// scaling decisions, escalations and lifecycle events.
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    /// Log the terminal outcome of an optimization action
    pub fn log_action_outcome(&self, record: &ActionRecord) {
        let action = &record.action;
        match record.status {
            ActionStatus::Completed => {
                info!(
                    event = "action_completed",
                    instance = %self.instance,
                    action_id = %action.id,
                    action_type = %action.action_type,
                    component = %action.component(),
                    expected_improvement = action.expected_improvement,
                    "Optimization action completed"
                );
            }
            _ => {
                warn!(
                    event = "action_failed",
                    instance = %self.instance,
                    action_id = %action.id,
                    action_type = %action.action_type,
                    component = %action.component(),
                    status = ?record.status,
                    rollback_attempted = record.rollback_attempted,
                    error = record.error.as_deref().unwrap_or(""),
                    "Optimization action failed"
                );
            }
        }
    }

    /// Log a rollback that could not be applied; operators must intervene
    pub fn log_rollback_escalation(&self, action_id: &str, component: &str, reason: &str) {
        error!(
            event = "rollback_failed",
            instance = %self.instance,
            action_id = %action_id,
            component = %component,
            reason = %reason,
            alert = true,
            "Rollback failed, manual intervention required"
        );
    }

    /// Log a scaling action reaching a terminal state
    pub fn log_scaling_action(&self, action: &ScalingAction) {
        info!(
            event = "scaling_action",
            instance = %self.instance,
            action_id = %action.id,
            policy_id = %action.policy_id,
            action = %action.action,
            from_replicas = action.target_spec.from_replicas,
            to_replicas = action.target_spec.to_replicas,
            status = ?action.status,
            rollback_required = action.execution_details.rollback_required,
            confidence = action.confidence,
            reasoning = ?action.reasoning,
            "Scaling action finished"
        );
    }

    /// Log a declined scaling decision
    pub fn log_scaling_declined(&self, policy_id: &str, reasoning: &[String]) {
        info!(
            event = "scaling_declined",
            instance = %self.instance,
            policy_id = %policy_id,
            reasoning = ?reasoning,
            "Scaling decision declined"
        );
    }

    /// Log a prediction-vs-outcome comparison
    pub fn log_prediction_accuracy(
        &self,
        metric: &str,
        predicted_delta: f64,
        actual_delta: f64,
        accuracy: f64,
    ) {
        info!(
            event = "prediction_feedback",
            instance = %self.instance,
            metric = %metric,
            predicted_delta = predicted_delta,
            actual_delta = actual_delta,
            accuracy = accuracy,
            "Prediction feedback recorded"
        );
    }

    /// Log a retraining run
    pub fn log_retraining(&self, model_version: &str, samples: usize, success: bool) {
        if success {
            info!(
                event = "model_retrained",
                instance = %self.instance,
                model_version = %model_version,
                samples = samples,
                "Prediction model retrained"
            );
        } else {
            warn!(
                event = "model_retraining_failed",
                instance = %self.instance,
                samples = samples,
                "Prediction model retraining failed, keeping previous calibration"
            );
        }
    }

    /// Log service startup
    pub fn log_startup(&self, version: &str, auto_execute: bool) {
        info!(
            event = "optimizer_started",
            instance = %self.instance,
            version = %version,
            auto_execute = auto_execute,
            "Adaptive optimizer started"
        );
    }

    /// Log service shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "optimizer_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Adaptive optimizer shutting down"
        );
    }
}
