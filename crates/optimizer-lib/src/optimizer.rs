//! The adaptive optimizer service
//!
//! Owns every control-loop component and exposes the consumer operations.
//! Constructed once at startup and shared behind an `Arc`; `start` hands the
//! three periodic loops (collection, optimization cycle, retraining) to a
//! supervisor and `stop` cancels them together.

use crate::analyzer::{Analysis, BaselineTargets, TrendAnalyzer, TREND_WINDOW};
use crate::collector::{
    MetricsCollector, MetricsHistory, MetricsSource, DEFAULT_BUFFER_CAPACITY,
    DEFAULT_COLLECTION_INTERVAL_SECS, DEFAULT_TRAINING_CAPACITY,
};
use crate::error::{OptimizerError, OptimizerResult};
use crate::executor::{ActionExecutor, ParameterStore, Tunables};
use crate::feedback::{
    CalibratingTrainer, FeedbackLoop, FeedbackSource, DEFAULT_BATCH_SIZE,
    DEFAULT_RETRAIN_INTERVAL_SECS,
};
use crate::health::{components, HealthRegistry};
use crate::history::{ActionRecord, HistoryEntry, HistoryStore};
use crate::models::{
    Component, MetricKind, MetricSample, MlPrediction, OptimizationAction, PerformanceBaseline,
    ScalingAction, ScalingPolicy, ScalingTrigger,
};
use crate::observability::{OptimizerMetrics, StructuredLogger};
use crate::planner::{
    component_for, filter_component, NormalizationConfig, NormalizationTable,
    OptimizationPlanner, PlanInputs,
};
use crate::predictor::{
    Calibration, LinearPredictor, LoadPredictor, MIN_TRAINING_SAMPLES, PREDICTION_WINDOW,
};
use crate::scaling::{
    DecisionEngine, InfrastructureManager, LoadSignal, PolicyRegistry, ScalingDecision,
};
use crate::supervisor::{PeriodicJob, Supervisor};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Default optimization cycle cadence
pub const DEFAULT_OPTIMIZATION_INTERVAL_SECS: u64 = 5 * 60;

/// Tunable behaviour of the optimizer service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerSettings {
    /// Instance name attached to structured log events
    pub instance: String,
    /// Execute scheduled plans; manual runs always execute
    pub auto_execute: bool,
    pub action_pacing_ms: u64,
    pub collection_interval_secs: u64,
    pub optimization_interval_secs: u64,
    pub retrain_interval_secs: u64,
    pub buffer_capacity: usize,
    pub training_capacity: usize,
    pub retrain_batch_size: usize,
    pub min_training_samples: usize,
    pub targets: BaselineTargets,
    pub normalization: NormalizationConfig,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            instance: "optimizer-0".to_string(),
            auto_execute: true,
            action_pacing_ms: 1_000,
            collection_interval_secs: DEFAULT_COLLECTION_INTERVAL_SECS,
            optimization_interval_secs: DEFAULT_OPTIMIZATION_INTERVAL_SECS,
            retrain_interval_secs: DEFAULT_RETRAIN_INTERVAL_SECS,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            training_capacity: DEFAULT_TRAINING_CAPACITY,
            retrain_batch_size: DEFAULT_BATCH_SIZE,
            min_training_samples: MIN_TRAINING_SAMPLES,
            targets: BaselineTargets::default(),
            normalization: NormalizationConfig::default(),
        }
    }
}

/// External capabilities the optimizer depends on
pub struct Collaborators {
    pub source: Arc<dyn MetricsSource>,
    pub infrastructure: Arc<dyn InfrastructureManager>,
    pub history: Arc<dyn HistoryStore>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleTrigger {
    Scheduled,
    Manual,
}

/// Scaling evaluation of one policy within a cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingEvaluation {
    pub policy_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<ScalingAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declined: Option<String>,
}

/// What one optimization cycle saw and did
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub trigger: CycleTrigger,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub analysis: Option<Analysis>,
    pub predictions: Vec<MlPrediction>,
    pub plan: Vec<OptimizationAction>,
    pub executed: bool,
    pub outcomes: Vec<ActionRecord>,
    pub scaling: Vec<ScalingEvaluation>,
}

/// Snapshot of the optimizer's state for operators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationMetrics {
    pub buffered_samples: usize,
    pub buffer_capacity: usize,
    pub training_samples: usize,
    pub total_samples: u64,
    pub latest_sample: Option<MetricSample>,
    pub auto_execute: bool,
    pub model_version: String,
    pub prediction_accuracy: BTreeMap<MetricKind, f64>,
    pub feedback_records: usize,
    pub retraining_in_flight: bool,
    pub history_entries: usize,
    pub tunables: Tunables,
    pub last_cycle: Option<CycleReport>,
}

/// Forecasts for every metric that has enough training data
fn forecast(predictor: &dyn LoadPredictor, training: &[MetricSample]) -> Vec<MlPrediction> {
    MetricKind::ALL
        .iter()
        .filter_map(|&metric| {
            match predictor.predict(component_for(metric).as_str(), metric, training) {
                Ok(prediction) => Some(prediction),
                Err(e) => {
                    debug!(metric = %metric, reason = %e, "Prediction skipped");
                    None
                }
            }
        })
        .collect()
}

/// Load signal for a policy: the strongest of its target metrics,
/// forecast where available, otherwise the latest observation
fn policy_signal(
    policy: &ScalingPolicy,
    predictions: &[MlPrediction],
    latest: Option<&MetricSample>,
) -> Option<LoadSignal> {
    policy
        .target_metrics
        .iter()
        .filter_map(|&metric| {
            predictions
                .iter()
                .find(|p| p.metric == metric)
                .map(LoadSignal::from_prediction)
                .or_else(|| latest.map(|s| LoadSignal::observed(metric, metric.value(s))))
        })
        .max_by(|a, b| a.value.total_cmp(&b.value))
}

pub struct AdaptiveOptimizer {
    settings: OptimizerSettings,
    metrics_history: Arc<RwLock<MetricsHistory>>,
    collector: Arc<MetricsCollector>,
    analyzer: TrendAnalyzer,
    predictor: Arc<dyn LoadPredictor>,
    planner: OptimizationPlanner,
    parameters: Arc<ParameterStore>,
    executor: ActionExecutor,
    scaling: Arc<DecisionEngine>,
    feedback: Arc<FeedbackLoop>,
    outcomes: Arc<dyn HistoryStore>,
    baseline: RwLock<PerformanceBaseline>,
    last_cycle: RwLock<Option<CycleReport>>,
    cycle_lock: Mutex<()>,
    supervisor: Supervisor,
    health: HealthRegistry,
    metrics: OptimizerMetrics,
    logger: StructuredLogger,
}

impl AdaptiveOptimizer {
    /// Wire every component. Fails when a seeded policy is invalid.
    pub async fn new(
        settings: OptimizerSettings,
        collaborators: Collaborators,
        policies: Vec<ScalingPolicy>,
        health: HealthRegistry,
    ) -> OptimizerResult<Arc<Self>> {
        let logger = StructuredLogger::new(settings.instance.clone());

        let metrics_history = Arc::new(RwLock::new(MetricsHistory::new(
            settings.buffer_capacity,
            settings.training_capacity,
        )));
        let collector = Arc::new(MetricsCollector::new(
            collaborators.source,
            metrics_history.clone(),
            health.clone(),
        ));

        let calibration = Arc::new(Calibration::new());
        let predictor: Arc<dyn LoadPredictor> = Arc::new(
            LinearPredictor::new(calibration.clone())
                .with_min_samples(settings.min_training_samples),
        );
        let feedback = Arc::new(
            FeedbackLoop::new(
                Arc::new(CalibratingTrainer::new(calibration)),
                health.clone(),
                logger.clone(),
            )
            .with_batch_size(settings.retrain_batch_size),
        );

        let scaling = Arc::new(DecisionEngine::new(
            collaborators.infrastructure,
            Arc::new(PolicyRegistry::with_policies(policies)?),
            collaborators.history.clone(),
            health.clone(),
            logger.clone(),
        ));

        // Replica changes from optimization actions obey the scaling policies
        let parameters =
            Arc::new(ParameterStore::default().with_replica_controller(scaling.clone()));
        parameters.set_retraining(feedback.clone()).await;

        let executor = ActionExecutor::new(
            parameters.clone(),
            collaborators.history.clone(),
            health.clone(),
            logger.clone(),
        )
        .with_pacing(Duration::from_millis(settings.action_pacing_ms))
        .with_auto_execute(settings.auto_execute);

        Ok(Arc::new(Self {
            analyzer: TrendAnalyzer::new(settings.targets.clone()),
            planner: OptimizationPlanner::new(NormalizationTable::from_config(
                &settings.normalization,
            )),
            settings,
            metrics_history,
            collector,
            predictor,
            parameters,
            executor,
            scaling,
            feedback,
            outcomes: collaborators.history,
            baseline: RwLock::new(PerformanceBaseline::default()),
            last_cycle: RwLock::new(None),
            cycle_lock: Mutex::new(()),
            supervisor: Supervisor::new(),
            health,
            metrics: OptimizerMetrics::new(),
            logger,
        }))
    }

    pub fn settings(&self) -> &OptimizerSettings {
        &self.settings
    }

    pub fn health(&self) -> &HealthRegistry {
        &self.health
    }

    pub fn collector(&self) -> &Arc<MetricsCollector> {
        &self.collector
    }

    /// Hand the three periodic loops to the supervisor
    pub async fn start(self: &Arc<Self>) {
        let s = &self.settings;
        self.supervisor
            .spawn(
                self.collector.clone(),
                Duration::from_secs(s.collection_interval_secs.max(1)),
            )
            .await;
        self.supervisor
            .spawn(
                Arc::new(OptimizationCycleJob {
                    optimizer: Arc::downgrade(self),
                }),
                Duration::from_secs(s.optimization_interval_secs.max(1)),
            )
            .await;
        self.supervisor
            .spawn(
                self.feedback.clone(),
                Duration::from_secs(s.retrain_interval_secs.max(1)),
            )
            .await;

        self.health.set_ready(true).await;
        self.logger
            .log_startup(env!("CARGO_PKG_VERSION"), self.executor.auto_execute());
    }

    /// Cancel all loops, waiting for each current iteration
    pub async fn stop(&self) {
        self.health.set_ready(false).await;
        self.supervisor.stop().await;
        self.logger.log_shutdown("stop requested");
    }

    pub async fn running_jobs(&self) -> usize {
        self.supervisor.running().await
    }

    pub fn set_auto_execute(&self, enabled: bool) {
        info!(enabled, "Auto-execute changed");
        self.executor.set_auto_execute(enabled);
    }

    pub async fn get_optimization_metrics(&self) -> OptimizationMetrics {
        let (buffered, capacity, training, total, latest) = {
            let history = self.metrics_history.read().await;
            (
                history.len(),
                history.capacity(),
                history.training_len(),
                history.total_ingested(),
                history.last().cloned(),
            )
        };

        let history_entries = match self.outcomes.len().await {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "History store unavailable");
                0
            }
        };

        OptimizationMetrics {
            buffered_samples: buffered,
            buffer_capacity: capacity,
            training_samples: training,
            total_samples: total,
            latest_sample: latest,
            auto_execute: self.executor.auto_execute(),
            model_version: self.predictor.model_version(),
            prediction_accuracy: self.feedback.mean_accuracy().await.into_iter().collect(),
            feedback_records: self.feedback.dataset_len().await,
            retraining_in_flight: self.feedback.retraining_in_flight().await,
            history_entries,
            tunables: self.parameters.tunables().await,
            last_cycle: self.last_cycle.read().await.clone(),
        }
    }

    /// Baseline from the last cycle, or from the current history before
    /// any cycle has run
    pub async fn get_performance_baseline(&self) -> PerformanceBaseline {
        let stored = self.baseline.read().await.clone();
        if stored.computed_at.is_some() {
            return stored;
        }
        let samples = self.metrics_history.read().await.latest(TREND_WINDOW);
        self.analyzer.analyze(&samples).1
    }

    /// The most recent `limit` history entries, oldest first
    pub async fn get_optimization_history(&self, limit: usize) -> OptimizerResult<Vec<HistoryEntry>> {
        self.outcomes
            .recent(limit)
            .await
            .map_err(|e| OptimizerError::History(format!("{:#}", e)))
    }

    pub async fn get_history_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> OptimizerResult<Vec<HistoryEntry>> {
        self.outcomes
            .query_by_time_range(from, to)
            .await
            .map_err(|e| OptimizerError::History(format!("{:#}", e)))
    }

    /// Plan and execute now, optionally restricted to one component
    ///
    /// Executes even when auto-execute is off. Waits for a running cycle.
    pub async fn manual_optimization(&self, component: Option<Component>) -> CycleReport {
        let _guard = self.cycle_lock.lock().await;
        self.run_cycle(CycleTrigger::Manual, component).await
    }

    /// Scheduled cycle; skipped while another cycle holds the lock
    pub async fn run_scheduled_cycle(&self) -> Option<CycleReport> {
        let Ok(_guard) = self.cycle_lock.try_lock() else {
            info!("Optimization cycle still running, skipping tick");
            return None;
        };
        Some(self.run_cycle(CycleTrigger::Scheduled, None).await)
    }

    async fn run_cycle(&self, trigger: CycleTrigger, component: Option<Component>) -> CycleReport {
        let start = Instant::now();
        let started_at = Utc::now();

        let (recent, training, samples) = {
            let history = self.metrics_history.read().await;
            let needed = self.settings.min_training_samples.max(PREDICTION_WINDOW);
            (
                history.latest(TREND_WINDOW),
                history.training_window(needed),
                history.total_ingested(),
            )
        };

        let (analysis, baseline) = self.analyzer.analyze(&recent);
        *self.baseline.write().await = baseline.clone();
        self.feedback.resolve_pending(&baseline, samples).await;

        let predictions = forecast(self.predictor.as_ref(), &training);

        // Policy scaling settles before the plan runs, so a planned replica
        // change sees its result and cooldowns
        let scaling = match trigger {
            CycleTrigger::Scheduled => self.scale(&predictions, recent.last(), samples).await,
            CycleTrigger::Manual => Vec::new(),
        };
        let (plan, executed, outcomes) = self
            .optimize(trigger, component, analysis.as_ref(), &predictions, &baseline, samples)
            .await;

        self.health.set_healthy(components::PLANNER).await;
        self.metrics
            .observe_cycle_latency(start.elapsed().as_secs_f64());

        let report = CycleReport {
            trigger,
            started_at,
            duration_ms: start.elapsed().as_millis() as u64,
            analysis,
            predictions,
            plan,
            executed,
            outcomes,
            scaling,
        };

        info!(
            trigger = ?trigger,
            planned = report.plan.len(),
            executed = report.executed,
            scaling_evaluations = report.scaling.len(),
            duration_ms = report.duration_ms,
            "Optimization cycle complete"
        );

        *self.last_cycle.write().await = Some(report.clone());
        report
    }

    async fn optimize(
        &self,
        trigger: CycleTrigger,
        component: Option<Component>,
        analysis: Option<&Analysis>,
        predictions: &[MlPrediction],
        baseline: &PerformanceBaseline,
        samples: u64,
    ) -> (Vec<OptimizationAction>, bool, Vec<ActionRecord>) {
        let accuracy = self.feedback.mean_accuracy().await;
        let plan = self.planner.plan(PlanInputs {
            analysis,
            predictions,
            accuracy: &accuracy,
        });
        let plan = filter_component(plan, component);

        let execute = trigger == CycleTrigger::Manual || self.executor.auto_execute();
        if !execute || plan.is_empty() {
            if !plan.is_empty() {
                info!(planned = plan.len(), "Auto-execute disabled, plan not executed");
            }
            return (plan, false, Vec::new());
        }

        let outcomes = self.executor.execute_plan(plan.clone()).await;
        for record in &outcomes {
            if let Some(before) = baseline.current(record.action.target_metric) {
                self.feedback.track_action(record, before, samples).await;
            }
        }

        (plan, true, outcomes)
    }

    async fn scale(
        &self,
        predictions: &[MlPrediction],
        latest: Option<&MetricSample>,
        samples: u64,
    ) -> Vec<ScalingEvaluation> {
        let mut evaluations = Vec::new();
        let mut tracked: Vec<MetricKind> = Vec::new();

        for policy in self.scaling.policies().list().await {
            if !policy.enabled {
                continue;
            }
            let Some(signal) = policy_signal(&policy, predictions, latest) else {
                debug!(policy_id = %policy.id, "No load signal yet");
                continue;
            };

            if signal.trigger == ScalingTrigger::Prediction && !tracked.contains(&signal.metric) {
                if let Some(prediction) = predictions.iter().find(|p| p.metric == signal.metric) {
                    self.feedback
                        .track_prediction(FeedbackSource::Scaling, prediction, samples)
                        .await;
                    tracked.push(signal.metric);
                }
            }

            let evaluation = match self.scaling.evaluate(&policy.id, signal).await {
                Ok(action) => ScalingEvaluation {
                    policy_id: policy.id.clone(),
                    action: Some(action),
                    declined: None,
                },
                Err(e) => ScalingEvaluation {
                    policy_id: policy.id.clone(),
                    action: None,
                    declined: Some(e.to_string()),
                },
            };
            evaluations.push(evaluation);
        }

        evaluations
    }

    /// Dry-run scaling decision for a policy from the current data
    pub async fn get_scaling_decision(&self, policy_id: &str) -> OptimizerResult<ScalingDecision> {
        let policy = self.scaling.policies().get(policy_id).await?;

        let (latest, training) = {
            let history = self.metrics_history.read().await;
            let needed = self.settings.min_training_samples.max(PREDICTION_WINDOW);
            (history.last().cloned(), history.training_window(needed))
        };
        let predictions = forecast(self.predictor.as_ref(), &training);

        let signal = policy_signal(&policy, &predictions, latest.as_ref()).ok_or_else(|| {
            OptimizerError::TransientMetrics("no metrics collected yet".to_string())
        })?;

        self.scaling.decide(policy_id, signal).await
    }

    pub async fn create_policy(&self, policy: ScalingPolicy) -> OptimizerResult<ScalingPolicy> {
        self.scaling.policies().create(policy).await
    }

    pub async fn get_policy(&self, id: &str) -> OptimizerResult<ScalingPolicy> {
        self.scaling.policies().get(id).await
    }

    pub async fn list_policies(&self) -> Vec<ScalingPolicy> {
        self.scaling.policies().list().await
    }

    pub async fn update_policy(&self, id: &str, policy: ScalingPolicy) -> OptimizerResult<ScalingPolicy> {
        self.scaling.policies().update(id, policy).await
    }

    pub async fn delete_policy(&self, id: &str) -> OptimizerResult<ScalingPolicy> {
        let removed = self.scaling.policies().delete(id).await?;
        self.scaling.forget(id);
        Ok(removed)
    }
}

/// Periodic optimization cycle; holds the optimizer weakly so the
/// supervisor does not keep it alive
struct OptimizationCycleJob {
    optimizer: Weak<AdaptiveOptimizer>,
}

#[async_trait]
impl PeriodicJob for OptimizationCycleJob {
    fn name(&self) -> &'static str {
        components::PLANNER
    }

    async fn run_once(&self) {
        match self.optimizer.upgrade() {
            Some(optimizer) => {
                optimizer.run_scheduled_cycle().await;
            }
            None => warn!("Optimizer dropped, cycle skipped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::tests::{sample_with, ScriptedSource};
    use crate::collector::RawSnapshot;
    use crate::history::InMemoryHistoryStore;
    use crate::models::{ActionStatus, ActionType, ScalingActionKind, ScalingStatus};
    use crate::scaling::InMemoryInfrastructure;

    struct Harness {
        optimizer: Arc<AdaptiveOptimizer>,
        infra: Arc<InMemoryInfrastructure>,
        history: Arc<InMemoryHistoryStore>,
    }

    async fn harness(settings: OptimizerSettings, policies: Vec<ScalingPolicy>) -> Harness {
        let infra = Arc::new(InMemoryInfrastructure::new(5));
        let history = Arc::new(InMemoryHistoryStore::new());
        let optimizer = AdaptiveOptimizer::new(
            settings,
            Collaborators {
                source: Arc::new(ScriptedSource::new(vec![Ok(RawSnapshot::default())])),
                infrastructure: infra.clone(),
                history: history.clone(),
            },
            policies,
            HealthRegistry::with_default_components().await,
        )
        .await
        .unwrap();
        Harness {
            optimizer,
            infra,
            history,
        }
    }

    fn quick_settings() -> OptimizerSettings {
        OptimizerSettings {
            action_pacing_ms: 0,
            ..Default::default()
        }
    }

    async fn push(optimizer: &AdaptiveOptimizer, samples: Vec<MetricSample>) {
        let mut history = optimizer.metrics_history.write().await;
        for sample in samples {
            history.push(sample);
        }
    }

    fn response_times(values: &[f64]) -> Vec<MetricSample> {
        values
            .iter()
            .map(|v| sample_with(|s| s.performance.response_time_ms = *v))
            .collect()
    }

    #[tokio::test]
    async fn test_cycle_without_history_plans_nothing() {
        let h = harness(quick_settings(), vec![]).await;

        let report = h.optimizer.run_scheduled_cycle().await.unwrap();

        assert!(report.analysis.is_none());
        assert!(report.predictions.is_empty());
        assert!(report.plan.is_empty());
        assert!(!report.executed);
    }

    #[tokio::test]
    async fn test_response_time_jump_adjusts_coordinator() {
        let h = harness(quick_settings(), vec![]).await;
        push(&h.optimizer, response_times(&[150.0, 220.0])).await;

        let report = h.optimizer.manual_optimization(None).await;

        assert_eq!(report.plan.len(), 1);
        let action = &report.plan[0];
        assert_eq!(action.action_type, ActionType::ParameterAdjustment);
        assert_eq!(action.component(), Component::Coordinator);
        assert_eq!(action.expected_improvement, -30.0);

        assert!(report.executed);
        assert_eq!(report.outcomes[0].status, ActionStatus::Completed);
        assert_eq!(h.history.len().await.unwrap(), 1);

        let metrics = h.optimizer.get_optimization_metrics().await;
        assert_eq!(metrics.tunables.max_concurrency, 12);
        assert_eq!(metrics.history_entries, 1);
    }

    #[tokio::test]
    async fn test_completed_action_feeds_back_next_cycle() {
        let h = harness(quick_settings(), vec![]).await;
        push(&h.optimizer, response_times(&[150.0, 220.0])).await;
        h.optimizer.manual_optimization(None).await;

        push(&h.optimizer, response_times(&[190.0])).await;
        h.optimizer.run_scheduled_cycle().await.unwrap();

        let metrics = h.optimizer.get_optimization_metrics().await;
        assert_eq!(metrics.feedback_records, 1);
        // Predicted -30, observed 220 -> 190
        assert_eq!(metrics.prediction_accuracy[&MetricKind::ResponseTime], 1.0);
    }

    #[tokio::test]
    async fn test_auto_execute_off_only_plans() {
        let settings = OptimizerSettings {
            auto_execute: false,
            ..quick_settings()
        };
        let h = harness(settings, vec![]).await;
        push(&h.optimizer, response_times(&[150.0, 220.0])).await;

        let report = h.optimizer.run_scheduled_cycle().await.unwrap();
        assert_eq!(report.plan.len(), 1);
        assert!(!report.executed);
        assert_eq!(h.history.len().await.unwrap(), 0);

        // Manual runs still execute
        let report = h.optimizer.manual_optimization(None).await;
        assert!(report.executed);
        assert_eq!(h.history.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_manual_optimization_filters_component() {
        let h = harness(quick_settings(), vec![]).await;
        push(&h.optimizer, response_times(&[150.0, 220.0])).await;

        let report = h.optimizer.manual_optimization(Some(Component::Qa)).await;

        assert!(report.plan.is_empty());
        assert!(!report.executed);
    }

    #[tokio::test]
    async fn test_overlapping_cycle_is_skipped() {
        let h = harness(quick_settings(), vec![]).await;

        let _held = h.optimizer.cycle_lock.lock().await;
        assert!(h.optimizer.run_scheduled_cycle().await.is_none());
    }

    #[tokio::test]
    async fn test_scheduled_cycle_scales_on_forecast() {
        let h = harness(quick_settings(), vec![ScalingPolicy::new("web", 2, 20)]).await;
        let busy: Vec<_> = (0..12)
            .map(|_| sample_with(|s| s.resource_utilization.cpu = 85.0))
            .collect();
        push(&h.optimizer, busy).await;

        let report = h.optimizer.run_scheduled_cycle().await.unwrap();

        assert_eq!(report.scaling.len(), 1);
        let action = report.scaling[0].action.as_ref().unwrap();
        assert_eq!(action.action, ScalingActionKind::ScaleUp);
        assert_eq!(action.status, ScalingStatus::Completed);
        assert_eq!(action.trigger, ScalingTrigger::Prediction);
        assert_eq!(h.infra.current_replicas().await.unwrap(), 7);

        let entries = h.optimizer.get_optimization_history(10).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].as_scaling().is_some());
    }

    fn cpu(values: &[f64]) -> Vec<MetricSample> {
        values
            .iter()
            .map(|v| sample_with(|s| s.resource_utilization.cpu = *v))
            .collect()
    }

    fn outcome_of(report: &CycleReport, action_type: ActionType) -> &ActionRecord {
        report
            .outcomes
            .iter()
            .find(|r| r.action.action_type == action_type)
            .unwrap_or_else(|| panic!("no {:?} outcome in {:?}", action_type, report.plan))
    }

    #[tokio::test]
    async fn test_planned_scaling_stays_within_policy_bounds() {
        let h = harness(quick_settings(), vec![ScalingPolicy::new("web", 2, 5)]).await;
        push(&h.optimizer, cpu(&[50.0, 60.0, 72.0])).await;

        let report = h.optimizer.manual_optimization(None).await;

        let record = outcome_of(&report, ActionType::ResourceScaling);
        assert_ne!(record.status, ActionStatus::Completed);
        assert!(record.error.as_deref().unwrap().contains("no headroom"));
        assert_eq!(h.infra.current_replicas().await.unwrap(), 5);
        assert!(h.infra.applied().await.is_empty());
    }

    #[tokio::test]
    async fn test_planned_scaling_arms_policy_cooldown() {
        let h = harness(quick_settings(), vec![ScalingPolicy::new("web", 2, 20)]).await;
        push(&h.optimizer, cpu(&[50.0, 60.0, 72.0])).await;

        let first = h.optimizer.manual_optimization(None).await;
        assert_eq!(
            outcome_of(&first, ActionType::ResourceScaling).status,
            ActionStatus::Completed
        );
        assert_eq!(h.infra.current_replicas().await.unwrap(), 6);

        let second = h.optimizer.manual_optimization(None).await;
        let record = outcome_of(&second, ActionType::ResourceScaling);
        assert_ne!(record.status, ActionStatus::Completed);
        assert!(record.error.as_deref().unwrap().contains("cooldown"));
        assert_eq!(h.infra.applied().await, vec![6]);
    }

    #[tokio::test]
    async fn test_scheduled_cycle_scales_once() {
        let h = harness(quick_settings(), vec![ScalingPolicy::new("web", 2, 20)]).await;
        let ramp: Vec<f64> = (0..12).map(|i| 20.0 + 6.0 * i as f64).collect();
        push(&h.optimizer, cpu(&ramp)).await;

        let report = h.optimizer.run_scheduled_cycle().await.unwrap();

        let action = report.scaling[0].action.as_ref().unwrap();
        assert_eq!(action.status, ScalingStatus::Completed);
        assert_eq!(action.target_spec.from_replicas, 5);
        assert_eq!(action.target_spec.to_replicas, 7);

        // The planned replica change meets the cooldown the engine just armed
        let record = outcome_of(&report, ActionType::ResourceScaling);
        assert_ne!(record.status, ActionStatus::Completed);
        assert!(record.error.as_deref().unwrap().contains("cooldown"));
        assert_eq!(h.infra.applied().await, vec![7]);
        assert_eq!(h.infra.current_replicas().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_feedback_waits_for_a_new_sample() {
        let h = harness(quick_settings(), vec![]).await;
        push(&h.optimizer, response_times(&[150.0, 220.0])).await;

        h.optimizer.manual_optimization(None).await;
        let second = h.optimizer.manual_optimization(None).await;

        let metrics = h.optimizer.get_optimization_metrics().await;
        assert_eq!(metrics.feedback_records, 0);
        assert!(metrics.prediction_accuracy.is_empty());
        assert!(second
            .plan
            .iter()
            .all(|a| a.action_type != ActionType::MlTraining));
        assert_eq!(h.optimizer.feedback.pending_len().await, 2);
    }

    #[tokio::test]
    async fn test_declined_scaling_reported() {
        let h = harness(quick_settings(), vec![ScalingPolicy::new("web", 2, 20)]).await;
        push(&h.optimizer, vec![sample_with(|s| s.resource_utilization.cpu = 55.0)]).await;

        let report = h.optimizer.run_scheduled_cycle().await.unwrap();

        assert!(report.scaling[0].action.is_none());
        assert!(report.scaling[0]
            .declined
            .as_deref()
            .unwrap()
            .contains("within thresholds"));
        assert!(h.infra.applied().await.is_empty());
    }

    #[tokio::test]
    async fn test_scaling_decision_is_dry_run() {
        let h = harness(quick_settings(), vec![ScalingPolicy::new("web", 2, 20)]).await;

        assert!(matches!(
            h.optimizer.get_scaling_decision("web").await,
            Err(OptimizerError::TransientMetrics(_))
        ));

        push(&h.optimizer, vec![sample_with(|s| s.resource_utilization.cpu = 90.0)]).await;
        let decision = h.optimizer.get_scaling_decision("web").await.unwrap();

        assert_eq!(decision.action, Some(ScalingActionKind::ScaleUp));
        assert_eq!(decision.target_replicas, 7);
        assert_eq!(decision.signal.trigger, ScalingTrigger::Threshold);
        assert!(h.infra.applied().await.is_empty());
    }

    #[tokio::test]
    async fn test_policy_crud() {
        let h = harness(quick_settings(), vec![]).await;

        h.optimizer
            .create_policy(ScalingPolicy::new("web", 2, 20))
            .await
            .unwrap();
        assert_eq!(h.optimizer.list_policies().await.len(), 1);
        assert!(matches!(
            h.optimizer.create_policy(ScalingPolicy::new("api", 9, 1)).await,
            Err(OptimizerError::InvalidPolicy(_))
        ));

        h.optimizer.delete_policy("web").await.unwrap();
        assert!(matches!(
            h.optimizer.get_policy("web").await,
            Err(OptimizerError::PolicyNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_seed_policy_rejected() {
        let result = AdaptiveOptimizer::new(
            quick_settings(),
            Collaborators {
                source: Arc::new(ScriptedSource::new(vec![Ok(RawSnapshot::default())])),
                infrastructure: Arc::new(InMemoryInfrastructure::new(1)),
                history: Arc::new(InMemoryHistoryStore::new()),
            },
            vec![ScalingPolicy::new("web", 5, 1)],
            HealthRegistry::new(),
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_baseline_before_first_cycle() {
        let h = harness(quick_settings(), vec![]).await;
        assert!(h.optimizer.get_performance_baseline().await.metrics.is_empty());

        push(&h.optimizer, response_times(&[150.0, 180.0, 220.0])).await;
        let baseline = h.optimizer.get_performance_baseline().await;
        assert_eq!(baseline.current(MetricKind::ResponseTime), Some(220.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_and_stop() {
        let h = harness(quick_settings(), vec![]).await;

        h.optimizer.start().await;
        assert_eq!(h.optimizer.running_jobs().await, 3);
        assert!(h.optimizer.health().readiness().await.ready);

        // First ticks fire immediately, the collector records a sample
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(
            h.optimizer.get_optimization_metrics().await.buffered_samples,
            1
        );

        h.optimizer.stop().await;
        assert_eq!(h.optimizer.running_jobs().await, 0);
        assert!(!h.optimizer.health().readiness().await.ready);
    }
}
