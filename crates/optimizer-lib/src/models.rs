//! Core data models for the optimizer

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;

/// Metrics tracked by the trend analyzer and the load predictor
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    ResponseTime,
    Throughput,
    Quality,
    Cpu,
    Memory,
}

impl MetricKind {
    pub const ALL: [MetricKind; 5] = [
        MetricKind::ResponseTime,
        MetricKind::Throughput,
        MetricKind::Quality,
        MetricKind::Cpu,
        MetricKind::Memory,
    ];

    /// Whether a falling value is the desired direction
    pub fn lower_is_better(&self) -> bool {
        matches!(
            self,
            MetricKind::ResponseTime | MetricKind::Cpu | MetricKind::Memory
        )
    }

    /// Read this metric from a sample
    pub fn value(&self, sample: &MetricSample) -> f64 {
        match self {
            MetricKind::ResponseTime => sample.performance.response_time_ms,
            MetricKind::Throughput => sample.performance.throughput,
            MetricKind::Quality => sample.quality.overall,
            MetricKind::Cpu => sample.resource_utilization.cpu,
            MetricKind::Memory => sample.resource_utilization.memory,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::ResponseTime => "response_time",
            MetricKind::Throughput => "throughput",
            MetricKind::Quality => "quality",
            MetricKind::Cpu => "cpu",
            MetricKind::Memory => "memory",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Performance measurements for one sampling tick
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub response_time_ms: f64,
    pub throughput: f64,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub disk_usage: f64,
    pub network_latency_ms: f64,
}

/// Output quality scores (0-100)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub overall: f64,
    pub by_component: HashMap<String, f64>,
}

/// Resource utilization percentages (0-100)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceUtilization {
    pub cpu: f64,
    pub memory: f64,
    pub storage: f64,
    pub network: f64,
}

/// Raw workload counters reported by the coordinator and workflow engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkloadCounters {
    pub active_tasks: u32,
    pub queue_length: u32,
    pub active_workflows: u32,
}

/// Bottlenecks flagged for a sample
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bottlenecks {
    pub identified: Vec<String>,
    pub impact: HashMap<String, f64>,
    pub recommendations: Vec<String>,
}

impl Bottlenecks {
    pub fn is_empty(&self) -> bool {
        self.identified.is_empty()
    }
}

/// A single metrics sample. Samples are immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub timestamp: DateTime<Utc>,
    pub performance: PerformanceMetrics,
    pub quality: QualityMetrics,
    pub resource_utilization: ResourceUtilization,
    pub workload: WorkloadCounters,
    pub bottlenecks: Bottlenecks,
}

/// Short-term direction of a metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Improving,
    Degrading,
    Stable,
}

/// Short-term direction of CPU consumption
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceTrend {
    Increasing,
    Decreasing,
    Stable,
}

/// Baseline entry for one metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaselineEntry {
    pub target: f64,
    pub current: f64,
    pub trend: Trend,
}

/// Performance baseline, overwritten every optimization cycle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceBaseline {
    pub computed_at: Option<DateTime<Utc>>,
    pub metrics: BTreeMap<MetricKind, BaselineEntry>,
}

impl PerformanceBaseline {
    pub fn current(&self, metric: MetricKind) -> Option<f64> {
        self.metrics.get(&metric).map(|e| e.current)
    }
}

/// Kind of optimization action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    ParameterAdjustment,
    ResourceScaling,
    LoadBalancing,
    CacheOptimization,
    MlTraining,
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActionType::ParameterAdjustment => "parameter_adjustment",
            ActionType::ResourceScaling => "resource_scaling",
            ActionType::LoadBalancing => "load_balancing",
            ActionType::CacheOptimization => "cache_optimization",
            ActionType::MlTraining => "ml_training",
        };
        f.write_str(s)
    }
}

/// Components an optimization action can target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    Coordinator,
    Qa,
    LoadBalancer,
    Infrastructure,
    Cache,
    Predictor,
}

impl Component {
    pub fn as_str(&self) -> &'static str {
        match self {
            Component::Coordinator => "coordinator",
            Component::Qa => "qa",
            Component::LoadBalancer => "load_balancer",
            Component::Infrastructure => "infrastructure",
            Component::Cache => "cache",
            Component::Predictor => "predictor",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Component {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "coordinator" => Ok(Component::Coordinator),
            "qa" => Ok(Component::Qa),
            "load_balancer" => Ok(Component::LoadBalancer),
            "infrastructure" => Ok(Component::Infrastructure),
            "cache" => Ok(Component::Cache),
            "predictor" => Ok(Component::Predictor),
            other => Err(format!("unknown component '{}'", other)),
        }
    }
}

/// Component-specific action parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "component", rename_all = "snake_case")]
pub enum ActionParams {
    Coordinator { concurrency_change_pct: f64 },
    Qa { quality_threshold_delta: f64 },
    LoadBalancer { auto_balance: bool },
    Scaling { replica_delta: i32 },
    Cache { size_change_pct: f64 },
    Model { metric: MetricKind },
}

impl ActionParams {
    pub fn component(&self) -> Component {
        match self {
            ActionParams::Coordinator { .. } => Component::Coordinator,
            ActionParams::Qa { .. } => Component::Qa,
            ActionParams::LoadBalancer { .. } => Component::LoadBalancer,
            ActionParams::Scaling { .. } => Component::Infrastructure,
            ActionParams::Cache { .. } => Component::Cache,
            ActionParams::Model { .. } => Component::Predictor,
        }
    }
}

/// Full state of a tunable component, captured before an action runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "component", rename_all = "snake_case")]
pub enum ComponentState {
    Coordinator { max_concurrency: u32 },
    Qa { quality_threshold: f64 },
    LoadBalancer { auto_balance: bool },
    Scaling { replicas: u32 },
    Cache { size_mb: u64 },
}

impl ComponentState {
    pub fn component(&self) -> Component {
        match self {
            ComponentState::Coordinator { .. } => Component::Coordinator,
            ComponentState::Qa { .. } => Component::Qa,
            ComponentState::LoadBalancer { .. } => Component::LoadBalancer,
            ComponentState::Scaling { .. } => Component::Infrastructure,
            ComponentState::Cache { .. } => Component::Cache,
        }
    }
}

/// Risk level of an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Risk {
    Low,
    Medium,
    High,
}

/// Lifecycle status of an optimization action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Planned,
    Executing,
    Completed,
    Failed,
    RollingBack,
    RolledBack,
    RollbackFailed,
}

impl ActionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ActionStatus::Completed
                | ActionStatus::Failed
                | ActionStatus::RolledBack
                | ActionStatus::RollbackFailed
        )
    }
}

/// Where a candidate action came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateOrigin {
    Rule,
    Prediction,
}

/// A planned corrective action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationAction {
    pub id: String,
    #[serde(rename = "type")]
    pub action_type: ActionType,
    pub params: ActionParams,
    /// Signed expected change of the target metric
    pub expected_improvement: f64,
    pub risk: Risk,
    pub execution_time_estimate_ms: u64,
    pub rollback_data: Option<ComponentState>,
    pub status: ActionStatus,
    pub origin: CandidateOrigin,
    /// Metric the action is expected to move
    pub target_metric: MetricKind,
}

impl OptimizationAction {
    pub fn new(
        action_type: ActionType,
        params: ActionParams,
        expected_improvement: f64,
        risk: Risk,
        target_metric: MetricKind,
    ) -> Self {
        Self {
            id: next_id("opt"),
            action_type,
            params,
            expected_improvement,
            risk,
            execution_time_estimate_ms: default_execution_estimate(action_type),
            rollback_data: None,
            status: ActionStatus::Planned,
            origin: CandidateOrigin::Rule,
            target_metric,
        }
    }

    pub fn with_origin(mut self, origin: CandidateOrigin) -> Self {
        self.origin = origin;
        self
    }

    pub fn component(&self) -> Component {
        self.params.component()
    }
}

fn default_execution_estimate(action_type: ActionType) -> u64 {
    match action_type {
        ActionType::ParameterAdjustment => 500,
        ActionType::LoadBalancing => 1_000,
        ActionType::CacheOptimization => 2_000,
        ActionType::ResourceScaling => 30_000,
        ActionType::MlTraining => 60_000,
    }
}

/// Forecast for one metric. Consumed within the cycle that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlPrediction {
    pub component: String,
    pub metric: MetricKind,
    pub current_value: f64,
    pub predicted_value: f64,
    pub confidence: f64,
    pub time_horizon_minutes: u32,
    pub factors: Vec<String>,
}

impl MlPrediction {
    /// Predicted movement in the undesired direction (positive = worse)
    pub fn degradation(&self) -> f64 {
        if self.metric.lower_is_better() {
            self.predicted_value - self.current_value
        } else {
            self.current_value - self.predicted_value
        }
    }
}

/// Threshold that must hold for a sustained period
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub value: f64,
    #[serde(default)]
    pub sustained_secs: u64,
}

impl Threshold {
    pub fn sustained(&self) -> Duration {
        Duration::from_secs(self.sustained_secs)
    }
}

/// Cooldown windows per scaling direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cooldowns {
    pub scale_up_secs: u64,
    pub scale_down_secs: u64,
}

impl Default for Cooldowns {
    fn default() -> Self {
        Self {
            scale_up_secs: 300,
            scale_down_secs: 600,
        }
    }
}

/// Cost ceiling applied to scale-up targets
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostConstraints {
    pub cost_per_replica_hour: f64,
    pub max_hourly_cost: f64,
}

impl CostConstraints {
    /// Largest replica count that stays within budget
    pub fn max_affordable_replicas(&self) -> Option<u32> {
        if self.cost_per_replica_hour <= 0.0 {
            return None;
        }
        Some((self.max_hourly_cost / self.cost_per_replica_hour).floor().max(0.0) as u32)
    }
}

/// Post-scaling health limits
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SafetyThresholds {
    /// Highest acceptable error rate (0-1) after scaling
    pub max_error_rate: f64,
    /// Highest acceptable relative latency increase after scaling
    pub max_latency_regression: f64,
}

impl Default for SafetyThresholds {
    fn default() -> Self {
        Self {
            max_error_rate: 0.05,
            max_latency_regression: 0.5,
        }
    }
}

/// Named configuration bounding how and when a resource may be scaled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingPolicy {
    pub id: String,
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub min_replicas: u32,
    pub max_replicas: u32,
    #[serde(default = "default_target_metrics")]
    pub target_metrics: Vec<MetricKind>,
    pub scale_up: Threshold,
    pub scale_down: Threshold,
    #[serde(default)]
    pub cooldowns: Cooldowns,
    #[serde(default = "default_max_scale_up_step")]
    pub max_scale_up_step: u32,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    #[serde(default)]
    pub cost_constraints: Option<CostConstraints>,
    #[serde(default)]
    pub safety: SafetyThresholds,
}

fn default_enabled() -> bool {
    true
}

fn default_target_metrics() -> Vec<MetricKind> {
    vec![MetricKind::Cpu]
}

fn default_max_scale_up_step() -> u32 {
    2
}

fn default_confidence_threshold() -> f64 {
    0.8
}

impl ScalingPolicy {
    /// Policy with the stock thresholds (up at 80%, down at 30%)
    pub fn new(id: impl Into<String>, min_replicas: u32, max_replicas: u32) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            enabled: true,
            min_replicas,
            max_replicas,
            target_metrics: default_target_metrics(),
            scale_up: Threshold {
                value: 80.0,
                sustained_secs: 0,
            },
            scale_down: Threshold {
                value: 30.0,
                sustained_secs: 0,
            },
            cooldowns: Cooldowns::default(),
            max_scale_up_step: default_max_scale_up_step(),
            confidence_threshold: default_confidence_threshold(),
            cost_constraints: None,
            safety: SafetyThresholds::default(),
        }
    }

    pub fn scale_up_cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldowns.scale_up_secs)
    }

    pub fn scale_down_cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldowns.scale_down_secs)
    }

    pub fn clamp_replicas(&self, replicas: u32) -> u32 {
        replicas.clamp(self.min_replicas, self.max_replicas)
    }
}

/// Kind of scaling action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScalingActionKind {
    ScaleUp,
    ScaleDown,
    ScaleOut,
    ScaleIn,
    Restart,
}

impl fmt::Display for ScalingActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScalingActionKind::ScaleUp => "scale-up",
            ScalingActionKind::ScaleDown => "scale-down",
            ScalingActionKind::ScaleOut => "scale-out",
            ScalingActionKind::ScaleIn => "scale-in",
            ScalingActionKind::Restart => "restart",
        };
        f.write_str(s)
    }
}

/// Status of a scaling action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalingStatus {
    Pending,
    Executing,
    Completed,
    Failed,
    Cancelled,
}

impl ScalingStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScalingStatus::Completed | ScalingStatus::Failed | ScalingStatus::Cancelled
        )
    }
}

/// What caused a scaling action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalingTrigger {
    Scheduled,
    Manual,
    Threshold,
    Prediction,
    Alert,
}

/// Rolling update parameters passed to the infrastructure manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolloutStrategy {
    pub max_unavailable: u32,
    pub max_surge: u32,
}

impl Default for RolloutStrategy {
    fn default() -> Self {
        Self {
            max_unavailable: 1,
            max_surge: 1,
        }
    }
}

/// Desired replica transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSpec {
    pub from_replicas: u32,
    pub to_replicas: u32,
    pub strategy: RolloutStrategy,
}

/// Timing and rollback details of an executed scaling action
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionDetails {
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub rollback_required: bool,
}

/// A scaling action produced by the decision engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingAction {
    pub id: String,
    pub policy_id: String,
    pub action: ScalingActionKind,
    pub target_spec: TargetSpec,
    pub reasoning: Vec<String>,
    pub status: ScalingStatus,
    pub execution_details: ExecutionDetails,
    pub trigger: ScalingTrigger,
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
}

/// Generate a process-unique identifier with the given prefix
pub fn next_id(prefix: &str) -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{}-{}-{}", prefix, Utc::now().timestamp_millis(), seq)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_determine_component() {
        let params = ActionParams::Coordinator {
            concurrency_change_pct: 20.0,
        };
        assert_eq!(params.component(), Component::Coordinator);
        assert_eq!(
            ActionParams::Scaling { replica_delta: 1 }.component(),
            Component::Infrastructure
        );
    }

    #[test]
    fn test_params_serialize_tagged_by_component() {
        let params = ActionParams::Qa {
            quality_threshold_delta: 5.0,
        };
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["component"], "qa");
        assert_eq!(json["quality_threshold_delta"], 5.0);
    }

    #[test]
    fn test_degradation_respects_polarity() {
        let latency = MlPrediction {
            component: "coordinator".to_string(),
            metric: MetricKind::ResponseTime,
            current_value: 200.0,
            predicted_value: 260.0,
            confidence: 0.85,
            time_horizon_minutes: 5,
            factors: vec![],
        };
        assert_eq!(latency.degradation(), 60.0);

        let throughput = MlPrediction {
            metric: MetricKind::Throughput,
            current_value: 100.0,
            predicted_value: 85.0,
            ..latency
        };
        assert_eq!(throughput.degradation(), 15.0);
    }

    #[test]
    fn test_cost_constraints_affordable_replicas() {
        let cost = CostConstraints {
            cost_per_replica_hour: 0.5,
            max_hourly_cost: 3.2,
        };
        assert_eq!(cost.max_affordable_replicas(), Some(6));

        let free = CostConstraints {
            cost_per_replica_hour: 0.0,
            max_hourly_cost: 1.0,
        };
        assert_eq!(free.max_affordable_replicas(), None);
    }

    #[test]
    fn test_scaling_action_kind_serializes_kebab_case() {
        let json = serde_json::to_string(&ScalingActionKind::ScaleUp).unwrap();
        assert_eq!(json, "\"scale-up\"");
    }

    #[test]
    fn test_next_id_unique() {
        assert_ne!(next_id("opt"), next_id("opt"));
    }
}
