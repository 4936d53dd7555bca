//! Scaling decision state machine

use super::{InfraHealth, InfrastructureManager, PolicyRegistry};
use crate::error::{OptimizerError, OptimizerResult};
use crate::executor::ReplicaController;
use crate::health::{components, HealthRegistry};
use crate::history::{HistoryEntry, HistoryStore};
use crate::models::{
    next_id, ExecutionDetails, MetricKind, MlPrediction, RolloutStrategy, ScalingAction,
    ScalingActionKind, ScalingPolicy, ScalingStatus, ScalingTrigger, TargetSpec,
};
use crate::observability::{OptimizerMetrics, StructuredLogger};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info};

/// Where a policy currently is in its evaluation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnginePhase {
    #[default]
    Idle,
    Evaluating,
    Deciding,
    Executing,
    Validating,
    RollingBack,
}

/// Load observation a decision is based on
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoadSignal {
    pub metric: MetricKind,
    pub value: f64,
    pub confidence: f64,
    pub trigger: ScalingTrigger,
}

impl LoadSignal {
    pub fn from_prediction(prediction: &MlPrediction) -> Self {
        Self {
            metric: prediction.metric,
            value: prediction.predicted_value,
            confidence: prediction.confidence,
            trigger: ScalingTrigger::Prediction,
        }
    }

    /// A measured value is fully trusted
    pub fn observed(metric: MetricKind, value: f64) -> Self {
        Self {
            metric,
            value,
            confidence: 1.0,
            trigger: ScalingTrigger::Threshold,
        }
    }

    pub fn manual(metric: MetricKind, value: f64) -> Self {
        Self {
            trigger: ScalingTrigger::Manual,
            ..Self::observed(metric, value)
        }
    }
}

/// What the engine would do for a policy given a signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingDecision {
    pub policy_id: String,
    /// `None` when the decision is declined
    pub action: Option<ScalingActionKind>,
    pub current_replicas: u32,
    pub target_replicas: u32,
    pub signal: LoadSignal,
    pub reasoning: Vec<String>,
}

#[derive(Debug, Default)]
struct PolicyState {
    last_scale_up: Option<Instant>,
    last_scale_down: Option<Instant>,
    above_since: Option<Instant>,
    below_since: Option<Instant>,
}

impl PolicyState {
    /// Sustained windows as they would be after observing `value` at `now`
    fn windows_after(
        &self,
        policy: &ScalingPolicy,
        value: f64,
        now: Instant,
    ) -> (Option<Instant>, Option<Instant>) {
        if value > policy.scale_up.value {
            (Some(self.above_since.unwrap_or(now)), None)
        } else if value < policy.scale_down.value {
            (None, Some(self.below_since.unwrap_or(now)))
        } else {
            (None, None)
        }
    }

    fn observe(&mut self, policy: &ScalingPolicy, value: f64, now: Instant) {
        let (above, below) = self.windows_after(policy, value, now);
        self.above_since = above;
        self.below_since = below;
    }
}

fn propose(
    policy: &ScalingPolicy,
    state: &PolicyState,
    windows: (Option<Instant>, Option<Instant>),
    signal: LoadSignal,
    current: u32,
    now: Instant,
) -> ScalingDecision {
    let mut reasoning = Vec::new();
    let decline = |reasoning: Vec<String>| ScalingDecision {
        policy_id: policy.id.clone(),
        action: None,
        current_replicas: current,
        target_replicas: current,
        signal,
        reasoning,
    };

    if !policy.enabled {
        reasoning.push("policy is disabled".to_string());
        return decline(reasoning);
    }

    let (kind, threshold, since, last, cooldown) = if signal.value > policy.scale_up.value {
        (
            ScalingActionKind::ScaleUp,
            policy.scale_up,
            windows.0,
            state.last_scale_up,
            policy.scale_up_cooldown(),
        )
    } else if signal.value < policy.scale_down.value {
        (
            ScalingActionKind::ScaleDown,
            policy.scale_down,
            windows.1,
            state.last_scale_down,
            policy.scale_down_cooldown(),
        )
    } else {
        reasoning.push(format!(
            "{} {:.1} within thresholds [{:.1}, {:.1}]",
            signal.metric, signal.value, policy.scale_down.value, policy.scale_up.value
        ));
        return decline(reasoning);
    };

    reasoning.push(format!(
        "{} {:.1} crossed {} threshold {:.1}",
        signal.metric, signal.value, kind, threshold.value
    ));

    if signal.confidence < policy.confidence_threshold {
        reasoning.push(format!(
            "confidence {:.2} below required {:.2}",
            signal.confidence, policy.confidence_threshold
        ));
        return decline(reasoning);
    }

    let held = since.map(|s| now.duration_since(s)).unwrap_or_default();
    if held < threshold.sustained() {
        reasoning.push(format!(
            "threshold held for {}s of required {}s",
            held.as_secs(),
            threshold.sustained_secs
        ));
        return decline(reasoning);
    }

    if let Some(last) = last {
        let elapsed = now.duration_since(last);
        if elapsed < cooldown {
            reasoning.push(format!(
                "{} cooldown active, {}s remaining",
                kind,
                (cooldown - elapsed).as_secs()
            ));
            return decline(reasoning);
        }
    }

    let target = match kind {
        ScalingActionKind::ScaleUp => {
            if current >= policy.max_replicas {
                reasoning.push(format!("already at max_replicas {}", policy.max_replicas));
                return decline(reasoning);
            }
            let mut target = current
                .saturating_add(policy.max_scale_up_step)
                .min(policy.max_replicas);
            if let Some(affordable) = policy
                .cost_constraints
                .and_then(|c| c.max_affordable_replicas())
            {
                if affordable < target {
                    reasoning.push(format!("capped at {} replicas by cost ceiling", affordable));
                    target = affordable;
                }
            }
            target = policy.clamp_replicas(target);
            if target <= current {
                reasoning.push("no headroom left under cost ceiling".to_string());
                return decline(reasoning);
            }
            target
        }
        _ => {
            if current <= policy.min_replicas {
                reasoning.push(format!("already at min_replicas {}", policy.min_replicas));
                return decline(reasoning);
            }
            policy.clamp_replicas(current - 1)
        }
    };

    reasoning.push(format!("{} from {} to {} replicas", kind, current, target));
    ScalingDecision {
        policy_id: policy.id.clone(),
        action: Some(kind),
        current_replicas: current,
        target_replicas: target,
        signal,
        reasoning,
    }
}

/// Target for a requested replica move under every enabled policy
fn bounded_target(
    governing: &[(&ScalingPolicy, &PolicyState)],
    current: u32,
    delta: i32,
    now: Instant,
) -> OptimizerResult<u32> {
    if delta == 0 {
        return Ok(current);
    }
    let scale_up = delta > 0;
    let kind = if scale_up {
        ScalingActionKind::ScaleUp
    } else {
        ScalingActionKind::ScaleDown
    };
    let mut target = if scale_up {
        current.saturating_add(delta.unsigned_abs())
    } else {
        current.saturating_sub(delta.unsigned_abs())
    };
    if governing.is_empty() {
        return Ok(target.max(1));
    }

    for (policy, state) in governing {
        let refuse = |reason: String| {
            Err(OptimizerError::ScalingSafetyViolation {
                policy_id: policy.id.clone(),
                reason,
            })
        };

        let (last, cooldown) = if scale_up {
            (state.last_scale_up, policy.scale_up_cooldown())
        } else {
            (state.last_scale_down, policy.scale_down_cooldown())
        };
        if let Some(last) = last {
            let elapsed = now.duration_since(last);
            if elapsed < cooldown {
                return refuse(format!(
                    "{} cooldown active, {}s remaining",
                    kind,
                    (cooldown - elapsed).as_secs()
                ));
            }
        }

        if scale_up {
            target = target
                .min(current.saturating_add(policy.max_scale_up_step))
                .min(policy.max_replicas);
            if let Some(affordable) = policy
                .cost_constraints
                .and_then(|c| c.max_affordable_replicas())
            {
                target = target.min(affordable);
            }
            if target <= current {
                return refuse(format!(
                    "no headroom above {} replicas (max_replicas {})",
                    current, policy.max_replicas
                ));
            }
        } else {
            target = target
                .max(current.saturating_sub(1))
                .max(policy.min_replicas);
            if target >= current {
                return refuse(format!("already at min_replicas {}", policy.min_replicas));
            }
        }
    }

    Ok(target)
}

/// Auto-scaling decision engine
///
/// Evaluations of one policy are serialized; different policies evaluate
/// independently. Every replica change, policy-driven or requested by an
/// optimization action, holds the rollout lock from reading the current
/// count until the rollout settles. Cooldowns and sustained windows use the
/// monotonic clock.
pub struct DecisionEngine {
    infrastructure: Arc<dyn InfrastructureManager>,
    /// Acquired after any policy state lock
    rollout: Mutex<()>,
    policies: Arc<PolicyRegistry>,
    history: Arc<dyn HistoryStore>,
    states: DashMap<String, Arc<Mutex<PolicyState>>>,
    phases: DashMap<String, EnginePhase>,
    strategy: RolloutStrategy,
    health: HealthRegistry,
    metrics: OptimizerMetrics,
    logger: StructuredLogger,
}

impl DecisionEngine {
    pub fn new(
        infrastructure: Arc<dyn InfrastructureManager>,
        policies: Arc<PolicyRegistry>,
        history: Arc<dyn HistoryStore>,
        health: HealthRegistry,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            infrastructure,
            rollout: Mutex::new(()),
            policies,
            history,
            states: DashMap::new(),
            phases: DashMap::new(),
            strategy: RolloutStrategy::default(),
            health,
            metrics: OptimizerMetrics::new(),
            logger,
        }
    }

    pub fn policies(&self) -> &Arc<PolicyRegistry> {
        &self.policies
    }

    pub fn phase(&self, policy_id: &str) -> EnginePhase {
        self.phases
            .get(policy_id)
            .map(|p| *p)
            .unwrap_or_default()
    }

    /// Drop cooldown and window state for a deleted policy
    pub fn forget(&self, policy_id: &str) {
        self.states.remove(policy_id);
        self.phases.remove(policy_id);
    }

    fn state(&self, policy_id: &str) -> Arc<Mutex<PolicyState>> {
        self.states
            .entry(policy_id.to_string())
            .or_default()
            .clone()
    }

    fn set_phase(&self, policy_id: &str, phase: EnginePhase) {
        debug!(policy_id = %policy_id, phase = ?phase, "Scaling phase");
        self.phases.insert(policy_id.to_string(), phase);
    }

    async fn observed_replicas(&self) -> OptimizerResult<u32> {
        self.infrastructure
            .current_replicas()
            .await
            .map_err(|e| OptimizerError::Infrastructure(format!("{:#}", e)))
    }

    /// Dry run: what `evaluate` would decide right now, without side effects
    pub async fn decide(&self, policy_id: &str, signal: LoadSignal) -> OptimizerResult<ScalingDecision> {
        let policy = self.policies.get(policy_id).await?;
        let current = self.observed_replicas().await?;

        let state = self.state(policy_id);
        let state = state.lock().await;
        let now = Instant::now();
        let windows = state.windows_after(&policy, signal.value, now);

        Ok(propose(&policy, &state, windows, signal, current, now))
    }

    /// Full evaluation cycle for one policy
    ///
    /// Returns the executed action (completed, or failed after validation
    /// and rollback). A declined decision changes nothing and is returned as
    /// `ScalingSafetyViolation` carrying the reasoning.
    pub async fn evaluate(&self, policy_id: &str, signal: LoadSignal) -> OptimizerResult<ScalingAction> {
        let policy = self.policies.get(policy_id).await?;

        let state = self.state(policy_id);
        let mut state = state.lock().await;
        let _rollout = self.rollout.lock().await;
        self.set_phase(policy_id, EnginePhase::Evaluating);

        let current = match self.observed_replicas().await {
            Ok(current) => current,
            Err(e) => {
                self.set_phase(policy_id, EnginePhase::Idle);
                self.health
                    .set_degraded(components::SCALING, e.to_string())
                    .await;
                return Err(e);
            }
        };
        self.metrics.set_replicas(policy_id, current);

        let now = Instant::now();
        state.observe(&policy, signal.value, now);

        self.set_phase(policy_id, EnginePhase::Deciding);
        let windows = (state.above_since, state.below_since);
        let decision = propose(&policy, &state, windows, signal, current, now);

        let Some(kind) = decision.action else {
            self.set_phase(policy_id, EnginePhase::Idle);
            self.logger.log_scaling_declined(policy_id, &decision.reasoning);
            return Err(OptimizerError::ScalingSafetyViolation {
                policy_id: policy_id.to_string(),
                reason: decision.reasoning.join("; "),
            });
        };

        // The cooldown starts when the action starts, whatever its outcome
        match kind {
            ScalingActionKind::ScaleUp => state.last_scale_up = Some(now),
            _ => state.last_scale_down = Some(now),
        }

        let action = self.execute(&policy, decision, kind).await;
        self.set_phase(policy_id, EnginePhase::Idle);
        self.record(&action).await;

        Ok(action)
    }

    /// Replica change requested by an optimization action
    ///
    /// Bounded by every enabled policy: the move stays inside each replica
    /// range, never exceeds a scale-up step or cost ceiling, and is refused
    /// while any policy is cooling down in that direction. Starting the move
    /// arms that cooldown on each enabled policy.
    pub async fn adjust(&self, delta: i32) -> OptimizerResult<u32> {
        let mut policies: Vec<ScalingPolicy> = self
            .policies
            .list()
            .await
            .into_iter()
            .filter(|p| p.enabled)
            .collect();
        policies.sort_by(|a, b| a.id.cmp(&b.id));

        // Policy states in id order, then the rollout lock
        let states: Vec<_> = policies.iter().map(|p| self.state(&p.id)).collect();
        let mut guards = Vec::with_capacity(states.len());
        for state in &states {
            guards.push(state.lock().await);
        }
        let _rollout = self.rollout.lock().await;

        let current = self.observed_replicas().await?;
        let now = Instant::now();
        let target = {
            let governing: Vec<(&ScalingPolicy, &PolicyState)> =
                policies.iter().zip(guards.iter().map(|g| &**g)).collect();
            bounded_target(&governing, current, delta, now)
        };
        let target = match target {
            Ok(target) => target,
            Err(e) => {
                debug!(delta, current, reason = %e, "Replica adjustment refused");
                return Err(e);
            }
        };
        if target == current {
            return Ok(current);
        }

        for state in guards.iter_mut() {
            if target > current {
                state.last_scale_up = Some(now);
            } else {
                state.last_scale_down = Some(now);
            }
        }

        self.roll_to(target).await?;
        for policy in &policies {
            self.metrics.set_replicas(&policy.id, target);
        }
        info!(from = current, to = target, "Replicas adjusted by optimization action");
        Ok(target)
    }

    /// Return to a captured replica count; cooldowns are left as they are
    pub async fn restore(&self, replicas: u32) -> OptimizerResult<()> {
        let _rollout = self.rollout.lock().await;
        if self.observed_replicas().await? == replicas {
            return Ok(());
        }
        self.roll_to(replicas).await?;
        info!(replicas, "Replicas restored");
        Ok(())
    }

    async fn roll_to(&self, replicas: u32) -> OptimizerResult<()> {
        match self.infrastructure.apply_scaling(replicas, self.strategy).await {
            Ok(outcome) if outcome.success => Ok(()),
            Ok(outcome) => Err(OptimizerError::Infrastructure(format!(
                "rollout to {} replicas rejected: {}",
                replicas, outcome.message
            ))),
            Err(e) => Err(OptimizerError::Infrastructure(format!("{:#}", e))),
        }
    }

    async fn execute(
        &self,
        policy: &ScalingPolicy,
        decision: ScalingDecision,
        kind: ScalingActionKind,
    ) -> ScalingAction {
        let created_at = Utc::now();
        let mut action = ScalingAction {
            id: next_id("scale"),
            policy_id: policy.id.clone(),
            action: kind,
            target_spec: TargetSpec {
                from_replicas: decision.current_replicas,
                to_replicas: decision.target_replicas,
                strategy: self.strategy,
            },
            reasoning: decision.reasoning,
            status: ScalingStatus::Pending,
            execution_details: ExecutionDetails::default(),
            trigger: decision.signal.trigger,
            confidence: decision.signal.confidence,
            created_at,
        };

        self.set_phase(&policy.id, EnginePhase::Executing);
        action.status = ScalingStatus::Executing;
        action.execution_details.started_at = Some(Utc::now());

        let before = self.infrastructure.get_health().await.ok();

        let applied = match self
            .infrastructure
            .apply_scaling(action.target_spec.to_replicas, self.strategy)
            .await
        {
            Ok(outcome) if outcome.success => Ok(()),
            Ok(outcome) => Err(format!("infrastructure rejected scaling: {}", outcome.message)),
            Err(e) => Err(format!("scaling call failed: {:#}", e)),
        };

        match applied {
            Err(reason) => {
                action.reasoning.push(reason);
                action.status = ScalingStatus::Failed;
            }
            Ok(()) => {
                self.set_phase(&policy.id, EnginePhase::Validating);
                match self.validate(policy, before).await {
                    Ok(()) => {
                        action.status = ScalingStatus::Completed;
                        self.metrics
                            .set_replicas(&policy.id, action.target_spec.to_replicas);
                        self.health.set_healthy(components::SCALING).await;
                    }
                    Err(reason) => {
                        action.reasoning.push(format!("validation failed: {}", reason));
                        action.execution_details.rollback_required = true;
                        self.set_phase(&policy.id, EnginePhase::RollingBack);
                        self.roll_back(&mut action).await;
                        action.status = ScalingStatus::Failed;
                    }
                }
            }
        }

        action.execution_details.finished_at = Some(Utc::now());
        action
    }

    /// Compare post-scaling health against the policy's safety limits
    async fn validate(&self, policy: &ScalingPolicy, before: Option<InfraHealth>) -> Result<(), String> {
        let after = self
            .infrastructure
            .get_health()
            .await
            .map_err(|e| format!("post-scaling health unavailable: {:#}", e))?;

        if after.error_rate > policy.safety.max_error_rate {
            return Err(format!(
                "error rate {:.3} exceeds {:.3}",
                after.error_rate, policy.safety.max_error_rate
            ));
        }

        if let Some(before) = before {
            if before.latency_ms > 0.0 {
                let regression = (after.latency_ms - before.latency_ms) / before.latency_ms;
                if regression > policy.safety.max_latency_regression {
                    return Err(format!(
                        "latency regressed {:.0}% (limit {:.0}%)",
                        regression * 100.0,
                        policy.safety.max_latency_regression * 100.0
                    ));
                }
            }
        }

        Ok(())
    }

    async fn roll_back(&self, action: &mut ScalingAction) {
        let previous = action.target_spec.from_replicas;
        let result = match self.infrastructure.apply_scaling(previous, self.strategy).await {
            Ok(outcome) if outcome.success => Ok(()),
            Ok(outcome) => Err(outcome.message),
            Err(e) => Err(format!("{:#}", e)),
        };

        match result {
            Ok(()) => {
                action
                    .reasoning
                    .push(format!("rolled back to {} replicas", previous));
                self.metrics.set_replicas(&action.policy_id, previous);
            }
            Err(reason) => {
                let reason = format!("rollback to {} replicas failed: {}", previous, reason);
                self.logger
                    .log_rollback_escalation(&action.id, components::SCALING, &reason);
                self.health
                    .set_degraded(components::SCALING, reason.clone())
                    .await;
                action.reasoning.push(reason);
            }
        }
    }

    async fn record(&self, action: &ScalingAction) {
        self.metrics.record_scaling_action(action);
        self.logger.log_scaling_action(action);

        if let Err(e) = self
            .history
            .append(HistoryEntry::Scaling(action.clone()))
            .await
        {
            let err = OptimizerError::History(format!("{:#}", e));
            error!(action_id = %action.id, error = %err, "Failed to append scaling action");
            self.health
                .set_degraded(components::SCALING, err.to_string())
                .await;
        }
    }
}

#[async_trait]
impl ReplicaController for DecisionEngine {
    async fn current_replicas(&self) -> anyhow::Result<u32> {
        Ok(self.observed_replicas().await?)
    }

    async fn adjust_replicas(&self, delta: i32) -> anyhow::Result<u32> {
        Ok(self.adjust(delta).await?)
    }

    async fn restore_replicas(&self, replicas: u32) -> anyhow::Result<()> {
        Ok(self.restore(replicas).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::InMemoryHistoryStore;
    use crate::models::CostConstraints;
    use crate::scaling::InMemoryInfrastructure;
    use std::time::Duration;

    struct Fixture {
        engine: DecisionEngine,
        infra: Arc<InMemoryInfrastructure>,
        history: Arc<InMemoryHistoryStore>,
    }

    fn fixture(policy: ScalingPolicy, replicas: u32) -> Fixture {
        let infra = Arc::new(InMemoryInfrastructure::new(replicas));
        let history = Arc::new(InMemoryHistoryStore::new());
        let policies = Arc::new(PolicyRegistry::with_policies(vec![policy]).unwrap());
        let engine = DecisionEngine::new(
            infra.clone(),
            policies,
            history.clone(),
            HealthRegistry::new(),
            StructuredLogger::new("test"),
        );
        Fixture {
            engine,
            infra,
            history,
        }
    }

    fn web_policy() -> ScalingPolicy {
        let mut policy = ScalingPolicy::new("web", 2, 20);
        policy.cooldowns.scale_up_secs = 300;
        policy
    }

    fn predicted_cpu(value: f64, confidence: f64) -> LoadSignal {
        LoadSignal {
            metric: MetricKind::Cpu,
            value,
            confidence,
            trigger: ScalingTrigger::Prediction,
        }
    }

    fn declined_reason(result: OptimizerResult<ScalingAction>) -> String {
        match result {
            Err(OptimizerError::ScalingSafetyViolation { reason, .. }) => reason,
            other => panic!("expected a declined decision, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_predicted_load_scales_up_by_max_step() {
        let f = fixture(web_policy(), 5);

        let action = f
            .engine
            .evaluate("web", predicted_cpu(85.0, 0.9))
            .await
            .unwrap();

        assert_eq!(action.action, ScalingActionKind::ScaleUp);
        assert_eq!(action.status, ScalingStatus::Completed);
        assert_eq!(action.target_spec.from_replicas, 5);
        assert_eq!(action.target_spec.to_replicas, 7);
        assert_eq!(action.target_spec.strategy, RolloutStrategy::default());
        assert_eq!(action.trigger, ScalingTrigger::Prediction);
        assert!(!action.execution_details.rollback_required);
        assert_eq!(f.infra.current_replicas().await.unwrap(), 7);
        assert_eq!(f.history.len().await.unwrap(), 1);
        assert_eq!(f.engine.phase("web"), EnginePhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scale_up_cooldown() {
        let f = fixture(web_policy(), 5);

        f.engine.evaluate("web", predicted_cpu(85.0, 0.9)).await.unwrap();

        tokio::time::advance(Duration::from_secs(299)).await;
        let reason = declined_reason(f.engine.evaluate("web", predicted_cpu(90.0, 0.9)).await);
        assert!(reason.contains("cooldown"), "{}", reason);
        assert_eq!(f.infra.current_replicas().await.unwrap(), 7);

        tokio::time::advance(Duration::from_secs(1)).await;
        let action = f.engine.evaluate("web", predicted_cpu(90.0, 0.9)).await.unwrap();
        assert_eq!(action.target_spec.to_replicas, 9);
        assert_eq!(f.infra.applied().await, vec![7, 9]);
    }

    #[tokio::test]
    async fn test_low_confidence_declines_without_side_effects() {
        let f = fixture(web_policy(), 5);

        let reason = declined_reason(f.engine.evaluate("web", predicted_cpu(85.0, 0.5)).await);

        assert!(reason.contains("confidence"));
        assert!(f.infra.applied().await.is_empty());
        assert_eq!(f.history.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_targets_stay_within_bounds() {
        let f = fixture(web_policy(), 19);
        let action = f.engine.evaluate("web", predicted_cpu(95.0, 0.9)).await.unwrap();
        assert_eq!(action.target_spec.to_replicas, 20);

        let f = fixture(web_policy(), 20);
        let reason = declined_reason(f.engine.evaluate("web", predicted_cpu(95.0, 0.9)).await);
        assert!(reason.contains("max_replicas"));

        let f = fixture(web_policy(), 2);
        let reason = declined_reason(f.engine.evaluate("web", predicted_cpu(10.0, 0.9)).await);
        assert!(reason.contains("min_replicas"));
    }

    #[tokio::test]
    async fn test_scale_down_moves_one_replica() {
        let f = fixture(web_policy(), 6);

        let action = f
            .engine
            .evaluate("web", LoadSignal::observed(MetricKind::Cpu, 10.0))
            .await
            .unwrap();

        assert_eq!(action.action, ScalingActionKind::ScaleDown);
        assert_eq!(action.target_spec.to_replicas, 5);
        assert_eq!(action.trigger, ScalingTrigger::Threshold);
    }

    #[tokio::test]
    async fn test_cost_ceiling_caps_target() {
        let mut policy = web_policy();
        policy.cost_constraints = Some(CostConstraints {
            cost_per_replica_hour: 1.0,
            max_hourly_cost: 6.0,
        });
        let f = fixture(policy.clone(), 5);
        let action = f.engine.evaluate("web", predicted_cpu(85.0, 0.9)).await.unwrap();
        assert_eq!(action.target_spec.to_replicas, 6);

        let f = fixture(policy, 6);
        let reason = declined_reason(f.engine.evaluate("web", predicted_cpu(85.0, 0.9)).await);
        assert!(reason.contains("cost"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_threshold_must_be_sustained() {
        let mut policy = web_policy();
        policy.scale_up.sustained_secs = 60;
        let f = fixture(policy, 5);

        declined_reason(f.engine.evaluate("web", predicted_cpu(85.0, 0.9)).await);
        tokio::time::advance(Duration::from_secs(30)).await;
        declined_reason(f.engine.evaluate("web", predicted_cpu(85.0, 0.9)).await);

        // Dropping back inside the band resets the window
        tokio::time::advance(Duration::from_secs(10)).await;
        declined_reason(f.engine.evaluate("web", predicted_cpu(50.0, 0.9)).await);
        tokio::time::advance(Duration::from_secs(30)).await;
        declined_reason(f.engine.evaluate("web", predicted_cpu(85.0, 0.9)).await);

        tokio::time::advance(Duration::from_secs(60)).await;
        let action = f.engine.evaluate("web", predicted_cpu(85.0, 0.9)).await.unwrap();
        assert_eq!(action.target_spec.to_replicas, 7);
    }

    #[tokio::test]
    async fn test_failed_validation_rolls_back() {
        let f = fixture(web_policy(), 5);
        f.infra
            .script_health(vec![
                InfraHealth::default(),
                InfraHealth {
                    error_rate: 0.3,
                    ..Default::default()
                },
            ])
            .await;

        let action = f.engine.evaluate("web", predicted_cpu(85.0, 0.9)).await.unwrap();

        assert_eq!(action.status, ScalingStatus::Failed);
        assert!(action.execution_details.rollback_required);
        assert_eq!(f.infra.applied().await, vec![7, 5]);
        assert_eq!(f.infra.current_replicas().await.unwrap(), 5);
        assert_eq!(f.history.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_latency_regression_fails_validation() {
        let f = fixture(web_policy(), 5);
        f.infra
            .script_health(vec![
                InfraHealth::default(),
                InfraHealth {
                    latency_ms: 400.0,
                    ..Default::default()
                },
            ])
            .await;

        let action = f.engine.evaluate("web", predicted_cpu(85.0, 0.9)).await.unwrap();
        assert!(action.execution_details.rollback_required);
        assert!(action.reasoning.iter().any(|r| r.contains("latency")));
    }

    #[tokio::test]
    async fn test_rejected_rollout_fails_without_rollback() {
        let f = fixture(web_policy(), 5);
        f.infra.fail_next_applies(1).await;

        let action = f.engine.evaluate("web", predicted_cpu(85.0, 0.9)).await.unwrap();

        assert_eq!(action.status, ScalingStatus::Failed);
        assert!(!action.execution_details.rollback_required);
        assert_eq!(f.infra.current_replicas().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_decide_is_a_dry_run() {
        let f = fixture(web_policy(), 5);

        let decision = f.engine.decide("web", predicted_cpu(85.0, 0.9)).await.unwrap();
        assert_eq!(decision.action, Some(ScalingActionKind::ScaleUp));
        assert_eq!(decision.target_replicas, 7);
        assert!(f.infra.applied().await.is_empty());

        // No cooldown was started
        assert!(f.engine.evaluate("web", predicted_cpu(85.0, 0.9)).await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_and_disabled_policies() {
        let mut policy = web_policy();
        policy.enabled = false;
        let f = fixture(policy, 5);

        assert!(matches!(
            f.engine.evaluate("missing", predicted_cpu(85.0, 0.9)).await,
            Err(OptimizerError::PolicyNotFound(_))
        ));
        let reason = declined_reason(f.engine.evaluate("web", predicted_cpu(85.0, 0.9)).await);
        assert!(reason.contains("disabled"));
    }

    fn refusal(result: OptimizerResult<u32>) -> String {
        match result {
            Err(OptimizerError::ScalingSafetyViolation { reason, .. }) => reason,
            other => panic!("expected a refused adjustment, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_adjust_obeys_every_enabled_policy() {
        let f = fixture(web_policy(), 5);
        let mut api = ScalingPolicy::new("api", 1, 6);
        api.max_scale_up_step = 1;
        f.engine.policies().create(api).await.unwrap();

        assert_eq!(f.engine.adjust(3).await.unwrap(), 6);
        assert!(refusal(f.engine.adjust(1).await).contains("scale-up cooldown active"));
        assert_eq!(f.infra.applied().await, vec![6]);
    }

    #[tokio::test]
    async fn test_adjust_at_max_replicas_is_refused() {
        let f = fixture(ScalingPolicy::new("web", 2, 5), 5);

        assert!(refusal(f.engine.adjust(1).await).contains("no headroom"));
        assert!(f.infra.applied().await.is_empty());

        // A refusal arms no cooldown
        let decision = f.engine.decide("web", predicted_cpu(90.0, 0.9)).await.unwrap();
        assert!(decision.action.is_none());
        assert!(decision
            .reasoning
            .iter()
            .any(|r| r.contains("already at max_replicas 5")));
    }

    #[tokio::test]
    async fn test_adjust_down_moves_one_replica_to_min() {
        let f = fixture(web_policy(), 4);
        assert_eq!(f.engine.adjust(-3).await.unwrap(), 3);

        let f = fixture(web_policy(), 2);
        assert!(refusal(f.engine.adjust(-1).await).contains("min_replicas 2"));
    }

    #[tokio::test]
    async fn test_adjust_cooldown_blocks_policy_scale_up() {
        let f = fixture(web_policy(), 5);
        f.engine.adjust(1).await.unwrap();

        let reason = declined_reason(f.engine.evaluate("web", predicted_cpu(90.0, 0.9)).await);
        assert!(reason.contains("cooldown"));
        assert_eq!(f.infra.current_replicas().await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_restore_keeps_cooldown() {
        let f = fixture(web_policy(), 5);
        f.engine.adjust(1).await.unwrap();
        f.engine.restore(5).await.unwrap();
        // Already there, nothing to roll
        f.engine.restore(5).await.unwrap();

        assert_eq!(f.infra.applied().await, vec![6, 5]);
        assert!(refusal(f.engine.adjust(1).await).contains("cooldown"));
    }

    #[tokio::test]
    async fn test_adjust_without_enabled_policies_is_unbounded() {
        let mut policy = web_policy();
        policy.enabled = false;
        let f = fixture(policy, 5);

        assert_eq!(f.engine.adjust(30).await.unwrap(), 35);
        assert_eq!(f.engine.adjust(-40).await.unwrap(), 1);
    }
}
