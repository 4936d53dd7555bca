//! Plan assembly: merge, filter, order

use super::detector::{detect_opportunities, CONCURRENCY_STEP_PCT, QUALITY_THRESHOLD_STEP};
use super::normalize::NormalizationTable;
use crate::analyzer::Analysis;
use crate::models::{
    ActionParams, ActionType, CandidateOrigin, Component, MetricKind, MlPrediction,
    OptimizationAction, Risk,
};
use std::cmp::Ordering;
use tracing::debug;

/// Confidence a prediction must exceed to produce a candidate
pub const PREDICTION_CONFIDENCE_THRESHOLD: f64 = 0.7;

/// Mean prediction accuracy below which retraining is planned
pub const RETRAIN_ACCURACY_THRESHOLD: f64 = 0.5;

/// Cache size change applied when memory is forecast to degrade, in percent
pub const CACHE_SHRINK_PCT: f64 = -20.0;

/// Predicted degradation a metric must exceed to act on
pub fn degradation_threshold(metric: MetricKind) -> f64 {
    match metric {
        MetricKind::ResponseTime => 50.0,
        _ => 10.0,
    }
}

/// Component that acts on a forecast for `metric`
pub fn component_for(metric: MetricKind) -> Component {
    match metric {
        MetricKind::ResponseTime => Component::Coordinator,
        MetricKind::Throughput => Component::LoadBalancer,
        MetricKind::Quality => Component::Qa,
        MetricKind::Cpu => Component::Infrastructure,
        MetricKind::Memory => Component::Cache,
    }
}

/// Map a confident, significant forecast onto a corrective action
pub fn predictive_candidate(prediction: &MlPrediction) -> Option<OptimizationAction> {
    if prediction.confidence <= PREDICTION_CONFIDENCE_THRESHOLD {
        return None;
    }
    let degradation = prediction.degradation();
    if degradation <= degradation_threshold(prediction.metric) {
        return None;
    }

    let (action_type, params, expected, risk) = match prediction.metric {
        MetricKind::ResponseTime => (
            ActionType::ParameterAdjustment,
            ActionParams::Coordinator {
                concurrency_change_pct: CONCURRENCY_STEP_PCT,
            },
            -degradation,
            Risk::Low,
        ),
        MetricKind::Throughput => (
            ActionType::LoadBalancing,
            ActionParams::LoadBalancer { auto_balance: true },
            degradation,
            Risk::Low,
        ),
        MetricKind::Quality => (
            ActionType::ParameterAdjustment,
            ActionParams::Qa {
                quality_threshold_delta: QUALITY_THRESHOLD_STEP,
            },
            degradation,
            Risk::Low,
        ),
        MetricKind::Cpu => (
            ActionType::ResourceScaling,
            ActionParams::Scaling { replica_delta: 1 },
            degradation,
            Risk::Medium,
        ),
        MetricKind::Memory => (
            ActionType::CacheOptimization,
            ActionParams::Cache {
                size_change_pct: CACHE_SHRINK_PCT,
            },
            degradation,
            Risk::Low,
        ),
    };

    Some(
        OptimizationAction::new(action_type, params, expected, risk, prediction.metric)
            .with_origin(CandidateOrigin::Prediction),
    )
}

/// Retraining candidate for a metric whose forecasts have been poor
pub fn retraining_candidate(metric: MetricKind, mean_accuracy: f64) -> OptimizationAction {
    OptimizationAction::new(
        ActionType::MlTraining,
        ActionParams::Model { metric },
        (1.0 - mean_accuracy.clamp(0.0, 1.0)) * 10.0,
        Risk::Low,
        metric,
    )
}

/// Inputs to one planning pass
#[derive(Debug, Default, Clone)]
pub struct PlanInputs<'a> {
    pub analysis: Option<&'a Analysis>,
    pub predictions: &'a [MlPrediction],
    /// Mean prediction accuracy per metric from the feedback loop
    pub accuracy: &'a [(MetricKind, f64)],
}

/// Builds ordered optimization plans
#[derive(Debug, Clone, Default)]
pub struct OptimizationPlanner {
    normalization: NormalizationTable,
}

impl OptimizationPlanner {
    pub fn new(normalization: NormalizationTable) -> Self {
        Self { normalization }
    }

    pub fn normalization(&self) -> &NormalizationTable {
        &self.normalization
    }

    /// Merge rule-based and predictive candidates into an ordered plan
    pub fn plan(&self, inputs: PlanInputs<'_>) -> Vec<OptimizationAction> {
        let mut candidates = inputs
            .analysis
            .map(detect_opportunities)
            .unwrap_or_default();
        let rule_count = candidates.len();

        for prediction in inputs.predictions {
            if let Some(candidate) = predictive_candidate(prediction) {
                self.merge(&mut candidates, candidate);
            }
        }

        for &(metric, accuracy) in inputs.accuracy {
            if accuracy < RETRAIN_ACCURACY_THRESHOLD {
                self.merge(&mut candidates, retraining_candidate(metric, accuracy));
            }
        }

        self.order(&mut candidates);

        debug!(
            rule_candidates = rule_count,
            planned = candidates.len(),
            "Optimization plan built"
        );

        candidates
    }

    /// Sort descending by normalized expected improvement, stable on ties
    pub fn order(&self, actions: &mut [OptimizationAction]) {
        actions.sort_by(|a, b| {
            let ka = self.normalization.normalize(a);
            let kb = self.normalization.normalize(b);
            kb.partial_cmp(&ka).unwrap_or(Ordering::Equal)
        });
    }

    /// Keep one candidate per (type, component), preferring the larger benefit
    fn merge(&self, candidates: &mut Vec<OptimizationAction>, candidate: OptimizationAction) {
        let existing = candidates.iter_mut().find(|c| {
            c.action_type == candidate.action_type
                && c.component() == candidate.component()
                && c.target_metric == candidate.target_metric
        });

        match existing {
            Some(current) => {
                if self.normalization.normalize(&candidate).abs()
                    > self.normalization.normalize(current).abs()
                {
                    *current = candidate;
                }
            }
            None => candidates.push(candidate),
        }
    }
}

/// Restrict a plan to actions on one component
pub fn filter_component(
    plan: Vec<OptimizationAction>,
    component: Option<Component>,
) -> Vec<OptimizationAction> {
    match component {
        Some(component) => plan
            .into_iter()
            .filter(|a| a.component() == component)
            .collect(),
        None => plan,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResourceTrend;

    fn action(action_type: ActionType, params: ActionParams, expected: f64) -> OptimizationAction {
        OptimizationAction::new(action_type, params, expected, Risk::Low, MetricKind::Cpu)
    }

    fn prediction(metric: MetricKind, current: f64, predicted: f64, confidence: f64) -> MlPrediction {
        MlPrediction {
            component: component_for(metric).to_string(),
            metric,
            current_value: current,
            predicted_value: predicted,
            confidence,
            time_horizon_minutes: 5,
            factors: vec![],
        }
    }

    #[test]
    fn test_identity_order_is_raw_descending() {
        let planner = OptimizationPlanner::default();
        let mut plan = vec![
            action(ActionType::LoadBalancing, ActionParams::LoadBalancer { auto_balance: true }, 5.0),
            action(ActionType::ResourceScaling, ActionParams::Scaling { replica_delta: 1 }, 30.0),
            action(
                ActionType::CacheOptimization,
                ActionParams::Cache { size_change_pct: -20.0 },
                -10.0,
            ),
        ];

        planner.order(&mut plan);
        let order: Vec<f64> = plan.iter().map(|a| a.expected_improvement).collect();
        assert_eq!(order, vec![30.0, 5.0, -10.0]);
    }

    #[test]
    fn test_identity_puts_latency_reduction_last() {
        let analysis = Analysis {
            response_time_change: 70.0,
            throughput_change: -5.0,
            quality_change: 0.0,
            resource_trend: ResourceTrend::Increasing,
        };
        let planner = OptimizationPlanner::default();
        let plan = planner.plan(PlanInputs {
            analysis: Some(&analysis),
            ..Default::default()
        });

        let order: Vec<f64> = plan.iter().map(|a| a.expected_improvement).collect();
        assert_eq!(order, vec![25.0, 20.0, -30.0]);
    }

    #[test]
    fn test_benefit_oriented_ranks_latency_reduction_first() {
        let analysis = Analysis {
            response_time_change: 70.0,
            throughput_change: -5.0,
            quality_change: 0.0,
            resource_trend: ResourceTrend::Increasing,
        };
        let planner = OptimizationPlanner::new(NormalizationTable::benefit_oriented());
        let plan = planner.plan(PlanInputs {
            analysis: Some(&analysis),
            ..Default::default()
        });

        let components: Vec<Component> = plan.iter().map(|a| a.component()).collect();
        assert_eq!(
            components,
            vec![
                Component::Coordinator,
                Component::LoadBalancer,
                Component::Infrastructure,
            ]
        );
    }

    #[test]
    fn test_predictive_candidates_need_confidence_and_degradation() {
        // Confidence at the threshold is not enough
        assert!(predictive_candidate(&prediction(MetricKind::Cpu, 70.0, 90.0, 0.7)).is_none());
        // Degradation at the threshold is not enough
        assert!(predictive_candidate(&prediction(MetricKind::Cpu, 70.0, 80.0, 0.9)).is_none());
        // Response time uses the larger threshold
        assert!(
            predictive_candidate(&prediction(MetricKind::ResponseTime, 200.0, 240.0, 0.85))
                .is_none()
        );

        let latency =
            predictive_candidate(&prediction(MetricKind::ResponseTime, 200.0, 260.0, 0.85))
                .unwrap();
        assert_eq!(latency.component(), Component::Coordinator);
        assert_eq!(latency.expected_improvement, -60.0);
        assert_eq!(latency.origin, CandidateOrigin::Prediction);

        let memory =
            predictive_candidate(&prediction(MetricKind::Memory, 60.0, 75.0, 0.8)).unwrap();
        assert_eq!(memory.action_type, ActionType::CacheOptimization);
        assert_eq!(memory.expected_improvement, 15.0);
    }

    #[test]
    fn test_falling_throughput_forecast_balances_load() {
        let candidate =
            predictive_candidate(&prediction(MetricKind::Throughput, 100.0, 80.0, 0.78)).unwrap();
        assert_eq!(candidate.action_type, ActionType::LoadBalancing);
        assert_eq!(candidate.expected_improvement, 20.0);
    }

    #[test]
    fn test_merge_deduplicates_rule_and_prediction() {
        let analysis = Analysis {
            response_time_change: 0.0,
            throughput_change: 0.0,
            quality_change: 0.0,
            resource_trend: ResourceTrend::Increasing,
        };
        let predictions = vec![prediction(MetricKind::Cpu, 70.0, 95.0, 0.8)];

        let plan = OptimizationPlanner::default().plan(PlanInputs {
            analysis: Some(&analysis),
            predictions: &predictions,
            accuracy: &[],
        });

        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].expected_improvement, 25.0);
        assert_eq!(plan[0].origin, CandidateOrigin::Prediction);
    }

    #[test]
    fn test_low_accuracy_plans_retraining() {
        let accuracy = vec![(MetricKind::Cpu, 0.3), (MetricKind::Memory, 0.9)];
        let plan = OptimizationPlanner::default().plan(PlanInputs {
            accuracy: &accuracy,
            ..Default::default()
        });

        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].action_type, ActionType::MlTraining);
        assert_eq!(plan[0].params, ActionParams::Model { metric: MetricKind::Cpu });
        assert!(plan[0].rollback_data.is_none());
    }

    #[test]
    fn test_filter_component() {
        let plan = vec![
            action(ActionType::LoadBalancing, ActionParams::LoadBalancer { auto_balance: true }, 5.0),
            action(ActionType::ResourceScaling, ActionParams::Scaling { replica_delta: 1 }, 30.0),
        ];

        let filtered = filter_component(plan.clone(), Some(Component::Infrastructure));
        assert_eq!(filtered.len(), 1);
        assert_eq!(filter_component(plan, None).len(), 2);
    }
}
