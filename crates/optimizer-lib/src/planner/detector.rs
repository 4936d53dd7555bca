//! Rule-based opportunity detection
//!
//! Each rule inspects the analysis diff independently and may emit one
//! candidate action.

use crate::analyzer::Analysis;
use crate::models::{
    ActionParams, ActionType, MetricKind, OptimizationAction, ResourceTrend, Risk,
};

/// Response time increase (ms) between samples that triggers a concurrency bump
pub const RESPONSE_TIME_JUMP_MS: f64 = 50.0;

/// Quality drop (points) between samples that triggers a stricter QA threshold
pub const QUALITY_DROP: f64 = 5.0;

/// Concurrency increase applied to the coordinator, in percent
pub const CONCURRENCY_STEP_PCT: f64 = 20.0;

/// Amount the QA threshold is raised by
pub const QUALITY_THRESHOLD_STEP: f64 = 5.0;

/// Scan an analysis diff for candidate actions
pub fn detect_opportunities(analysis: &Analysis) -> Vec<OptimizationAction> {
    let mut candidates = Vec::new();

    if analysis.response_time_change > RESPONSE_TIME_JUMP_MS {
        candidates.push(OptimizationAction::new(
            ActionType::ParameterAdjustment,
            ActionParams::Coordinator {
                concurrency_change_pct: CONCURRENCY_STEP_PCT,
            },
            -30.0,
            Risk::Low,
            MetricKind::ResponseTime,
        ));
    }

    if analysis.throughput_change < 0.0 {
        candidates.push(OptimizationAction::new(
            ActionType::LoadBalancing,
            ActionParams::LoadBalancer { auto_balance: true },
            25.0,
            Risk::Low,
            MetricKind::Throughput,
        ));
    }

    if analysis.resource_trend == ResourceTrend::Increasing {
        candidates.push(OptimizationAction::new(
            ActionType::ResourceScaling,
            ActionParams::Scaling { replica_delta: 1 },
            20.0,
            Risk::Medium,
            MetricKind::Cpu,
        ));
    }

    if analysis.quality_change < -QUALITY_DROP {
        candidates.push(OptimizationAction::new(
            ActionType::ParameterAdjustment,
            ActionParams::Qa {
                quality_threshold_delta: QUALITY_THRESHOLD_STEP,
            },
            15.0,
            Risk::Low,
            MetricKind::Quality,
        ));
    }

    candidates
}
