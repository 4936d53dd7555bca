//! Error taxonomy for the optimization and scaling loops

use crate::models::{Component, MetricKind};
use thiserror::Error;

/// Errors surfaced by the optimizer
#[derive(Debug, Error)]
pub enum OptimizerError {
    /// A metrics fetch failed; the tick is skipped and retried next cadence
    #[error("transient metrics error: {0}")]
    TransientMetrics(String),

    /// An action failed while executing
    #[error("action {action_id} on {component} failed: {reason}")]
    ActionExecution {
        action_id: String,
        component: Component,
        reason: String,
    },

    /// Undoing a failed action failed; needs an operator
    #[error("rollback of action {action_id} failed: {reason}")]
    Rollback { action_id: String, reason: String },

    /// Not enough training samples to forecast
    #[error("prediction unavailable for {metric}: have {have} training samples, need {needed}")]
    PredictionUnavailable {
        metric: MetricKind,
        have: usize,
        needed: usize,
    },

    /// The decision engine declined to act
    #[error("scaling declined for policy {policy_id}: {reason}")]
    ScalingSafetyViolation { policy_id: String, reason: String },

    #[error("scaling policy '{0}' not found")]
    PolicyNotFound(String),

    #[error("invalid scaling policy: {0}")]
    InvalidPolicy(String),

    #[error("history store error: {0}")]
    History(String),

    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl OptimizerError {
    /// Whether an operator should be alerted
    pub fn requires_escalation(&self) -> bool {
        matches!(self, OptimizerError::Rollback { .. })
    }
}

pub type OptimizerResult<T> = std::result::Result<T, OptimizerError>;
