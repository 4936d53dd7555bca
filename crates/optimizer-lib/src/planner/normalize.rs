//! Benefit normalization for plan ordering
//!
//! Expected improvements carry the sign of the metric change they predict,
//! so a latency reduction is negative. The plan is sorted on a normalized
//! value chosen per action type.

use crate::models::{ActionType, OptimizationAction};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How an expected improvement maps onto the sort key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    #[default]
    Identity,
    Negate,
    Magnitude,
}

impl Normalization {
    pub fn apply(self, value: f64) -> f64 {
        match self {
            Normalization::Identity => value,
            Normalization::Negate => -value,
            Normalization::Magnitude => value.abs(),
        }
    }
}

/// Named starting point for the normalization table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizationPreset {
    /// Raw signed ordering
    #[default]
    Identity,
    /// Parameter adjustments ranked by magnitude
    BenefitOriented,
}

/// Normalization settings as loaded from configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizationConfig {
    pub preset: NormalizationPreset,
    pub overrides: HashMap<ActionType, Normalization>,
}

/// Normalization per action type; unlisted types use identity
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizationTable {
    by_type: HashMap<ActionType, Normalization>,
}

impl NormalizationTable {
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn benefit_oriented() -> Self {
        Self::identity().with(ActionType::ParameterAdjustment, Normalization::Magnitude)
    }

    pub fn from_config(config: &NormalizationConfig) -> Self {
        let mut table = match config.preset {
            NormalizationPreset::Identity => Self::identity(),
            NormalizationPreset::BenefitOriented => Self::benefit_oriented(),
        };
        for (&action_type, &normalization) in &config.overrides {
            table.by_type.insert(action_type, normalization);
        }
        table
    }

    pub fn with(mut self, action_type: ActionType, normalization: Normalization) -> Self {
        self.by_type.insert(action_type, normalization);
        self
    }

    pub fn get(&self, action_type: ActionType) -> Normalization {
        self.by_type.get(&action_type).copied().unwrap_or_default()
    }

    /// Sort key of an action
    pub fn normalize(&self, action: &OptimizationAction) -> f64 {
        self.get(action.action_type).apply(action.expected_improvement)
    }
}
