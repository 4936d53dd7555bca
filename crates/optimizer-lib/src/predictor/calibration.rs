//! Confidence calibration published by the model trainer

use crate::models::MetricKind;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

/// Version reported before the first retraining
pub const INITIAL_MODEL_VERSION: &str = "baseline";

/// Per-metric confidence multipliers, shared between the predictor
/// (reader) and the trainer (writer)
#[derive(Debug)]
pub struct Calibration {
    inner: RwLock<CalibrationState>,
}

#[derive(Debug, Clone)]
struct CalibrationState {
    factors: HashMap<MetricKind, f64>,
    model_version: String,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            inner: RwLock::new(CalibrationState {
                factors: HashMap::new(),
                model_version: INITIAL_MODEL_VERSION.to_string(),
            }),
        }
    }
}

impl Calibration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Multiplier for a metric; 1.0 until a trainer publishes one
    pub fn factor(&self, metric: MetricKind) -> f64 {
        self.inner
            .read()
            .map(|state| state.factors.get(&metric).copied().unwrap_or(1.0))
            .unwrap_or(1.0)
    }

    pub fn model_version(&self) -> String {
        self.inner
            .read()
            .map(|state| state.model_version.clone())
            .unwrap_or_else(|_| INITIAL_MODEL_VERSION.to_string())
    }

    /// Replace all factors atomically with a new model version
    pub fn publish(&self, factors: HashMap<MetricKind, f64>, model_version: String) {
        let clamped: HashMap<MetricKind, f64> = factors
            .into_iter()
            .map(|(metric, f)| (metric, f.clamp(0.0, 1.0)))
            .collect();

        if let Ok(mut state) = self.inner.write() {
            debug!(version = %model_version, factors = ?clamped, "Calibration published");
            state.factors = clamped;
            state.model_version = model_version;
        }
    }

    pub fn snapshot(&self) -> HashMap<MetricKind, f64> {
        self.inner
            .read()
            .map(|state| state.factors.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_unit_factor() {
        let calibration = Calibration::new();
        assert_eq!(calibration.factor(MetricKind::Cpu), 1.0);
        assert_eq!(calibration.model_version(), INITIAL_MODEL_VERSION);
    }

    #[test]
    fn test_publish_replaces_and_clamps() {
        let calibration = Calibration::new();
        let mut factors = HashMap::new();
        factors.insert(MetricKind::Cpu, 0.6);
        factors.insert(MetricKind::Memory, 1.4);
        calibration.publish(factors, "v-abc".to_string());

        assert_eq!(calibration.factor(MetricKind::Cpu), 0.6);
        assert_eq!(calibration.factor(MetricKind::Memory), 1.0);
        assert_eq!(calibration.factor(MetricKind::Quality), 1.0);
        assert_eq!(calibration.model_version(), "v-abc");
    }
}
