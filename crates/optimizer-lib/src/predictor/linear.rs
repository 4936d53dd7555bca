//! Linear extrapolation predictor
//!
//! Projects the recent slope one step forward. Confidence comes from a
//! fixed per-metric constant that stands in for a trained model's score,
//! scaled by the trainer's calibration.

use super::{Calibration, LoadPredictor, MIN_TRAINING_SAMPLES};
use crate::error::{OptimizerError, OptimizerResult};
use crate::models::{MetricKind, MetricSample, MlPrediction};
use std::sync::Arc;

/// Samples the slope is computed over
pub const PREDICTION_WINDOW: usize = 5;

/// Horizon reported for every forecast
pub const DEFAULT_HORIZON_MINUTES: u32 = 5;

/// Uncalibrated confidence per metric
pub fn base_confidence(metric: MetricKind) -> f64 {
    match metric {
        MetricKind::ResponseTime => 0.85,
        MetricKind::Throughput => 0.78,
        MetricKind::Quality => 0.92,
        MetricKind::Cpu => 0.80,
        MetricKind::Memory => 0.80,
    }
}

/// Slope between the first and last value, divided by the sample count
pub fn window_slope(values: &[f64]) -> f64 {
    match (values.first(), values.last()) {
        (Some(first), Some(last)) if !values.is_empty() => (last - first) / values.len() as f64,
        _ => 0.0,
    }
}

/// Default load predictor
pub struct LinearPredictor {
    calibration: Arc<Calibration>,
    min_samples: usize,
    window: usize,
}

impl LinearPredictor {
    pub fn new(calibration: Arc<Calibration>) -> Self {
        Self {
            calibration,
            min_samples: MIN_TRAINING_SAMPLES,
            window: PREDICTION_WINDOW,
        }
    }

    pub fn with_min_samples(mut self, min_samples: usize) -> Self {
        self.min_samples = min_samples.max(1);
        self
    }
}

impl LoadPredictor for LinearPredictor {
    fn predict(
        &self,
        component: &str,
        metric: MetricKind,
        window: &[MetricSample],
    ) -> OptimizerResult<MlPrediction> {
        if window.len() < self.min_samples {
            return Err(OptimizerError::PredictionUnavailable {
                metric,
                have: window.len(),
                needed: self.min_samples,
            });
        }

        let skip = window.len().saturating_sub(self.window);
        let values: Vec<f64> = window[skip..].iter().map(|s| metric.value(s)).collect();

        let current = values.last().copied().unwrap_or_default();
        let slope = window_slope(&values);
        let confidence =
            (base_confidence(metric) * self.calibration.factor(metric)).clamp(0.0, 1.0);

        let direction = if slope > 0.0 {
            "rising"
        } else if slope < 0.0 {
            "falling"
        } else {
            "flat"
        };

        Ok(MlPrediction {
            component: component.to_string(),
            metric,
            current_value: current,
            predicted_value: current + slope,
            confidence,
            time_horizon_minutes: DEFAULT_HORIZON_MINUTES,
            factors: vec![
                "linear_extrapolation".to_string(),
                format!("trend_{}", direction),
                format!("window_{}", values.len()),
            ],
        })
    }

    fn model_version(&self) -> String {
        self.calibration.model_version()
    }
}
