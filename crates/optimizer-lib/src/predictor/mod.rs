//! Load prediction
//!
//! Forecasts near-future metric values with a confidence score. The
//! contract is pluggable; the default implementation extrapolates the
//! recent linear trend.

mod calibration;
mod linear;

pub use calibration::{Calibration, INITIAL_MODEL_VERSION};
pub use linear::{
    base_confidence, window_slope, LinearPredictor, DEFAULT_HORIZON_MINUTES, PREDICTION_WINDOW,
};

use crate::error::OptimizerResult;
use crate::models::{MetricKind, MetricSample, MlPrediction};

/// Minimum accumulated training samples before forecasting
pub const MIN_TRAINING_SAMPLES: usize = 10;

/// Trait for load prediction implementations
pub trait LoadPredictor: Send + Sync {
    /// Forecast `metric` for `component` from the training window, oldest first
    fn predict(
        &self,
        component: &str,
        metric: MetricKind,
        window: &[MetricSample],
    ) -> OptimizerResult<MlPrediction>;

    /// Version of the model currently backing predictions
    fn model_version(&self) -> String;
}
