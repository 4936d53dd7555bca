//! Opportunity detection and optimization planning

mod detector;
mod normalize;
mod plan;

pub use detector::{
    detect_opportunities, CONCURRENCY_STEP_PCT, QUALITY_DROP, QUALITY_THRESHOLD_STEP,
    RESPONSE_TIME_JUMP_MS,
};
pub use normalize::{Normalization, NormalizationConfig, NormalizationPreset, NormalizationTable};
pub use plan::{
    component_for, degradation_threshold, filter_component, predictive_candidate,
    retraining_candidate, OptimizationPlanner, PlanInputs, CACHE_SHRINK_PCT,
    PREDICTION_CONFIDENCE_THRESHOLD, RETRAIN_ACCURACY_THRESHOLD,
};
