//! Adaptive optimization and auto-scaling control loop
//!
//! This crate provides the core functionality for:
//! - Metrics collection into a bounded history
//! - Trend analysis, load prediction and optimization planning
//! - Action execution with rollback
//! - Safety-gated auto-scaling
//! - Feedback-driven model retraining
//! - Health checks and observability

pub mod analyzer;
pub mod collector;
pub mod error;
pub mod executor;
pub mod feedback;
pub mod health;
pub mod history;
pub mod http;
pub mod models;
pub mod observability;
pub mod optimizer;
pub mod planner;
pub mod predictor;
pub mod scaling;
pub mod supervisor;

pub use error::{OptimizerError, OptimizerResult};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{OptimizerMetrics, StructuredLogger};
pub use optimizer::{
    AdaptiveOptimizer, Collaborators, CycleReport, CycleTrigger, OptimizationMetrics,
    OptimizerSettings, ScalingEvaluation,
};
