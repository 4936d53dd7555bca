//! Feedback and learning loop
//!
//! Compares what was predicted against what actually happened, keeps the
//! comparisons as a training dataset and periodically retrains the model
//! in the background. Retraining never blocks the decision loops and at most
//! one run is in flight at a time.

mod trainer;

pub use trainer::{CalibratingTrainer, ModelTrainer, TrainedModel, MIN_CALIBRATION_FACTOR};

use crate::executor::RetrainingTrigger;
use crate::health::{components, HealthRegistry};
use crate::history::ActionRecord;
use crate::models::{ActionStatus, MetricKind, MlPrediction, PerformanceBaseline};
use crate::observability::{OptimizerMetrics, StructuredLogger};
use crate::supervisor::PeriodicJob;
use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// New records needed before a scheduled retraining
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Default retraining cadence
pub const DEFAULT_RETRAIN_INTERVAL_SECS: u64 = 60 * 60;

/// Records kept for training; oldest are evicted
pub const DATASET_CAPACITY: usize = 10_000;

/// Recent comparisons averaged into a metric's accuracy
pub const ACCURACY_WINDOW: usize = 20;

/// `1 - |predicted - actual| / |actual|`, clamped to [0, 1]
///
/// With no actual change the prediction is either exactly right or wrong.
pub fn prediction_accuracy(predicted: f64, actual: f64) -> f64 {
    if actual == 0.0 {
        return if predicted == 0.0 { 1.0 } else { 0.0 };
    }
    (1.0 - (predicted - actual).abs() / actual.abs()).clamp(0.0, 1.0)
}

/// Change of a metric expressed in the same convention as an action's
/// expected improvement: response time as a raw change, utilization as
/// relief, everything else as a raw change.
pub fn observed_improvement(metric: MetricKind, before: f64, after: f64) -> f64 {
    match metric {
        MetricKind::Cpu | MetricKind::Memory => before - after,
        MetricKind::ResponseTime | MetricKind::Throughput | MetricKind::Quality => after - before,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackSource {
    Optimization,
    Scaling,
}

/// One prediction-vs-outcome comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub source: FeedbackSource,
    pub metric: MetricKind,
    pub predicted_delta: f64,
    pub actual_delta: f64,
    pub accuracy: f64,
    pub timestamp: DateTime<Utc>,
}

/// Outcome waiting for a later measurement
#[derive(Debug, Clone)]
struct PendingOutcome {
    source: FeedbackSource,
    metric: MetricKind,
    predicted_delta: f64,
    before: f64,
    /// Samples ingested when the outcome was tracked
    samples: u64,
}

#[derive(Default)]
struct Dataset {
    records: VecDeque<FeedbackRecord>,
    /// Records added since the last retraining started
    untrained: usize,
}

pub struct FeedbackLoop {
    trainer: Arc<dyn ModelTrainer>,
    dataset: Arc<Mutex<Dataset>>,
    pending: Mutex<Vec<PendingOutcome>>,
    windows: Mutex<BTreeMap<MetricKind, VecDeque<f64>>>,
    batch_size: usize,
    in_flight: Mutex<Option<JoinHandle<()>>>,
    health: HealthRegistry,
    metrics: OptimizerMetrics,
    logger: StructuredLogger,
}

impl FeedbackLoop {
    pub fn new(
        trainer: Arc<dyn ModelTrainer>,
        health: HealthRegistry,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            trainer,
            dataset: Arc::new(Mutex::new(Dataset::default())),
            pending: Mutex::new(Vec::new()),
            windows: Mutex::new(BTreeMap::new()),
            batch_size: DEFAULT_BATCH_SIZE,
            in_flight: Mutex::new(None),
            health,
            metrics: OptimizerMetrics::new(),
            logger,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Record one comparison into the dataset
    pub async fn record(
        &self,
        source: FeedbackSource,
        metric: MetricKind,
        predicted_delta: f64,
        actual_delta: f64,
    ) -> FeedbackRecord {
        let accuracy = prediction_accuracy(predicted_delta, actual_delta);
        let record = FeedbackRecord {
            source,
            metric,
            predicted_delta,
            actual_delta,
            accuracy,
            timestamp: Utc::now(),
        };

        {
            let mut dataset = self.dataset.lock().await;
            if dataset.records.len() == DATASET_CAPACITY {
                dataset.records.pop_front();
            }
            dataset.records.push_back(record.clone());
            dataset.untrained += 1;
        }

        let mean = {
            let mut windows = self.windows.lock().await;
            let window = windows.entry(metric).or_default();
            if window.len() == ACCURACY_WINDOW {
                window.pop_front();
            }
            window.push_back(accuracy);
            window.iter().sum::<f64>() / window.len() as f64
        };

        self.metrics.set_prediction_accuracy(metric.as_str(), mean);
        self.logger
            .log_prediction_accuracy(metric.as_str(), predicted_delta, actual_delta, accuracy);

        record
    }

    /// Remember a completed action so its effect is measured once a newer
    /// sample than `samples` has been collected
    pub async fn track_action(&self, record: &ActionRecord, before: f64, samples: u64) {
        if record.status != ActionStatus::Completed {
            return;
        }
        self.pending.lock().await.push(PendingOutcome {
            source: FeedbackSource::Optimization,
            metric: record.action.target_metric,
            predicted_delta: record.action.expected_improvement,
            before,
            samples,
        });
    }

    /// Remember a forecast so it can be checked against the next measurement
    pub async fn track_prediction(
        &self,
        source: FeedbackSource,
        prediction: &MlPrediction,
        samples: u64,
    ) {
        self.pending.lock().await.push(PendingOutcome {
            source,
            metric: prediction.metric,
            predicted_delta: prediction.predicted_value - prediction.current_value,
            before: prediction.current_value,
            samples,
        });
    }

    /// Resolve every pending outcome whose metric the baseline measures
    ///
    /// `samples` is the ingested sample count the baseline was computed at;
    /// outcomes tracked at that count or later stay pending.
    pub async fn resolve_pending(
        &self,
        baseline: &PerformanceBaseline,
        samples: u64,
    ) -> Vec<FeedbackRecord> {
        let ready: Vec<(PendingOutcome, f64)> = {
            let mut pending = self.pending.lock().await;
            let mut ready = Vec::new();
            pending.retain(|p| match baseline.current(p.metric) {
                Some(now) if samples > p.samples => {
                    ready.push((p.clone(), now));
                    false
                }
                _ => true,
            });
            ready
        };

        let mut resolved = Vec::with_capacity(ready.len());
        for (outcome, now) in ready {
            let actual = match outcome.source {
                FeedbackSource::Optimization => {
                    observed_improvement(outcome.metric, outcome.before, now)
                }
                FeedbackSource::Scaling => now - outcome.before,
            };
            resolved.push(
                self.record(outcome.source, outcome.metric, outcome.predicted_delta, actual)
                    .await,
            );
        }

        if !resolved.is_empty() {
            debug!(resolved = resolved.len(), "Resolved pending feedback");
        }
        resolved
    }

    pub async fn pending_len(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Rolling mean accuracy per metric
    pub async fn mean_accuracy(&self) -> Vec<(MetricKind, f64)> {
        self.windows
            .lock()
            .await
            .iter()
            .filter(|(_, w)| !w.is_empty())
            .map(|(metric, w)| (*metric, w.iter().sum::<f64>() / w.len() as f64))
            .collect()
    }

    pub async fn dataset_len(&self) -> usize {
        self.dataset.lock().await.records.len()
    }

    /// Most recent records, oldest first
    pub async fn recent(&self, limit: usize) -> Vec<FeedbackRecord> {
        let dataset = self.dataset.lock().await;
        let skip = dataset.records.len().saturating_sub(limit);
        dataset.records.iter().skip(skip).cloned().collect()
    }

    pub async fn retraining_in_flight(&self) -> bool {
        self.in_flight
            .lock()
            .await
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Start a retraining run if a full batch of new records is available
    pub async fn maybe_retrain(&self) -> Result<bool> {
        self.start_retraining(false).await
    }

    /// Spawn a retraining run over the whole dataset
    ///
    /// Returns `false` without starting anything when a run is already in
    /// flight, or when `force` is off and fewer than a batch of new records
    /// has arrived.
    pub async fn start_retraining(&self, force: bool) -> Result<bool> {
        let mut in_flight = self.in_flight.lock().await;
        if in_flight.as_ref().map(|h| !h.is_finished()).unwrap_or(false) {
            debug!("Retraining already in flight");
            return Ok(false);
        }

        let (snapshot, consumed) = {
            let mut dataset = self.dataset.lock().await;
            if !force && dataset.untrained < self.batch_size {
                return Ok(false);
            }
            if dataset.records.is_empty() {
                bail!("no feedback collected yet");
            }
            let consumed = std::mem::take(&mut dataset.untrained);
            (dataset.records.iter().cloned().collect::<Vec<_>>(), consumed)
        };

        info!(samples = snapshot.len(), force, "Starting model retraining");

        let trainer = self.trainer.clone();
        let dataset = self.dataset.clone();
        let health = self.health.clone();
        let metrics = self.metrics.clone();
        let logger = self.logger.clone();
        let samples = snapshot.len();

        *in_flight = Some(tokio::spawn(async move {
            match trainer.train(snapshot).await {
                Ok(model) => {
                    metrics.inc_retraining_runs();
                    logger.log_retraining(&model.version, model.samples, true);
                    health.set_healthy(components::FEEDBACK).await;
                }
                Err(e) => {
                    warn!(error = %e, "Model retraining failed");
                    logger.log_retraining("", samples, false);
                    // Make the records count towards the next batch again
                    dataset.lock().await.untrained += consumed;
                    health
                        .set_degraded(components::FEEDBACK, format!("retraining failed: {:#}", e))
                        .await;
                }
            }
        }));

        Ok(true)
    }

    /// Wait for the in-flight retraining run, if any
    pub async fn wait_for_retraining(&self) {
        let handle = self.in_flight.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "Retraining task panicked");
                }
            }
        }
    }

    /// Abort the in-flight retraining run, if any
    pub async fn abort_retraining(&self) {
        if let Some(handle) = self.in_flight.lock().await.take() {
            if !handle.is_finished() {
                info!("Aborting in-flight retraining");
                handle.abort();
            }
        }
    }
}

#[async_trait]
impl PeriodicJob for FeedbackLoop {
    fn name(&self) -> &'static str {
        components::FEEDBACK
    }

    async fn run_once(&self) {
        if let Err(e) = self.maybe_retrain().await {
            warn!(error = %e, "Scheduled retraining not started");
        }
    }

    async fn on_shutdown(&self) {
        self.abort_retraining().await;
    }
}

#[async_trait]
impl RetrainingTrigger for FeedbackLoop {
    async fn request_retraining(&self, metric: MetricKind) -> Result<()> {
        info!(metric = %metric, "Retraining requested");
        // A run already in flight covers the request
        self.start_retraining(true).await.map(|_| ())
    }
}
