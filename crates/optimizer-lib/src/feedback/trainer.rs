//! Model retraining

use super::FeedbackRecord;
use crate::models::MetricKind;
use crate::predictor::Calibration;
use anyhow::{bail, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Floor for published confidence multipliers
pub const MIN_CALIBRATION_FACTOR: f64 = 0.1;

/// Result of one retraining run
#[derive(Debug, Clone, PartialEq)]
pub struct TrainedModel {
    pub version: String,
    pub factors: HashMap<MetricKind, f64>,
    pub samples: usize,
}

/// Trains a new model from accumulated feedback
#[async_trait]
pub trait ModelTrainer: Send + Sync {
    async fn train(&self, dataset: Vec<FeedbackRecord>) -> Result<TrainedModel>;
}

/// Derives confidence calibration from observed prediction accuracy
///
/// Each metric's factor is its mean accuracy over the dataset, floored at
/// `MIN_CALIBRATION_FACTOR`. The model version is a SHA-256 fingerprint of
/// the published factors and dataset size.
pub struct CalibratingTrainer {
    calibration: Arc<Calibration>,
}

impl CalibratingTrainer {
    pub fn new(calibration: Arc<Calibration>) -> Self {
        Self { calibration }
    }
}

fn fingerprint(factors: &BTreeMap<MetricKind, f64>, samples: usize) -> String {
    let mut hasher = Sha256::new();
    for (metric, factor) in factors {
        hasher.update(metric.as_str().as_bytes());
        hasher.update(factor.to_be_bytes());
    }
    hasher.update((samples as u64).to_be_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("cal-{}", &digest[..12])
}

#[async_trait]
impl ModelTrainer for CalibratingTrainer {
    async fn train(&self, dataset: Vec<FeedbackRecord>) -> Result<TrainedModel> {
        if dataset.is_empty() {
            bail!("no feedback records to train on");
        }

        let mut sums: BTreeMap<MetricKind, (f64, usize)> = BTreeMap::new();
        for record in &dataset {
            let entry = sums.entry(record.metric).or_insert((0.0, 0));
            entry.0 += record.accuracy;
            entry.1 += 1;
        }

        let factors: BTreeMap<MetricKind, f64> = sums
            .into_iter()
            .map(|(metric, (sum, n))| {
                let mean = sum / n as f64;
                (metric, mean.clamp(MIN_CALIBRATION_FACTOR, 1.0))
            })
            .collect();

        let version = fingerprint(&factors, dataset.len());
        let factors: HashMap<MetricKind, f64> = factors.into_iter().collect();
        self.calibration.publish(factors.clone(), version.clone());

        Ok(TrainedModel {
            version,
            factors,
            samples: dataset.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::FeedbackSource;
    use chrono::Utc;

    fn record(metric: MetricKind, accuracy: f64) -> FeedbackRecord {
        FeedbackRecord {
            source: FeedbackSource::Scaling,
            metric,
            predicted_delta: 0.0,
            actual_delta: 0.0,
            accuracy,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_publishes_mean_accuracy() {
        let calibration = Arc::new(Calibration::new());
        let trainer = CalibratingTrainer::new(calibration.clone());

        let model = trainer
            .train(vec![
                record(MetricKind::Cpu, 0.6),
                record(MetricKind::Cpu, 0.8),
                record(MetricKind::Memory, 0.0),
            ])
            .await
            .unwrap();

        assert_eq!(model.samples, 3);
        assert!((calibration.factor(MetricKind::Cpu) - 0.7).abs() < 1e-9);
        assert_eq!(calibration.factor(MetricKind::Memory), MIN_CALIBRATION_FACTOR);
        assert_eq!(calibration.factor(MetricKind::Quality), 1.0);
        assert_eq!(calibration.model_version(), model.version);
        assert!(model.version.starts_with("cal-"));
    }

    #[tokio::test]
    async fn test_version_is_deterministic() {
        let a = CalibratingTrainer::new(Arc::new(Calibration::new()));
        let b = CalibratingTrainer::new(Arc::new(Calibration::new()));
        let data = vec![record(MetricKind::Cpu, 0.9)];

        let va = a.train(data.clone()).await.unwrap().version;
        let vb = b.train(data).await.unwrap().version;
        assert_eq!(va, vb);

        let vc = a
            .train(vec![record(MetricKind::Cpu, 0.5)])
            .await
            .unwrap()
            .version;
        assert_ne!(va, vc);
    }

    #[tokio::test]
    async fn test_empty_dataset_rejected() {
        let trainer = CalibratingTrainer::new(Arc::new(Calibration::new()));
        assert!(trainer.train(Vec::new()).await.is_err());
    }
}
