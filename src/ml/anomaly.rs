//! Anomaly classification of telemetry records
//!
//! Incomplete records are never flagged: if the feature vector cannot be
//! built the record is reported as an inlier with a missing-feature
//! diagnostic.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::error::{MlError, Result};
use super::features::{FeatureExtractor, Record};
use super::models::AnomalyModel;
use super::training::TrainedModel;

/// Default decision threshold on the [0, 1] anomaly score
pub const DEFAULT_THRESHOLD: f64 = 0.5;

/// Classification of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Inlier,
    Outlier,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Inlier => "inlier",
            Label::Outlier => "outlier",
        }
    }

    /// Legacy numeric code: 1 for inliers, -1 for outliers
    pub fn code(&self) -> i8 {
        match self {
            Label::Inlier => 1,
            Label::Outlier => -1,
        }
    }
}

/// Result of classifying one record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub label: Label,
    /// Anomaly score; absent when features were missing
    pub score: Option<f64>,
    /// First required field that was missing or unusable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_feature: Option<String>,
}

impl Prediction {
    fn fail_open(field: String) -> Self {
        Self {
            label: Label::Inlier,
            score: None,
            missing_feature: Some(field),
        }
    }

    pub fn is_outlier(&self) -> bool {
        self.label == Label::Outlier
    }
}

/// Classify a record against `model`.
///
/// `Outlier` iff the score is strictly above `threshold`. A threshold
/// outside [0, 1] (including NaN) is not rejected here, but is logged;
/// a NaN threshold labels every record `Inlier`. `PredictionService::new`
/// validates the threshold once up front.
pub fn predict<M: AnomalyModel + ?Sized>(model: &M, record: &Record, threshold: f64) -> Prediction {
    let node_id = record
        .get("node_id")
        .and_then(Value::as_str)
        .unwrap_or("unknown");

    if !(0.0..=1.0).contains(&threshold) {
        warn!(node_id, threshold, "Prediction threshold is outside [0, 1]");
    }

    let vector = match FeatureExtractor::new().build(record) {
        Ok(vector) => vector,
        Err(e) => {
            warn!(node_id, "Missing required features for anomaly prediction: {}", e);
            let field = match e {
                MlError::InvalidFeatureVector { field, .. } => field.to_string(),
                other => other.to_string(),
            };
            return Prediction::fail_open(field);
        }
    };

    let score = model.score(&vector);
    let label = if score > threshold {
        Label::Outlier
    } else {
        Label::Inlier
    };
    debug!(
        node_id,
        model = model.name(),
        score,
        label = label.as_str(),
        "Scored record"
    );

    Prediction {
        label,
        score: Some(score),
        missing_feature: None,
    }
}

/// Counters kept by a `PredictionService`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PredictionStats {
    pub predictions: u64,
    pub outliers: u64,
    pub missing_features: u64,
}

/// Shared, thread-safe entry point for classifying records
#[derive(Debug)]
pub struct PredictionService {
    model: Arc<TrainedModel>,
    threshold: f64,
    predictions: AtomicU64,
    outliers: AtomicU64,
    missing_features: AtomicU64,
}

impl PredictionService {
    pub fn new(model: Arc<TrainedModel>, threshold: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(MlError::Config(format!(
                "threshold must be in [0, 1], got {}",
                threshold
            )));
        }
        Ok(Self::with_threshold(model, threshold))
    }

    /// Service with `DEFAULT_THRESHOLD`
    pub fn with_default_threshold(model: Arc<TrainedModel>) -> Self {
        Self::with_threshold(model, DEFAULT_THRESHOLD)
    }

    fn with_threshold(model: Arc<TrainedModel>, threshold: f64) -> Self {
        Self {
            model,
            threshold,
            predictions: AtomicU64::new(0),
            outliers: AtomicU64::new(0),
            missing_features: AtomicU64::new(0),
        }
    }

    pub fn predict(&self, record: &Record) -> Prediction {
        let prediction = predict(self.model.as_ref(), record, self.threshold);

        self.predictions.fetch_add(1, Ordering::Relaxed);
        if prediction.is_outlier() {
            self.outliers.fetch_add(1, Ordering::Relaxed);
        }
        if prediction.missing_feature.is_some() {
            self.missing_features.fetch_add(1, Ordering::Relaxed);
        }
        prediction
    }

    pub fn predict_batch(&self, records: &[Record]) -> Vec<Prediction> {
        records.iter().map(|r| self.predict(r)).collect()
    }

    pub fn model(&self) -> &Arc<TrainedModel> {
        &self.model
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn stats(&self) -> PredictionStats {
        PredictionStats {
            predictions: self.predictions.load(Ordering::Relaxed),
            outliers: self.outliers.load(Ordering::Relaxed),
            missing_features: self.missing_features.load(Ordering::Relaxed),
        }
    }
}
