//! Model training and the train-or-load lifecycle
//!
//! `ModelLifecycle::obtain` always hands back a usable model: the persisted
//! one if present, otherwise one trained on the supplied records, otherwise a
//! fallback grown on a single sentinel reading.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::error::{MlError, Result};
use super::features::{FeatureExtractor, FeatureVector, Record};
use super::models::{AnomalyModel, IsolationForest, ModelConfig};
use super::storage::ModelStore;

/// Sentinel reading the fallback model is grown on
pub const FALLBACK_POINT: [f64; 4] = [0.0, 0.0, 25.0, 50.0];

/// Training data collection
#[derive(Debug, Clone, Default)]
pub struct TrainingData {
    /// Valid feature vectors, in input order
    samples: Vec<FeatureVector>,
    /// Records dropped because a required field was unusable
    rejected: usize,
}

impl TrainingData {
    /// Extract training vectors from raw records, dropping invalid ones
    pub fn from_records(records: &[Record]) -> Self {
        let (samples, rejected) = FeatureExtractor::new().build_all(records);
        if rejected > 0 {
            warn!(
                "Dropped {} of {} training records with missing or invalid features",
                rejected,
                records.len()
            );
        }
        Self { samples, rejected }
    }

    pub fn from_vectors(samples: Vec<FeatureVector>) -> Self {
        Self {
            samples,
            rejected: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn rejected(&self) -> usize {
        self.rejected
    }

    pub fn samples(&self) -> &[FeatureVector] {
        &self.samples
    }
}

/// How a model came to be
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelOrigin {
    /// Trained on supplied telemetry
    Trained,
    /// Grown on the sentinel point because no usable data was available
    Fallback,
}

impl ModelOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelOrigin::Trained => "trained",
            ModelOrigin::Fallback => "fallback",
        }
    }
}

/// Trained model bundle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    /// Isolation forest model
    pub forest: IsolationForest,
    /// Whether this is a real or a fallback model
    pub origin: ModelOrigin,
    /// Training timestamp
    pub trained_at: DateTime<Utc>,
    /// Number of samples used
    pub sample_count: u64,
    /// Crate version that trained the model
    pub version: String,
}

impl TrainedModel {
    /// Train on collected data. Fails with `InsufficientData` when empty.
    pub fn train(data: &TrainingData, config: &ModelConfig) -> Result<Self> {
        let forest = IsolationForest::train(data.samples(), config)?;
        Ok(Self::wrap(forest, ModelOrigin::Trained, data.len()))
    }

    /// Grow the degenerate single-point model
    pub fn fallback(config: &ModelConfig) -> Result<Self> {
        let point = FeatureVector::new(FALLBACK_POINT)?;
        let forest = IsolationForest::train(&[point], config)?;
        Ok(Self::wrap(forest, ModelOrigin::Fallback, 1))
    }

    fn wrap(forest: IsolationForest, origin: ModelOrigin, sample_count: usize) -> Self {
        Self {
            forest,
            origin,
            trained_at: Utc::now(),
            sample_count: sample_count as u64,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.origin == ModelOrigin::Fallback
    }
}

impl AnomalyModel for TrainedModel {
    fn score(&self, sample: &FeatureVector) -> f64 {
        self.forest.score(sample)
    }

    fn name(&self) -> &str {
        "IsolationForest"
    }
}

/// Train-or-load policy bound to one artifact location
#[derive(Debug, Clone)]
pub struct ModelLifecycle {
    config: ModelConfig,
    store: ModelStore,
}

impl ModelLifecycle {
    pub fn new(config: ModelConfig, store: ModelStore) -> Self {
        Self { config, store }
    }

    pub fn with_path<P: AsRef<Path>>(config: ModelConfig, path: P) -> Self {
        Self::new(config, ModelStore::new(path))
    }

    pub fn store(&self) -> &ModelStore {
        &self.store
    }

    /// Load the persisted model, or train and persist one.
    ///
    /// An existing artifact always wins, even when records are supplied. A
    /// corrupt artifact is returned as `ArtifactCorrupt` rather than being
    /// silently replaced.
    pub fn obtain(&self, dataset: Option<&[Record]>) -> Result<TrainedModel> {
        if let Some(model) = self.store.load()? {
            debug!("Using persisted {} model", model.origin.as_str());
            return Ok(model);
        }

        let model = self.build(dataset)?;
        self.store.save(&model)?;
        Ok(model)
    }

    /// Train a fresh model and atomically replace the persisted one.
    ///
    /// The previous artifact, corrupt or not, stays in place until the new
    /// model has been written.
    pub fn retrain(&self, dataset: Option<&[Record]>) -> Result<TrainedModel> {
        let model = self.build(dataset)?;
        self.store.save(&model)?;
        Ok(model)
    }

    /// Train on `dataset`, or grow the fallback model if nothing usable is left
    fn build(&self, dataset: Option<&[Record]>) -> Result<TrainedModel> {
        let data = dataset.map(TrainingData::from_records).unwrap_or_default();

        match TrainedModel::train(&data, &self.config) {
            Ok(model) => {
                info!(
                    "Trained new model: {} samples, {} trees",
                    model.sample_count,
                    model.forest.num_trees()
                );
                Ok(model)
            }
            Err(MlError::InsufficientData) => {
                if dataset.is_some() {
                    warn!("Not enough valid data to train, creating fallback model");
                } else {
                    info!("No training data provided, creating fallback model");
                }
                TrainedModel::fallback(&self.config)
            }
            Err(e) => Err(e),
        }
    }
}

/// One-shot train-or-load against `location`
pub fn obtain_model<P: AsRef<Path>>(
    dataset: Option<&[Record]>,
    location: P,
    config: &ModelConfig,
) -> Result<TrainedModel> {
    ModelLifecycle::with_path(config.clone(), location).obtain(dataset)
}
