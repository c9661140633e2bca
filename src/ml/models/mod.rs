//! ML Models for anomaly detection
//!
//! Provides the model seam and the isolation forest implementation.

pub mod isolation_forest;

pub use isolation_forest::{average_path_length, IsolationForest, IsolationNode, IsolationTree};

use serde::{Deserialize, Serialize};

use super::error::{MlError, Result};
use super::features::FeatureVector;

/// Trait for trained anomaly detection models
pub trait AnomalyModel: Send + Sync {
    /// Score a sample (higher = more anomalous), in [0, 1]
    fn score(&self, sample: &FeatureVector) -> f64;

    /// Predict if a sample is anomalous under `threshold`
    fn predict(&self, sample: &FeatureVector, threshold: f64) -> bool {
        self.score(sample) > threshold
    }

    /// Get model name
    fn name(&self) -> &str;
}

/// Model configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Number of trees in the ensemble
    pub num_trees: usize,
    /// Sample size for each tree
    pub sample_size: usize,
    /// Random seed for reproducibility
    pub seed: u64,
    /// Anomaly threshold (scores above this are outliers)
    pub threshold: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            num_trees: 100,
            sample_size: 256,
            seed: 42,
            threshold: 0.5,
        }
    }
}

impl ModelConfig {
    pub fn with_trees(mut self, num_trees: usize) -> Self {
        self.num_trees = num_trees;
        self
    }

    pub fn with_sample_size(mut self, sample_size: usize) -> Self {
        self.sample_size = sample_size;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Check parameters are usable for training and prediction
    pub fn validate(&self) -> Result<()> {
        if self.num_trees == 0 {
            return Err(MlError::Config("num_trees must be > 0".to_string()));
        }
        if self.sample_size == 0 {
            return Err(MlError::Config("sample_size must be > 0".to_string()));
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(MlError::Config(format!(
                "threshold must be in [0, 1], got {}",
                self.threshold
            )));
        }
        Ok(())
    }
}
