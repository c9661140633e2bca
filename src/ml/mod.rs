//! Anomaly Detection Engine
//!
//! Isolation-forest anomaly detection for environmental telemetry.
//!
//! # Features
//! - Feature extraction from sensor records (latitude, longitude, temperature, humidity)
//! - Seeded, reproducible isolation forest training
//! - Atomic model persistence with a train-or-load lifecycle
//! - Fail-open classification of incomplete records
//!
//! # Example
//! ```ignore
//! use wildguard::ml::{obtain_model, predict, ModelConfig};
//!
//! let config = ModelConfig::default();
//! let model = obtain_model(Some(&records), "isolation_forest_model.bin", &config)?;
//!
//! let prediction = predict(&model, &record, config.threshold);
//! if prediction.is_outlier() {
//!     println!("Anomalous reading, score {:?}", prediction.score);
//! }
//! ```

pub mod anomaly;
pub mod dataset;
pub mod error;
pub mod features;
pub mod models;
pub mod storage;
pub mod training;

pub use anomaly::{
    predict, Label, Prediction, PredictionService, PredictionStats, DEFAULT_THRESHOLD,
};
pub use dataset::{load_records, parse_record, parse_records};
pub use error::{MlError, Result};
pub use features::{
    FeatureExtractor, FeatureVector, Record, SensorReading, FEATURE_NAMES, NUM_FEATURES,
};
pub use models::{AnomalyModel, IsolationForest, ModelConfig};
pub use storage::{ArtifactInfo, ModelStore, DEFAULT_MODEL_PATH};
pub use training::{obtain_model, ModelLifecycle, ModelOrigin, TrainedModel, TrainingData};
