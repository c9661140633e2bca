//! wildguard: anomaly detection for wildlife and environmental sensor telemetry

pub mod config;
pub mod ml;

pub use config::Config;
pub use ml::{
    obtain_model, predict, Label, MlError, ModelConfig, ModelLifecycle, ModelStore, Prediction,
    PredictionService, Record, TrainedModel,
};
