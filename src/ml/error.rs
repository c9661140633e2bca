use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MlError {
    #[error("invalid feature vector: field '{field}' {reason}")]
    InvalidFeatureVector { field: &'static str, reason: &'static str },

    #[error("insufficient data: no valid feature vectors to train on")]
    InsufficientData,

    #[error("model artifact not found at {}", path.display())]
    ArtifactNotFound { path: PathBuf },

    #[error("model artifact at {} is corrupt: {reason}", path.display())]
    ArtifactCorrupt { path: PathBuf, reason: String },

    #[error("io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("config error: {0}")]
    Config(String),
}

impl MlError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MlError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, MlError>;
