//! Model Storage and Persistence
//!
//! Saves and loads a trained model as a single opaque artifact file. Writes
//! go to a sibling temp file which is then renamed over the target, so a
//! concurrent reader sees either the old artifact or the new one, never a
//! partial write.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::error::{MlError, Result};
use super::training::{ModelOrigin, TrainedModel};

/// Leading bytes of every artifact file
pub const ARTIFACT_MAGIC: &[u8; 8] = b"WGFOREST";

/// Version of the storage format
pub const ARTIFACT_VERSION: u32 = 1;

/// Default artifact location, relative to the working directory
pub const DEFAULT_MODEL_PATH: &str = "isolation_forest_model.bin";

/// Upper bound on bytes the decoder will claim for one artifact
const MAX_ARTIFACT_BYTES: usize = 1 << 30;

/// Distinguishes temp files written by concurrent saves in one process
static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// On-disk envelope around a trained model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    /// Version of the storage format
    pub version: u32,
    /// When the artifact was written
    pub saved_at: DateTime<Utc>,
    /// Host that wrote the artifact
    pub host_id: String,
    /// The model itself
    pub model: TrainedModel,
}

/// Borrowing twin of `ModelArtifact`, so saving does not clone the forest.
/// Serializes to the same bytes.
#[derive(Serialize)]
struct ArtifactRef<'a> {
    version: u32,
    saved_at: DateTime<Utc>,
    host_id: String,
    model: &'a TrainedModel,
}

impl<'a> ArtifactRef<'a> {
    fn new(model: &'a TrainedModel) -> Self {
        Self {
            version: ARTIFACT_VERSION,
            saved_at: Utc::now(),
            host_id: hostname::get()
                .map(|h| h.to_string_lossy().to_string())
                .unwrap_or_else(|_| "unknown".to_string()),
            model,
        }
    }

    fn encode(&self) -> std::result::Result<Vec<u8>, String> {
        let payload = bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| e.to_string())?;
        let mut bytes = Vec::with_capacity(ARTIFACT_MAGIC.len() + payload.len());
        bytes.extend_from_slice(ARTIFACT_MAGIC);
        bytes.extend_from_slice(&payload);
        Ok(bytes)
    }
}

impl ModelArtifact {
    fn decode(bytes: &[u8]) -> std::result::Result<Self, String> {
        let payload = bytes
            .strip_prefix(ARTIFACT_MAGIC.as_slice())
            .ok_or_else(|| "missing artifact header".to_string())?;

        let (artifact, read): (Self, usize) =
            bincode::serde::decode_from_slice(
                payload,
                bincode::config::standard().with_limit::<MAX_ARTIFACT_BYTES>(),
            )
            .map_err(|e| e.to_string())?;

        if read != payload.len() {
            return Err(format!("{} trailing bytes", payload.len() - read));
        }
        if artifact.version != ARTIFACT_VERSION {
            return Err(format!(
                "unsupported format version {} (expected {})",
                artifact.version, ARTIFACT_VERSION
            ));
        }
        artifact.model.forest.validate()?;
        Ok(artifact)
    }
}

/// Summary of a stored artifact
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactInfo {
    pub path: PathBuf,
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub host_id: String,
    pub origin: ModelOrigin,
    pub trained_at: DateTime<Utc>,
    pub sample_count: u64,
    pub num_trees: usize,
    pub sample_size: usize,
    pub size_bytes: u64,
}

/// Single-artifact model store
#[derive(Debug, Clone)]
pub struct ModelStore {
    path: PathBuf,
}

impl ModelStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Canonical artifact location
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Persist a model, atomically replacing any existing artifact
    pub fn save(&self, model: &TrainedModel) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| MlError::io(parent, e))?;
            }
        }

        let bytes = ArtifactRef::new(model)
            .encode()
            .map_err(|reason| {
                MlError::io(&self.path, std::io::Error::new(ErrorKind::InvalidData, reason))
            })?;

        let tmp_path = self.tmp_path();
        if let Err(e) = write_synced(&tmp_path, &bytes) {
            let _ = fs::remove_file(&tmp_path);
            return Err(MlError::io(&tmp_path, e));
        }
        if let Err(e) = fs::rename(&tmp_path, &self.path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(MlError::io(&self.path, e));
        }

        info!(
            "Saved model ({} trees, {} samples) to {:?}",
            model.forest.num_trees(),
            model.sample_count,
            self.path
        );
        Ok(())
    }

    /// Load the model. `Ok(None)` means there is no artifact yet.
    pub fn load(&self) -> Result<Option<TrainedModel>> {
        Ok(self.load_artifact()?.map(|(artifact, _)| artifact.model))
    }

    /// Load the model, treating a missing artifact as an error
    pub fn load_required(&self) -> Result<TrainedModel> {
        self.load()?.ok_or_else(|| MlError::ArtifactNotFound {
            path: self.path.clone(),
        })
    }

    /// Artifact metadata, if an artifact exists
    pub fn info(&self) -> Result<Option<ArtifactInfo>> {
        Ok(self.load_artifact()?.map(|(artifact, size)| ArtifactInfo {
            path: self.path.clone(),
            version: artifact.version,
            saved_at: artifact.saved_at,
            host_id: artifact.host_id,
            origin: artifact.model.origin,
            trained_at: artifact.model.trained_at,
            sample_count: artifact.model.sample_count,
            num_trees: artifact.model.forest.num_trees(),
            sample_size: artifact.model.forest.sample_size(),
            size_bytes: size as u64,
        }))
    }

    /// Delete the artifact. Returns whether one existed.
    pub fn remove(&self) -> Result<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!("Removed model artifact {:?}", self.path);
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(MlError::io(&self.path, e)),
        }
    }

    fn load_artifact(&self) -> Result<Option<(ModelArtifact, usize)>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No model artifact found at {:?}", self.path);
                return Ok(None);
            }
            Err(e) => return Err(MlError::io(&self.path, e)),
        };

        match ModelArtifact::decode(&bytes) {
            Ok(artifact) => {
                info!(
                    "Loaded model from {:?} ({} trees, saved {})",
                    self.path,
                    artifact.model.forest.num_trees(),
                    artifact.saved_at.format("%Y-%m-%d %H:%M:%S")
                );
                Ok(Some((artifact, bytes.len())))
            }
            Err(reason) => {
                warn!("Model artifact at {:?} is unreadable: {}", self.path, reason);
                Err(MlError::ArtifactCorrupt {
                    path: self.path.clone(),
                    reason,
                })
            }
        }
    }

    fn tmp_path(&self) -> PathBuf {
        let nonce = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "model".to_string());
        self.path.with_file_name(format!(
            "{}.tmp-{}-{}-{}",
            name,
            std::process::id(),
            nonce,
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ))
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}
