//! Checkpoint store: parameter snapshots on disk with a manifest and retention.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{MonitorError, TaskError};
use crate::model::{Model, Parameter};
use crate::persistence::{read_json, write_json};

const MANIFEST: &str = "checkpoints.json";

/// Metadata for one saved checkpoint, as listed in the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub step: u64,
    pub model: String,
    /// Objective at save time; `None` when it was not finite.
    pub objective: Option<f64>,
    pub path: PathBuf,
    pub hash: String,
    pub created_at: DateTime<Utc>,
}

/// Full checkpoint file contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointData {
    #[serde(flatten)]
    pub meta: Checkpoint,
    pub parameters: Vec<Parameter>,
}

/// Directory of checkpoints for one run.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
    prefix: String,
    max_to_keep: usize,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>, max_to_keep: usize) -> Result<Self, MonitorError> {
        if max_to_keep == 0 {
            return Err(MonitorError::invalid_argument(
                "max_to_keep must be at least 1",
            ));
        }
        Ok(Self {
            dir: dir.into(),
            prefix: "ckpt".into(),
            max_to_keep,
        })
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn max_to_keep(&self) -> usize {
        self.max_to_keep
    }

    fn manifest_path(&self) -> PathBuf {
        self.dir.join(MANIFEST)
    }

    /// All retained checkpoints, in the order they were saved.
    pub fn list(&self) -> Result<Vec<Checkpoint>, TaskError> {
        Self::read_manifest(&self.dir)
    }

    /// Read the manifest of a checkpoint directory without opening a store.
    pub fn read_manifest(dir: &Path) -> Result<Vec<Checkpoint>, TaskError> {
        Ok(read_json(&dir.join(MANIFEST))?.unwrap_or_default())
    }

    /// The most recently saved checkpoint.
    ///
    /// A run that reuses a directory may save lower steps than an earlier
    /// run did; the newer save still wins.
    pub fn latest(&self) -> Result<Option<Checkpoint>, TaskError> {
        Ok(self.list()?.pop())
    }

    /// Snapshot `model` at `step`.
    ///
    /// Saving the same step twice replaces the earlier entry. When more than
    /// `max_to_keep` are retained, the earliest saves are evicted.
    pub fn save(&self, step: u64, model: &dyn Model) -> Result<Checkpoint, TaskError> {
        let parameters = model.parameters();
        if let Some(bad) = parameters
            .iter()
            .find(|p| p.values.iter().any(|v| !v.is_finite()))
        {
            return Err(TaskError::model(format!(
                "parameter '{}' has non-finite values at step {step}",
                bad.name
            )));
        }

        let objective = model.objective();
        let path = self.dir.join(format!("{}-{step}.json", self.prefix));
        let meta = Checkpoint {
            id: uuid::Uuid::new_v4().to_string(),
            step,
            model: model.name().to_string(),
            objective: objective.is_finite().then_some(objective),
            path: path.clone(),
            hash: content_hash(model.name(), step, &parameters),
            created_at: Utc::now(),
        };
        let data = CheckpointData {
            meta: meta.clone(),
            parameters,
        };
        write_json(&path, &data)?;

        let mut checkpoints = self.list()?;
        checkpoints.retain(|c| c.step != step);
        checkpoints.push(meta.clone());
        let excess = checkpoints.len().saturating_sub(self.max_to_keep);
        for evicted in checkpoints.drain(..excess) {
            match std::fs::remove_file(&evicted.path) {
                Ok(()) => debug!(step = evicted.step, "Evicted old checkpoint"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        write_json(&self.manifest_path(), &checkpoints)?;

        info!(step, path = %path.display(), "Saved checkpoint");
        Ok(meta)
    }

    /// Read a checkpoint file and verify its hash.
    pub fn load(&self, checkpoint: &Checkpoint) -> Result<CheckpointData, TaskError> {
        let data: CheckpointData = read_json(&checkpoint.path)?.ok_or_else(|| {
            TaskError::CheckpointNotFound(checkpoint.path.display().to_string())
        })?;
        let expected = content_hash(&data.meta.model, data.meta.step, &data.parameters);
        if expected != data.meta.hash || data.meta.hash != checkpoint.hash {
            return Err(TaskError::CorruptCheckpoint {
                path: checkpoint.path.clone(),
                reason: "content hash mismatch".into(),
            });
        }
        Ok(data)
    }

    /// Look up a checkpoint by id and load it.
    pub fn load_by_id(&self, id: &str) -> Result<CheckpointData, TaskError> {
        let checkpoint = self
            .list()?
            .into_iter()
            .find(|c| c.id == id)
            .ok_or_else(|| TaskError::CheckpointNotFound(id.to_string()))?;
        self.load(&checkpoint)
    }

    /// Assign the latest checkpoint's parameters to `model`.
    ///
    /// Returns the checkpoint's step, or `None` when the store is empty.
    pub fn restore_latest(&self, model: &mut dyn Model) -> Result<Option<u64>, TaskError> {
        let Some(latest) = self.latest()? else {
            return Ok(None);
        };
        let data = self.load(&latest)?;
        if data.meta.model != model.name() {
            return Err(TaskError::model(format!(
                "checkpoint was written by model '{}', not '{}'",
                data.meta.model,
                model.name()
            )));
        }
        model.assign(&data.parameters)?;
        info!(step = latest.step, "Restored model from checkpoint");
        Ok(Some(latest.step))
    }
}

/// SHA-256 over the model name, step, and parameter contents.
fn content_hash(model: &str, step: u64, parameters: &[Parameter]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(model.as_bytes());
    hasher.update(step.to_le_bytes());
    for p in parameters {
        hasher.update(p.name.as_bytes());
        for v in &p.values {
            hasher.update(v.to_le_bytes());
        }
    }
    format!("{:x}", hasher.finalize())
}
