use crate::error::{TrainingError, TrainingResult};
use crate::experiment::ExperimentId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sonotag_models::ModelType;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    BestCheckpoint,
    Config,
    TrainLog,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentArtifact {
    pub kind: ArtifactKind,
    pub path: PathBuf,
    pub sha256: String,
}

/// Outcome of the epoch loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RunSummary {
    /// 1-based epoch whose checkpoint was kept.
    pub best_epoch: Option<usize>,
    pub best_val_cost: Option<f64>,
    pub final_learning_rate: f64,
    pub epochs_run: usize,
    pub lr_decays: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentManifest {
    pub experiment_id: ExperimentId,
    pub created_at: DateTime<Utc>,
    pub fold: u32,
    pub model: ModelType,
    pub features: Vec<String>,
    #[serde(default)]
    pub summary: RunSummary,
    pub artifacts: Vec<ExperimentArtifact>,
}

impl ExperimentManifest {
    #[must_use]
    pub fn best_checkpoint(&self) -> Option<&Path> {
        self.artifacts.iter().find(|a| a.kind == ArtifactKind::BestCheckpoint).map(|a| a.path.as_path())
    }

    pub fn write(&self, path: &Path) -> TrainingResult<()> {
        std::fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }

    pub fn read(path: &Path) -> TrainingResult<Self> {
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

pub fn sha256_file(path: &Path) -> TrainingResult<String> {
    let bytes = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

pub fn make_artifact(kind: ArtifactKind, path: PathBuf) -> TrainingResult<ExperimentArtifact> {
    if !path.exists() {
        return Err(TrainingError::Artifact(format!("artifact path does not exist: {}", path.display())));
    }

    let hash = sha256_file(&path)?;
    Ok(ExperimentArtifact { kind, path, sha256: hash })
}
