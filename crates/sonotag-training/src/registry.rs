use crate::artifacts::ExperimentManifest;
use crate::error::{TrainingError, TrainingResult};
use crate::experiment::ExperimentId;
use crate::layout::ExperimentLayout;
use std::path::{Path, PathBuf};

/// A finished experiment found on disk.
#[derive(Debug, Clone)]
pub struct ExperimentEntry {
    pub experiment_id: ExperimentId,
    /// Best checkpoint, if the run ever improved on its first validation.
    pub checkpoint_path: Option<PathBuf>,
    pub manifest: ExperimentManifest,
}

/// Discover experiments by scanning `<exp_dir>/experiments/*/experiment_manifest.json`.
///
/// Runs that never wrote a manifest (still running, crashed, cancelled) are skipped.
/// Entries are sorted oldest first.
pub fn discover_experiments(exp_dir: &Path) -> TrainingResult<Vec<ExperimentEntry>> {
    let layout = ExperimentLayout::new(exp_dir.to_path_buf());
    let mut out = Vec::new();

    let dir = match std::fs::read_dir(layout.experiments_root()) {
        Ok(d) => d,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
        Err(e) => return Err(e.into()),
    };

    for entry in dir {
        let entry = entry?;
        let manifest_path = entry.path().join("experiment_manifest.json");
        if !manifest_path.exists() {
            continue;
        }
        let manifest = ExperimentManifest::read(&manifest_path)?;
        out.push(ExperimentEntry {
            experiment_id: manifest.experiment_id.clone(),
            checkpoint_path: manifest.best_checkpoint().map(Path::to_path_buf),
            manifest,
        });
    }

    out.sort_by(|a, b| a.manifest.created_at.cmp(&b.manifest.created_at));
    Ok(out)
}

/// Resolve an experiment id into its best checkpoint path.
pub fn resolve_experiment(exp_dir: &Path, id: &str) -> TrainingResult<PathBuf> {
    let layout = ExperimentLayout::new(exp_dir.to_path_buf());
    let id = ExperimentId(id.to_string());
    let manifest_path = layout.manifest_path(&id);
    if !manifest_path.exists() {
        return Err(TrainingError::Artifact(format!("experiment not found (missing manifest): {id}")));
    }
    let manifest = ExperimentManifest::read(&manifest_path)?;
    manifest
        .best_checkpoint()
        .map(Path::to_path_buf)
        .ok_or_else(|| TrainingError::Artifact(format!("experiment {id} has no best checkpoint")))
}
