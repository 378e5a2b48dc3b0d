use crate::error::TrainingResult;
use crate::experiment::ExperimentId;
use std::path::{Path, PathBuf};

/// Filesystem layout of experiments under an experiment root.
///
/// `<exp_dir>/experiments/<experiment_id>/{config.json, train_log.tsv, checkpoints/, experiment_manifest.json}`
/// plus one `<exp_dir>/experiment_id_<fold>` pointer per fold.
#[derive(Debug, Clone)]
pub struct ExperimentLayout {
    exp_dir: PathBuf,
}

impl ExperimentLayout {
    #[must_use]
    pub fn new(exp_dir: PathBuf) -> Self {
        Self { exp_dir }
    }

    #[must_use]
    pub fn exp_dir(&self) -> &Path {
        &self.exp_dir
    }

    #[must_use]
    pub fn experiments_root(&self) -> PathBuf {
        self.exp_dir.join("experiments")
    }

    #[must_use]
    pub fn experiment_dir(&self, id: &ExperimentId) -> PathBuf {
        self.experiments_root().join(id.as_str())
    }

    #[must_use]
    pub fn config_path(&self, id: &ExperimentId) -> PathBuf {
        self.experiment_dir(id).join("config.json")
    }

    #[must_use]
    pub fn train_log_path(&self, id: &ExperimentId) -> PathBuf {
        self.experiment_dir(id).join("train_log.tsv")
    }

    #[must_use]
    pub fn checkpoints_dir(&self, id: &ExperimentId) -> PathBuf {
        self.experiment_dir(id).join("checkpoints")
    }

    #[must_use]
    pub fn manifest_path(&self, id: &ExperimentId) -> PathBuf {
        self.experiment_dir(id).join("experiment_manifest.json")
    }

    #[must_use]
    pub fn latest_id_path(&self, fold: u32) -> PathBuf {
        self.exp_dir.join(format!("experiment_id_{fold}"))
    }

    pub fn ensure_experiment_dirs(&self, id: &ExperimentId) -> TrainingResult<()> {
        std::fs::create_dir_all(self.checkpoints_dir(id))?;
        Ok(())
    }

    /// Records `id` as the latest experiment of `fold`.
    pub fn write_latest_id(&self, fold: u32, id: &ExperimentId) -> TrainingResult<()> {
        std::fs::create_dir_all(&self.exp_dir)?;
        std::fs::write(self.latest_id_path(fold), id.as_str())?;
        Ok(())
    }

    /// Latest experiment recorded for `fold`, if any.
    pub fn read_latest_id(&self, fold: u32) -> TrainingResult<Option<ExperimentId>> {
        match std::fs::read_to_string(self.latest_id_path(fold)) {
            Ok(s) => Ok(Some(ExperimentId(s.trim().to_string()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
