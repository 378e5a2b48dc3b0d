//! Run configuration.
//!
//! A run is described by a TOML file ([`RunConfigFile`]). Loading resolves
//! relative paths against the file's directory and validates everything up
//! front, producing an immutable [`RunConfig`] that is passed explicitly to
//! every stage of the run.

use crate::error::{TrainingError, TrainingResult};
use serde::{Deserialize, Serialize};
use sonotag_abstraction::ModelSpec;
use sonotag_data::{
    validate_features, FeatureDescriptor, MuxMode, MuxPolicy, PipelineOptions, SamplerConfig, SamplingPolicy,
};
use sonotag_models::ModelType;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfigFile {
    /// Root for experiment directories and `experiment_id_<fold>` files.
    pub exp_dir: PathBuf,
    /// Index TSV mapping ids to representation paths.
    pub index: PathBuf,
    #[serde(default)]
    pub fold: u32,
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub model: ModelType,
    pub num_classes: usize,
    /// Patch width in frames.
    pub patch_width: usize,
    pub features: Vec<FeatureDescriptor>,
    pub ground_truth: GroundTruthFiles,
    pub training: TrainingSection,
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub adversarial: Option<AdversarialSection>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroundTruthFiles {
    pub train: PathBuf,
    pub val: PathBuf,
    #[serde(default)]
    pub test: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrainingSection {
    pub epochs: usize,
    pub learning_rate: f64,
    /// Non-improving epochs before the learning rate is halved; 0 disables.
    #[serde(default)]
    pub patience: u32,
    pub batch_size: usize,
    #[serde(default)]
    pub val_batch_size: Option<usize>,
    pub sampling: SamplingPolicy,
    #[serde(default)]
    pub val_stride: Option<usize>,
    #[serde(default)]
    pub train_batches_per_epoch: Option<usize>,
    /// Active item streams of the training mux; defaults to `2 * batch_size`.
    #[serde(default)]
    pub n_active: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineSection {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_workers() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    8
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self { workers: default_workers(), queue_capacity: default_queue_capacity() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdversarialSection {
    pub num_domains: usize,
    /// Domain ground truth for the training ids.
    pub train: PathBuf,
    /// Domain ground truth for the validation ids.
    pub val: PathBuf,
}

/// Validated, immutable run configuration.
#[derive(Debug, Clone, Serialize)]
pub struct RunConfig {
    pub exp_dir: PathBuf,
    pub index: PathBuf,
    pub fold: u32,
    pub seed: u64,
    pub model: ModelType,
    pub num_classes: usize,
    pub patch_width: usize,
    pub features: Vec<FeatureDescriptor>,
    pub ground_truth: GroundTruthFiles,
    pub epochs: usize,
    pub learning_rate: f64,
    pub patience: u32,
    pub batch_size: usize,
    pub val_batch_size: usize,
    pub sampling: SamplingPolicy,
    pub val_stride: usize,
    pub train_batches_per_epoch: Option<usize>,
    pub n_active: usize,
    pub pipeline: PipelineSection,
    pub adversarial: Option<AdversarialSection>,
}

impl RunConfigFile {
    pub fn parse(contents: &str) -> TrainingResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Rewrites every relative path to be relative to `base`.
    #[must_use]
    pub fn resolve_paths(mut self, base: &Path) -> Self {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.exp_dir);
        resolve(&mut self.index);
        resolve(&mut self.ground_truth.train);
        resolve(&mut self.ground_truth.val);
        if let Some(test) = self.ground_truth.test.as_mut() {
            resolve(test);
        }
        for feature in &mut self.features {
            resolve(&mut feature.dir);
        }
        if let Some(adv) = self.adversarial.as_mut() {
            resolve(&mut adv.train);
            resolve(&mut adv.val);
        }
        self
    }

    pub fn validate(self) -> TrainingResult<RunConfig> {
        let invalid = |msg: &str| Err(TrainingError::InvalidConfig(msg.to_string()));
        let t = self.training;

        validate_features(&self.features)?;
        if self.patch_width == 0 {
            return invalid("patch_width must be >= 1");
        }
        if self.num_classes == 0 {
            return invalid("num_classes must be >= 1");
        }
        if t.epochs == 0 {
            return invalid("training.epochs must be >= 1");
        }
        if !t.learning_rate.is_finite() || t.learning_rate <= 0.0 {
            return invalid("training.learning_rate must be > 0");
        }
        if t.batch_size == 0 {
            return invalid("training.batch_size must be >= 1");
        }
        if t.val_batch_size == Some(0) {
            return invalid("training.val_batch_size must be >= 1");
        }
        if t.val_stride == Some(0) {
            return invalid("training.val_stride must be >= 1");
        }
        if t.train_batches_per_epoch == Some(0) {
            return invalid("training.train_batches_per_epoch must be >= 1");
        }
        if t.n_active == Some(0) {
            return invalid("training.n_active must be >= 1");
        }
        t.sampling.validate()?;
        if self.pipeline.workers == 0 {
            return invalid("pipeline.workers must be >= 1");
        }
        if self.pipeline.queue_capacity == 0 {
            return invalid("pipeline.queue_capacity must be >= 1");
        }
        if let Some(adv) = &self.adversarial {
            if adv.num_domains == 0 {
                return invalid("adversarial.num_domains must be >= 1");
            }
        }

        Ok(RunConfig {
            exp_dir: self.exp_dir,
            index: self.index,
            fold: self.fold,
            seed: self.seed,
            model: self.model,
            num_classes: self.num_classes,
            patch_width: self.patch_width,
            features: self.features,
            ground_truth: self.ground_truth,
            epochs: t.epochs,
            learning_rate: t.learning_rate,
            patience: t.patience,
            batch_size: t.batch_size,
            val_batch_size: t.val_batch_size.unwrap_or(t.batch_size),
            sampling: t.sampling,
            val_stride: t.val_stride.unwrap_or(self.patch_width),
            train_batches_per_epoch: t.train_batches_per_epoch,
            n_active: t.n_active.unwrap_or(2 * t.batch_size),
            pipeline: self.pipeline,
            adversarial: self.adversarial,
        })
    }
}

impl RunConfig {
    /// Reads, resolves and validates a TOML run file.
    pub fn load(path: &Path) -> TrainingResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        RunConfigFile::parse(&contents)?.resolve_paths(base).validate()
    }

    #[must_use]
    pub fn is_adversarial(&self) -> bool {
        self.adversarial.is_some()
    }

    #[must_use]
    pub fn total_bands(&self) -> usize {
        sonotag_data::total_bands(&self.features)
    }

    #[must_use]
    pub fn model_spec(&self) -> ModelSpec {
        ModelSpec {
            input_frames: self.patch_width,
            input_bands: self.total_bands(),
            num_classes: self.num_classes,
            num_domains: self.adversarial.as_ref().map(|a| a.num_domains),
        }
    }

    pub fn train_sampler(&self) -> TrainingResult<SamplerConfig> {
        Ok(SamplerConfig::new(self.features.clone(), self.patch_width, self.sampling)?)
    }

    /// Validation and prediction always use overlapping windows.
    pub fn eval_sampler(&self) -> TrainingResult<SamplerConfig> {
        let policy = SamplingPolicy::Overlap { stride: self.val_stride };
        Ok(SamplerConfig::new(self.features.clone(), self.patch_width, policy)?)
    }

    /// Mux policy of a training pass.
    ///
    /// A fixed per-epoch batch budget samples items with replacement; without
    /// one, every item is activated exactly once per epoch.
    #[must_use]
    pub fn train_mux(&self) -> MuxPolicy {
        let mode = if self.train_batches_per_epoch.is_some() { MuxMode::WithReplacement } else { MuxMode::Exhaustive };
        MuxPolicy::Stochastic { n_active: self.n_active, mode }
    }

    #[must_use]
    pub fn train_pipeline(&self) -> PipelineOptions {
        PipelineOptions {
            batch_size: self.batch_size,
            workers: self.pipeline.workers,
            queue_capacity: self.pipeline.queue_capacity,
            partial: true,
        }
    }

    #[must_use]
    pub fn eval_pipeline(&self) -> PipelineOptions {
        PipelineOptions { batch_size: self.val_batch_size, ..self.train_pipeline() }
    }

    /// Short human tag for experiment ids: the first feature's name.
    #[must_use]
    pub fn feature_tag(&self) -> &str {
        self.features.first().map_or("run", |f| f.name.as_str())
    }
}
