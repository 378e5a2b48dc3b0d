//! Model abstraction layer for sonotag.
//!
//! The training loop never looks inside a model. It hands over a [`Batch`]
//! together with a learning rate and gets back a [`Cost`]; everything between
//! (architecture, optimizer, gradient reversal for the domain branch) belongs
//! to the implementation behind the [`Model`] trait.

use ndarray::{Array2, Array3, Axis};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Represents an error raised by a model implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelError {
    /// The batch handed to the model is inconsistent or has the wrong shape.
    #[error("Invalid batch: {0}")]
    InvalidBatch(String),

    /// The model cannot be built for the requested spec.
    #[error("Unsupported model spec: {0}")]
    UnsupportedSpec(String),

    /// A forward/backward computation failed (e.g. produced non-finite values).
    #[error("Computation error: {0}")]
    Computation(String),

    /// Writing or reading a checkpoint failed.
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Other unexpected errors.
    #[error("Other model error: {0}")]
    Other(String),
}

/// Shape and output configuration a model is built for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Patch width in frames (time axis).
    pub input_frames: usize,
    /// Total band count across all concatenated features.
    pub input_bands: usize,
    /// Number of task classes.
    pub num_classes: usize,
    /// Number of domains for the discriminator branch; `None` disables it.
    #[serde(default)]
    pub num_domains: Option<usize>,
}

impl ModelSpec {
    #[must_use]
    pub fn is_adversarial(&self) -> bool {
        self.num_domains.is_some()
    }
}

/// A fixed-size group of patches ready to be fed to a model.
///
/// `x` is `(batch, frames, bands)`, `y` is `(batch, classes)`. When the run is
/// adversarial, `domains` carries the second label tensor `(batch, domains)`.
#[derive(Debug, Clone)]
pub struct Batch {
    pub x: Array3<f32>,
    pub y: Array2<f32>,
    pub domains: Option<Array2<f32>>,
    pub ids: Vec<Arc<str>>,
}

impl Batch {
    /// Build a batch, checking that every tensor agrees on the batch dimension.
    pub fn try_new(
        x: Array3<f32>,
        y: Array2<f32>,
        domains: Option<Array2<f32>>,
        ids: Vec<Arc<str>>,
    ) -> Result<Self, ModelError> {
        let n = x.len_of(Axis(0));
        if y.nrows() != n {
            return Err(ModelError::InvalidBatch(format!(
                "label rows ({}) do not match patch count ({n})",
                y.nrows()
            )));
        }
        if ids.len() != n {
            return Err(ModelError::InvalidBatch(format!(
                "id count ({}) does not match patch count ({n})",
                ids.len()
            )));
        }
        if let Some(d) = &domains {
            if d.nrows() != n {
                return Err(ModelError::InvalidBatch(format!(
                    "domain label rows ({}) do not match patch count ({n})",
                    d.nrows()
                )));
            }
        }
        Ok(Self { x, y, domains, ids })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// The scalar loss(es) returned by one model invocation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cost {
    /// A plain task loss.
    Single(f64),
    /// Task loss plus the discriminator loss of the reversed-gradient branch.
    Adversarial { task: f64, discriminator: f64 },
}

impl Cost {
    /// Combined cost (what the optimizer minimizes).
    #[must_use]
    pub fn total(&self) -> f64 {
        match *self {
            Self::Single(c) => c,
            Self::Adversarial { task, discriminator } => task + discriminator,
        }
    }

    /// Task component only. Early stopping looks at this value.
    #[must_use]
    pub fn task(&self) -> f64 {
        match *self {
            Self::Single(c) => c,
            Self::Adversarial { task, .. } => task,
        }
    }

    #[must_use]
    pub fn discriminator(&self) -> Option<f64> {
        match *self {
            Self::Single(_) => None,
            Self::Adversarial { discriminator, .. } => Some(discriminator),
        }
    }
}

/// Output of an evaluation-mode invocation.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub cost: Cost,
    /// Normalized (softmax) predictions, `(batch, classes)`.
    pub predictions: Array2<f32>,
}

/// A trainable model driven by the training loop.
///
/// A model is owned by exactly one compute thread, so methods take `&mut self`
/// and the trait only requires `Send`.
pub trait Model: Send {
    /// Returns the ID of the model.
    fn model_id(&self) -> &str;

    /// Runs one training step (training flag on) and applies the update.
    ///
    /// # Errors
    /// Returns a `ModelError` if the batch is malformed or the step fails.
    fn train_step(&mut self, batch: &Batch, learning_rate: f64) -> Result<Cost, ModelError>;

    /// Runs the model with the training flag off; parameters are untouched.
    ///
    /// Batches without domain labels (prediction passes) get a task-only cost
    /// even from an adversarial model.
    ///
    /// # Errors
    /// Returns a `ModelError` if the batch is malformed or the forward pass fails.
    fn evaluate(&mut self, batch: &Batch) -> Result<Evaluation, ModelError>;

    /// Persists a full snapshot inside `dir`, returning the written path.
    ///
    /// # Errors
    /// Returns a `ModelError::Checkpoint` if the snapshot cannot be written.
    fn save(&self, dir: &Path) -> Result<PathBuf, ModelError>;

    /// Restores parameters from a snapshot previously written by [`Model::save`].
    ///
    /// # Errors
    /// Returns a `ModelError::Checkpoint` if the snapshot is missing or invalid.
    fn restore(&mut self, path: &Path) -> Result<(), ModelError>;
}
