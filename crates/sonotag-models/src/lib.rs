//! Model implementations for sonotag.
//!
//! This crate provides concrete implementations of the `Model` trait.
//!
//! # Available models
//!
//! - **Mock**: uniform predictions and a fixed cost, for wiring tests
//! - **Linear**: time-pooled linear softmax classifier trained with SGD

pub mod factory;
pub mod linear;

use serde::{Deserialize, Serialize};
use sonotag_abstraction::{Batch, Cost, Evaluation, Model, ModelError, ModelSpec};
use std::path::{Path, PathBuf};
use tracing::debug;

pub use factory::{ModelFactory, ModelType};
pub use linear::LinearSoftmaxModel;

/// A mock implementation of the `Model` trait for testing and demonstration.
///
/// Predicts the uniform distribution and reports `ln(num_classes)` as its
/// task cost. In adversarial mode the discriminator cost is `ln(num_domains)`.
#[derive(Debug)]
pub struct MockModel {
    id: String,
    spec: ModelSpec,
    steps: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct MockCheckpoint {
    model_id: String,
    steps: u64,
}

impl MockModel {
    /// Creates a new `MockModel` with the given ID.
    #[must_use]
    pub const fn new(id: String, spec: ModelSpec) -> Self {
        Self { id, spec, steps: 0 }
    }

    /// Training steps applied so far.
    #[must_use]
    pub const fn steps(&self) -> u64 {
        self.steps
    }

    fn cost(&self, batch: &Batch) -> Cost {
        let task = (self.spec.num_classes as f64).ln();
        match (self.spec.num_domains, &batch.domains) {
            (Some(d), Some(_)) => Cost::Adversarial { task, discriminator: (d as f64).ln() },
            _ => Cost::Single(task),
        }
    }

    fn check(&self, batch: &Batch, training: bool) -> Result<(), ModelError> {
        if batch.y.ncols() != self.spec.num_classes {
            return Err(ModelError::InvalidBatch(format!(
                "expected {} classes, got {}",
                self.spec.num_classes,
                batch.y.ncols()
            )));
        }
        if training && self.spec.is_adversarial() && batch.domains.is_none() {
            return Err(ModelError::InvalidBatch("adversarial model needs domain labels".to_string()));
        }
        Ok(())
    }
}

impl Model for MockModel {
    fn model_id(&self) -> &str {
        &self.id
    }

    fn train_step(&mut self, batch: &Batch, learning_rate: f64) -> Result<Cost, ModelError> {
        self.check(batch, true)?;
        self.steps += 1;
        debug!(model_id = %self.id, batch = batch.len(), learning_rate, "MockModel train step");
        Ok(self.cost(batch))
    }

    fn evaluate(&mut self, batch: &Batch) -> Result<Evaluation, ModelError> {
        self.check(batch, false)?;
        let k = self.spec.num_classes;
        Ok(Evaluation {
            cost: self.cost(batch),
            predictions: ndarray::Array2::from_elem((batch.len(), k), 1.0 / k as f32),
        })
    }

    fn save(&self, dir: &Path) -> Result<PathBuf, ModelError> {
        std::fs::create_dir_all(dir).map_err(|e| ModelError::Checkpoint(format!("{}: {e}", dir.display())))?;
        let path = dir.join("mock.json");
        let body = serde_json::to_vec(&MockCheckpoint { model_id: self.id.clone(), steps: self.steps })
            .map_err(|e| ModelError::Checkpoint(e.to_string()))?;
        std::fs::write(&path, body).map_err(|e| ModelError::Checkpoint(format!("{}: {e}", path.display())))?;
        Ok(path)
    }

    fn restore(&mut self, path: &Path) -> Result<(), ModelError> {
        let body =
            std::fs::read(path).map_err(|e| ModelError::Checkpoint(format!("{}: {e}", path.display())))?;
        let ckpt: MockCheckpoint =
            serde_json::from_slice(&body).map_err(|e| ModelError::Checkpoint(e.to_string()))?;
        self.steps = ckpt.steps;
        Ok(())
    }
}
