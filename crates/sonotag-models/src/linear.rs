//! Time-pooled linear softmax classifier.
//!
//! A patch `(frames, bands)` is averaged over time into a `bands` vector and
//! mapped to class logits by a single dense layer. The cost is softmax
//! cross-entropy against the (row-normalized) label vector, minimized with
//! plain SGD. It has no discriminator branch.

use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use sonotag_abstraction::{Batch, Cost, Evaluation, Model, ModelError, ModelSpec};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const CHECKPOINT_FILE: &str = "linear_softmax.json";

#[derive(Debug, Clone)]
pub struct LinearSoftmaxModel {
    id: String,
    spec: ModelSpec,
    /// `(bands, classes)`
    weights: Array2<f32>,
    bias: Array1<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct LinearCheckpoint {
    model_id: String,
    spec: ModelSpec,
    weights: Vec<f32>,
    bias: Vec<f32>,
}

struct Forward {
    pooled: Array2<f32>,
    probs: Array2<f32>,
}

impl LinearSoftmaxModel {
    pub fn new(id: String, spec: ModelSpec) -> Result<Self, ModelError> {
        if spec.is_adversarial() {
            return Err(ModelError::UnsupportedSpec(
                "linear softmax model has no discriminator branch; use a model that supports adversarial training"
                    .to_string(),
            ));
        }
        if spec.input_bands == 0 || spec.num_classes == 0 || spec.input_frames == 0 {
            return Err(ModelError::UnsupportedSpec(format!("degenerate model spec: {spec:?}")));
        }
        Ok(Self {
            id,
            weights: Array2::zeros((spec.input_bands, spec.num_classes)),
            bias: Array1::zeros(spec.num_classes),
            spec,
        })
    }

    #[must_use]
    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    fn check(&self, batch: &Batch) -> Result<(), ModelError> {
        let (_, frames, bands) = batch.x.dim();
        if frames != self.spec.input_frames || bands != self.spec.input_bands {
            return Err(ModelError::InvalidBatch(format!(
                "patch shape ({frames}, {bands}) does not match model input ({}, {})",
                self.spec.input_frames, self.spec.input_bands
            )));
        }
        if batch.y.ncols() != self.spec.num_classes {
            return Err(ModelError::InvalidBatch(format!(
                "label width {} does not match {} classes",
                batch.y.ncols(),
                self.spec.num_classes
            )));
        }
        if batch.is_empty() {
            return Err(ModelError::InvalidBatch("empty batch".to_string()));
        }
        Ok(())
    }

    fn forward(&self, batch: &Batch) -> Result<Forward, ModelError> {
        let pooled = batch
            .x
            .mean_axis(Axis(1))
            .ok_or_else(|| ModelError::InvalidBatch("patch has no frames".to_string()))?;
        let mut probs = pooled.dot(&self.weights) + &self.bias;
        for mut row in probs.rows_mut() {
            let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
            row.mapv_inplace(|v| (v - max).exp());
            let sum = row.sum();
            row.mapv_inplace(|v| v / sum);
        }
        Ok(Forward { pooled, probs })
    }

    fn cross_entropy(probs: &Array2<f32>, targets: &ArrayView2<'_, f32>) -> Result<f64, ModelError> {
        let n = probs.nrows() as f64;
        let total: f64 = probs
            .iter()
            .zip(targets.iter())
            .filter(|&(_, &t)| t > 0.0)
            .map(|(&p, &t)| -f64::from(t) * f64::from(p.max(f32::MIN_POSITIVE)).ln())
            .sum();
        let cost = total / n;
        if !cost.is_finite() {
            return Err(ModelError::Computation(format!("non-finite cost {cost}")));
        }
        Ok(cost)
    }
}

/// Rows scaled to sum to one; all-zero rows stay zero.
fn normalize_targets(y: &Array2<f32>) -> Array2<f32> {
    let mut t = y.clone();
    for mut row in t.rows_mut() {
        let sum = row.sum();
        if sum > 0.0 {
            row.mapv_inplace(|v| v / sum);
        }
    }
    t
}

fn checkpoint_err(path: &Path, e: impl std::fmt::Display) -> ModelError {
    ModelError::Checkpoint(format!("{}: {e}", path.display()))
}

impl Model for LinearSoftmaxModel {
    fn model_id(&self) -> &str {
        &self.id
    }

    fn train_step(&mut self, batch: &Batch, learning_rate: f64) -> Result<Cost, ModelError> {
        self.check(batch)?;
        let Forward { pooled, probs } = self.forward(batch)?;
        let targets = normalize_targets(&batch.y);
        let cost = Self::cross_entropy(&probs, &targets.view())?;

        let n = batch.len() as f32;
        let dlogits = (probs - &targets) / n;
        let grad_w = pooled.t().dot(&dlogits);
        let grad_b = dlogits.sum_axis(Axis(0));
        let lr = learning_rate as f32;
        self.weights.scaled_add(-lr, &grad_w);
        self.bias.scaled_add(-lr, &grad_b);

        debug!(model_id = %self.id, batch = batch.len(), cost, "linear softmax step");
        Ok(Cost::Single(cost))
    }

    fn evaluate(&mut self, batch: &Batch) -> Result<Evaluation, ModelError> {
        self.check(batch)?;
        let Forward { probs, .. } = self.forward(batch)?;
        let targets = normalize_targets(&batch.y);
        let cost = Self::cross_entropy(&probs, &targets.view())?;
        Ok(Evaluation { cost: Cost::Single(cost), predictions: probs })
    }

    fn save(&self, dir: &Path) -> Result<PathBuf, ModelError> {
        std::fs::create_dir_all(dir).map_err(|e| checkpoint_err(dir, e))?;
        let path = dir.join(CHECKPOINT_FILE);
        let ckpt = LinearCheckpoint {
            model_id: self.id.clone(),
            spec: self.spec.clone(),
            weights: self.weights.iter().copied().collect(),
            bias: self.bias.to_vec(),
        };
        let body = serde_json::to_vec(&ckpt).map_err(|e| checkpoint_err(&path, e))?;
        // atomic replace of the previous best
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, body).map_err(|e| checkpoint_err(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| checkpoint_err(&path, e))?;
        Ok(path)
    }

    fn restore(&mut self, path: &Path) -> Result<(), ModelError> {
        let body = std::fs::read(path).map_err(|e| checkpoint_err(path, e))?;
        let ckpt: LinearCheckpoint = serde_json::from_slice(&body).map_err(|e| checkpoint_err(path, e))?;
        if ckpt.spec != self.spec {
            return Err(ModelError::Checkpoint(format!(
                "{}: checkpoint was trained for {:?}, model expects {:?}",
                path.display(),
                ckpt.spec,
                self.spec
            )));
        }
        let weights = Array2::from_shape_vec((self.spec.input_bands, self.spec.num_classes), ckpt.weights)
            .map_err(|e| checkpoint_err(path, e))?;
        if ckpt.bias.len() != self.spec.num_classes {
            return Err(ModelError::Checkpoint(format!("{}: bias has wrong length", path.display())));
        }
        self.weights = weights;
        self.bias = Array1::from(ckpt.bias);
        Ok(())
    }
}
