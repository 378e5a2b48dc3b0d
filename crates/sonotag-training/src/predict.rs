//! Per-item prediction and experiment ensembling.

use crate::builders::build_eval_plan;
use crate::config::RunConfig;
use crate::error::{TrainingError, TrainingResult};
use crate::registry::resolve_experiment;
use serde::{Deserialize, Serialize};
use sonotag_abstraction::Model;
use sonotag_data::StreamPlan;
use sonotag_models::ModelFactory;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{info, warn};

/// Item-level predictions: the mean of every patch prediction of an item.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Predictions {
    by_id: BTreeMap<String, Vec<f64>>,
}

impl Predictions {
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&[f64]> {
        self.by_id.get(id).map(Vec::as_slice)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.by_id.keys().map(String::as_str)
    }

    /// Element-wise mean over several prediction sets. An id is averaged over
    /// the sets that contain it.
    #[must_use]
    pub fn average(sets: &[Self]) -> Self {
        let mut sums: BTreeMap<String, (Vec<f64>, usize)> = BTreeMap::new();
        for set in sets {
            for (id, values) in &set.by_id {
                let (sum, n) = sums.entry(id.clone()).or_insert_with(|| (vec![0.0; values.len()], 0));
                for (s, v) in sum.iter_mut().zip(values) {
                    *s += v;
                }
                *n += 1;
            }
        }
        let by_id = sums
            .into_iter()
            .map(|(id, (sum, n))| (id, sum.into_iter().map(|s| s / n as f64).collect()))
            .collect();
        Self { by_id }
    }

    pub fn write_json(&self, path: &Path) -> TrainingResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }
}

/// Runs `model` in evaluation mode over a chained pass and averages patch
/// predictions per id. Ids in `ids` that yielded no patch are skipped.
pub fn predict(model: &mut dyn Model, plan: &StreamPlan, ids: &[String]) -> TrainingResult<Predictions> {
    let mut sums: HashMap<String, (Vec<f64>, usize)> = HashMap::new();
    for batch in plan.spawn(0)? {
        let eval = model.evaluate(&batch)?;
        for (id, row) in batch.ids.iter().zip(eval.predictions.rows()) {
            let (sum, n) = sums.entry(id.to_string()).or_insert_with(|| (vec![0.0; row.len()], 0));
            for (s, &p) in sum.iter_mut().zip(row.iter()) {
                *s += f64::from(p);
            }
            *n += 1;
        }
    }

    let mut by_id = BTreeMap::new();
    for id in ids {
        match sums.remove(id) {
            Some((sum, n)) => {
                by_id.insert(id.clone(), sum.into_iter().map(|s| s / n as f64).collect());
            }
            None => warn!(id = %id, "no patch was produced for item, leaving it out of the predictions"),
        }
    }
    Ok(Predictions { by_id })
}

/// Restores each experiment's best checkpoint, predicts the test split and
/// averages across experiments.
pub fn predict_experiments(config: &RunConfig, experiment_ids: &[String]) -> TrainingResult<Predictions> {
    if experiment_ids.is_empty() {
        return Err(TrainingError::InvalidConfig("at least one experiment id is required".to_string()));
    }
    let (plan, ids) = build_eval_plan(config)?;
    let spec = config.model_spec();

    let mut sets = Vec::with_capacity(experiment_ids.len());
    for experiment in experiment_ids {
        let checkpoint = resolve_experiment(&config.exp_dir, experiment)?;
        let mut model = ModelFactory::create(config.model, experiment.clone(), &spec)?;
        model.restore(&checkpoint)?;
        let predictions = predict(model.as_mut(), &plan, &ids)?;
        info!(experiment_id = %experiment, items = predictions.len(), "predicted test split");
        sets.push(predictions);
    }
    Ok(Predictions::average(&sets))
}
