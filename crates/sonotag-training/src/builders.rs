//! Turns a [`RunConfig`] into the item lists and stream plans of a run.

use crate::config::RunConfig;
use crate::error::{TrainingError, TrainingResult};
use sonotag_data::{
    load_ground_truth, load_index, GroundTruth, ItemIndex, ItemSpec, ItemStreamer, MuxPolicy, SamplerConfig,
    StreamPlan,
};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Seed of the `--sample` debug subset.
pub const SAMPLE_SEED: u64 = 0;

/// Train and validation plans of one run.
#[derive(Debug, Clone)]
pub struct RunData {
    pub train: StreamPlan,
    pub val: StreamPlan,
}

/// Loads one split: ground truth (optionally subsampled) joined with the index
/// and, for adversarial runs, with domain labels.
pub fn load_split(
    index: &ItemIndex,
    gt_path: &Path,
    num_classes: usize,
    domains: Option<(&Path, usize)>,
    sample: Option<usize>,
) -> TrainingResult<Vec<ItemSpec>> {
    let mut gt = load_ground_truth(gt_path, num_classes)?;
    if let Some(n) = sample {
        gt = gt.sample(n, SAMPLE_SEED);
    }
    let domain_gt: Option<GroundTruth> = match domains {
        Some((path, num_domains)) => Some(load_ground_truth(path, num_domains)?),
        None => None,
    };
    let items = gt.items(index, domain_gt.as_ref());
    info!(
        ground_truth = %gt_path.display(),
        labelled = gt.len(),
        resolved = items.len(),
        "loaded split"
    );
    Ok(items)
}

fn streamers(items: Vec<ItemSpec>, sampler: SamplerConfig) -> Vec<ItemStreamer> {
    let sampler = Arc::new(sampler);
    items.into_iter().map(|item| ItemStreamer::new(item, Arc::clone(&sampler))).collect()
}

/// Builds the training (stochastic) and validation (chained) plans.
pub fn build_run_data(config: &RunConfig, sample: Option<usize>) -> TrainingResult<RunData> {
    let index = load_index(&config.index)?;
    let adv = config.adversarial.as_ref();

    let train_items = load_split(
        &index,
        &config.ground_truth.train,
        config.num_classes,
        adv.map(|a| (a.train.as_path(), a.num_domains)),
        sample,
    )?;
    let val_items = load_split(
        &index,
        &config.ground_truth.val,
        config.num_classes,
        adv.map(|a| (a.val.as_path(), a.num_domains)),
        sample,
    )?;
    if train_items.is_empty() {
        return Err(TrainingError::InvalidConfig(format!(
            "no training item of {} could be resolved through {}",
            config.ground_truth.train.display(),
            config.index.display()
        )));
    }
    if val_items.is_empty() {
        return Err(TrainingError::InvalidConfig(format!(
            "no validation item of {} could be resolved through {}",
            config.ground_truth.val.display(),
            config.index.display()
        )));
    }

    let train = StreamPlan::new(
        "train",
        streamers(train_items, config.train_sampler()?),
        config.train_mux(),
        config.train_pipeline(),
    )?;
    let val =
        StreamPlan::new("val", streamers(val_items, config.eval_sampler()?), MuxPolicy::Chain, config.eval_pipeline())?;
    Ok(RunData { train, val })
}

/// Chained overlap plan over the test split, plus its ids in file order.
pub fn build_eval_plan(config: &RunConfig) -> TrainingResult<(StreamPlan, Vec<String>)> {
    let test = config
        .ground_truth
        .test
        .as_ref()
        .ok_or_else(|| TrainingError::InvalidConfig("ground_truth.test is required for prediction".to_string()))?;
    let index = load_index(&config.index)?;
    let items = load_split(&index, test, config.num_classes, None, None)?;
    let ids = items.iter().map(|i| i.id.to_string()).collect();
    let plan =
        StreamPlan::new("test", streamers(items, config.eval_sampler()?), MuxPolicy::Chain, config.eval_pipeline())?;
    Ok((plan, ids))
}
