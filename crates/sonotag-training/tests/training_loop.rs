mod common;

use common::{RunFixture, ADVERSARIAL};
use sonotag_abstraction::{Batch, Cost, Evaluation, Model, ModelError};
use sonotag_models::{LinearSoftmaxModel, MockModel};
use sonotag_training::{
    build_run_data, discover_experiments, resolve_experiment, ProgressEvent, RecordingProgressSink, TrainerStatus,
    TrainingError, TrainingRun,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Returns `val_costs[k]` on the k-th validation batch and records every
/// learning rate it was trained with. With `val_discriminator` set it reports
/// two-term costs, `val_costs` being the task component.
struct ScriptedModel {
    val_costs: Vec<f64>,
    val_discriminator: Option<Vec<f64>>,
    evaluations: usize,
    train_lrs: Vec<f64>,
    fail_save: bool,
    fail_train: bool,
}

impl ScriptedModel {
    fn new(val_costs: &[f64]) -> Self {
        Self {
            val_costs: val_costs.to_vec(),
            val_discriminator: None,
            evaluations: 0,
            train_lrs: Vec::new(),
            fail_save: false,
            fail_train: false,
        }
    }
}

impl Model for ScriptedModel {
    fn model_id(&self) -> &str {
        "scripted"
    }

    fn train_step(&mut self, _batch: &Batch, learning_rate: f64) -> Result<Cost, ModelError> {
        if self.fail_train {
            return Err(ModelError::Computation("exploded".to_string()));
        }
        self.train_lrs.push(learning_rate);
        match self.val_discriminator {
            Some(_) => Ok(Cost::Adversarial { task: 1.0, discriminator: 1.0 }),
            None => Ok(Cost::Single(1.0)),
        }
    }

    fn evaluate(&mut self, batch: &Batch) -> Result<Evaluation, ModelError> {
        let task = self.val_costs[self.evaluations];
        let cost = match &self.val_discriminator {
            Some(d) => Cost::Adversarial { task, discriminator: d[self.evaluations] },
            None => Cost::Single(task),
        };
        self.evaluations += 1;
        Ok(Evaluation { cost, predictions: batch.y.clone() })
    }

    fn save(&self, dir: &Path) -> Result<PathBuf, ModelError> {
        if self.fail_save {
            return Err(ModelError::Checkpoint("disk full".to_string()));
        }
        let path = dir.join("scripted.json");
        std::fs::write(&path, "{}").map_err(|e| ModelError::Checkpoint(e.to_string()))?;
        Ok(path)
    }

    fn restore(&mut self, _path: &Path) -> Result<(), ModelError> {
        Ok(())
    }
}

fn log_lines(run: &TrainingRun) -> Vec<String> {
    std::fs::read_to_string(run.layout().train_log_path(run.experiment_id()))
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

#[test]
fn patience_halves_once_and_keeps_first_epoch_checkpoint() {
    let fx = RunFixture::new("", "");
    let config = Arc::new(fx.config());
    let data = build_run_data(&config, None).unwrap();
    let run = TrainingRun::new(Arc::clone(&config));
    run.prepare().unwrap();

    let mut model = ScriptedModel::new(&[0.5, 0.6, 0.6, 0.6]);
    let sink = RecordingProgressSink::default();
    let manifest = run.run(&mut model, &data, &sink).unwrap();

    // 8 patches / batch 2 = 4 steps per trained epoch; epoch 1 does not train
    assert_eq!(model.train_lrs.len(), 12);
    assert!(model.train_lrs[..8].iter().all(|&lr| (lr - 0.1).abs() < 1e-12));
    assert!(model.train_lrs[8..].iter().all(|&lr| (lr - 0.05).abs() < 1e-12));

    assert_eq!(manifest.summary.best_epoch, Some(1));
    assert_eq!(manifest.summary.lr_decays, 1);
    assert_eq!(manifest.summary.epochs_run, 4);
    assert!(manifest.best_checkpoint().unwrap().ends_with("scripted.json"));
    assert_eq!(run.status(), TrainerStatus::Finished);

    let saved: Vec<usize> = sink
        .events()
        .into_iter()
        .filter_map(|e| match e {
            ProgressEvent::CheckpointSaved { epoch, .. } => Some(epoch),
            _ => None,
        })
        .collect();
    assert_eq!(saved, vec![1]);
    let decayed: Vec<usize> = sink
        .events()
        .into_iter()
        .filter_map(|e| match e {
            ProgressEvent::LearningRateDecayed { epoch, .. } => Some(epoch),
            _ => None,
        })
        .collect();
    assert_eq!(decayed, vec![3]);

    let lines = log_lines(&run);
    assert_eq!(lines.len(), 5);
    assert!(lines[1].starts_with("1\tnan\t0.500000\t"));
    assert!(lines[4].starts_with("4\t1.000000\t0.600000\t"));
    assert!(lines[4].ends_with("\t0.05"));

    let latest = std::fs::read_to_string(config.exp_dir.join("experiment_id_0")).unwrap();
    assert_eq!(latest, run.experiment_id().as_str());
    assert!(run.layout().config_path(run.experiment_id()).exists());

    let found = discover_experiments(&config.exp_dir).unwrap();
    assert_eq!(found.len(), 1);
    assert!(resolve_experiment(&config.exp_dir, run.experiment_id().as_str()).is_ok());
}

#[test]
fn batch_budget_fixes_steps_per_epoch() {
    let fx = RunFixture::new("train_batches_per_epoch = 7", "");
    let config = Arc::new(fx.config());
    let data = build_run_data(&config, None).unwrap();
    let run = TrainingRun::new(Arc::clone(&config));
    run.prepare().unwrap();

    let mut model = ScriptedModel::new(&[0.9, 0.8, 0.7, 0.6]);
    let manifest = run.run(&mut model, &data, &RecordingProgressSink::default()).unwrap();
    assert_eq!(model.train_lrs.len(), 21);
    assert_eq!(manifest.summary.best_epoch, Some(4));
    assert_eq!(manifest.summary.lr_decays, 0);
}

#[test]
fn adversarial_runs_log_both_cost_components() {
    let fx = RunFixture::new("", ADVERSARIAL);
    let config = Arc::new(fx.config());
    assert!(config.is_adversarial());
    let data = build_run_data(&config, None).unwrap();
    let run = TrainingRun::new(Arc::clone(&config));
    run.prepare().unwrap();

    let mut model = MockModel::new("mock".to_string(), config.model_spec());
    let manifest = run.run(&mut model, &data, &RecordingProgressSink::default()).unwrap();
    assert_eq!(model.steps(), 12);
    // constant costs: only the first epoch improves
    assert_eq!(manifest.summary.best_epoch, Some(1));

    let lines = log_lines(&run);
    let header: Vec<&str> = lines[0].split('\t').collect();
    assert_eq!(header[2], "train_task_cost");
    assert_eq!(header[6], "val_discriminator_cost");
    let row: Vec<f64> = lines[2].split('\t').take(7).map(|v| v.parse().unwrap()).collect();
    let task = 2f64.ln();
    assert!((row[1] - 2.0 * task).abs() < 1e-5);
    assert!((row[2] - task).abs() < 1e-5);
    assert!((row[3] - task).abs() < 1e-5);
}

#[test]
fn adversarial_early_stopping_follows_the_task_cost() {
    let fx = RunFixture::new("", ADVERSARIAL);
    let config = Arc::new(fx.config());
    let data = build_run_data(&config, None).unwrap();
    let run = TrainingRun::new(Arc::clone(&config));
    run.prepare().unwrap();

    // task cost improves every epoch while the total gets worse
    let mut model = ScriptedModel::new(&[0.9, 0.8, 0.7, 0.6]);
    model.val_discriminator = Some(vec![0.1, 0.5, 0.9, 1.3]);
    let sink = RecordingProgressSink::default();
    let manifest = run.run(&mut model, &data, &sink).unwrap();

    assert_eq!(manifest.summary.best_epoch, Some(4));
    assert!((manifest.summary.best_val_cost.unwrap() - 0.6).abs() < 1e-12);
    assert_eq!(manifest.summary.lr_decays, 0);
    assert!(model.train_lrs.iter().all(|&lr| (lr - 0.1).abs() < 1e-12));
    let saved: Vec<usize> = sink
        .events()
        .into_iter()
        .filter_map(|e| match e {
            ProgressEvent::CheckpointSaved { epoch, .. } => Some(epoch),
            _ => None,
        })
        .collect();
    assert_eq!(saved, vec![1, 2, 3, 4]);

    let lines = log_lines(&run);
    let last: Vec<&str> = lines[4].split('\t').collect();
    assert_eq!(last[4], "1.900000");
    assert_eq!(last[5], "0.600000");
    assert_eq!(last[6], "1.300000");
}

#[test]
fn linear_model_rejects_adversarial_spec() {
    let fx = RunFixture::new("", ADVERSARIAL);
    let config = fx.config();
    assert!(LinearSoftmaxModel::new("lin".to_string(), config.model_spec()).is_err());
}

#[test]
fn cancellation_stops_the_run_without_manifest() {
    let fx = RunFixture::new("", "");
    let config = Arc::new(fx.config());
    let data = build_run_data(&config, None).unwrap();
    let run = TrainingRun::new(Arc::clone(&config));
    run.prepare().unwrap();
    run.cancel_flag().store(true, Ordering::Relaxed);

    let mut model = ScriptedModel::new(&[0.5; 4]);
    let sink = RecordingProgressSink::default();
    let err = run.run(&mut model, &data, &sink).unwrap_err();
    assert!(matches!(err, TrainingError::Cancelled));
    assert_eq!(run.status(), TrainerStatus::Cancelled);
    assert!(sink.events().iter().any(|e| matches!(e, ProgressEvent::Cancelled { epoch: 1, .. })));
    assert!(!run.layout().manifest_path(run.experiment_id()).exists());
    assert!(discover_experiments(&config.exp_dir).unwrap().is_empty());
}

#[test]
fn checkpoint_and_model_failures_are_fatal() {
    let fx = RunFixture::new("", "");
    let config = Arc::new(fx.config());
    let data = build_run_data(&config, None).unwrap();

    let run = TrainingRun::new(Arc::clone(&config));
    run.prepare().unwrap();
    let mut model = ScriptedModel::new(&[0.5; 4]);
    model.fail_save = true;
    let err = run.run(&mut model, &data, &RecordingProgressSink::default()).unwrap_err();
    assert!(matches!(err, TrainingError::Checkpoint(_)));
    assert!(matches!(run.status(), TrainerStatus::Failed(_)));

    let run = TrainingRun::new(Arc::clone(&config));
    run.prepare().unwrap();
    let mut model = ScriptedModel::new(&[0.5; 4]);
    model.fail_train = true;
    let err = run.run(&mut model, &data, &RecordingProgressSink::default()).unwrap_err();
    assert!(matches!(err, TrainingError::Model(ModelError::Computation(_))));
    // the first epoch validated and was logged before training failed
    assert_eq!(log_lines(&run).len(), 2);
}

#[test]
fn sample_restricts_both_splits() {
    let fx = RunFixture::new("", "");
    let config = fx.config();
    let data = build_run_data(&config, Some(1)).unwrap();
    assert_eq!(data.train.item_count(), 1);
    assert_eq!(data.val.item_count(), 1);
}

#[test]
fn unresolvable_training_split_is_a_config_error() {
    let fx = RunFixture::new("", "");
    std::fs::write(fx.temp.path().join("gt_train_0.tsv"), "ghost\t0\n").unwrap();
    let err = build_run_data(&fx.config(), None).unwrap_err();
    assert!(matches!(err, TrainingError::InvalidConfig(_)));
}
