//! The epoch loop.
//!
//! `Init → {TrainEpoch → ValidateEpoch → CheckpointDecision} × epochs → Done`.
//! The first epoch only validates so the log shows the untrained model. The
//! loop owns the model on the calling thread; batches come from background
//! producers started per pass.

use crate::artifacts::{make_artifact, ArtifactKind, ExperimentManifest, RunSummary};
use crate::builders::RunData;
use crate::config::RunConfig;
use crate::epoch_log::EpochLog;
use crate::error::{TrainingError, TrainingResult};
use crate::experiment::ExperimentId;
use crate::layout::ExperimentLayout;
use crate::progress::{EpochCosts, ProgressEvent, ProgressSink};
use crate::schedule::PatienceSchedule;
use chrono::Utc;
use sonotag_abstraction::{Cost, Model};
use sonotag_data::StreamPlan;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrainerStatus {
    Idle,
    Preparing,
    Running { epoch: usize },
    Finished,
    Failed(String),
    Cancelled,
}

/// Running means of the costs of one pass.
#[derive(Debug, Clone, Copy)]
struct CostAccumulator {
    adversarial: bool,
    total: f64,
    task: f64,
    discriminator: f64,
    batches: usize,
}

impl CostAccumulator {
    fn new(adversarial: bool) -> Self {
        Self { adversarial, total: 0.0, task: 0.0, discriminator: 0.0, batches: 0 }
    }

    fn push(&mut self, cost: Cost) {
        self.total += cost.total();
        self.task += cost.task();
        self.discriminator += cost.discriminator().unwrap_or(0.0);
        self.batches += 1;
    }

    fn mean(&self, sum: f64) -> f64 {
        if self.batches == 0 { f64::NAN } else { sum / self.batches as f64 }
    }

    fn total(&self) -> f64 {
        self.mean(self.total)
    }

    fn task(&self) -> f64 {
        self.mean(self.task)
    }

    fn task_column(&self) -> Option<f64> {
        self.adversarial.then(|| self.mean(self.task))
    }

    fn discriminator_column(&self) -> Option<f64> {
        self.adversarial.then(|| self.mean(self.discriminator))
    }
}

/// One experiment: its id, on-disk layout and cancellation flag.
pub struct TrainingRun {
    config: Arc<RunConfig>,
    experiment_id: ExperimentId,
    layout: ExperimentLayout,
    cancel: Arc<AtomicBool>,
    status: Mutex<TrainerStatus>,
}

impl TrainingRun {
    #[must_use]
    pub fn new(config: Arc<RunConfig>) -> Self {
        let experiment_id = ExperimentId::new(config.feature_tag());
        Self::with_experiment_id(config, experiment_id)
    }

    #[must_use]
    pub fn with_experiment_id(config: Arc<RunConfig>, experiment_id: ExperimentId) -> Self {
        let layout = ExperimentLayout::new(config.exp_dir.clone());
        Self {
            config,
            experiment_id,
            layout,
            cancel: Arc::new(AtomicBool::new(false)),
            status: Mutex::new(TrainerStatus::Idle),
        }
    }

    #[must_use]
    pub fn experiment_id(&self) -> &ExperimentId {
        &self.experiment_id
    }

    #[must_use]
    pub fn layout(&self) -> &ExperimentLayout {
        &self.layout
    }

    /// Setting the returned flag stops the run at the next batch boundary.
    #[must_use]
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    #[must_use]
    pub fn status(&self) -> TrainerStatus {
        self.status.lock().map(|s| s.clone()).unwrap_or(TrainerStatus::Idle)
    }

    fn set_status(&self, status: TrainerStatus) {
        if let Ok(mut s) = self.status.lock() {
            *s = status;
        }
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Creates the experiment directory, dumps the resolved configuration and
    /// records this experiment as the latest of its fold.
    pub fn prepare(&self) -> TrainingResult<()> {
        self.set_status(TrainerStatus::Preparing);
        self.layout.ensure_experiment_dirs(&self.experiment_id)?;
        std::fs::write(
            self.layout.config_path(&self.experiment_id),
            serde_json::to_vec_pretty(self.config.as_ref())?,
        )?;
        self.layout.write_latest_id(self.config.fold, &self.experiment_id)?;
        Ok(())
    }

    /// Runs every epoch and writes the manifest.
    pub fn run(
        &self,
        model: &mut dyn Model,
        data: &RunData,
        progress: &dyn ProgressSink,
    ) -> TrainingResult<ExperimentManifest> {
        let result = self.run_epochs(model, data, progress);
        match &result {
            Ok(_) => self.set_status(TrainerStatus::Finished),
            Err(TrainingError::Cancelled) => self.set_status(TrainerStatus::Cancelled),
            Err(e) => self.set_status(TrainerStatus::Failed(e.to_string())),
        }
        result
    }

    fn run_epochs(
        &self,
        model: &mut dyn Model,
        data: &RunData,
        progress: &dyn ProgressSink,
    ) -> TrainingResult<ExperimentManifest> {
        let id = &self.experiment_id;
        let config = &self.config;
        let adversarial = config.is_adversarial();
        let log = EpochLog::create(&self.layout.train_log_path(id), adversarial)?;
        let checkpoints = self.layout.checkpoints_dir(id);
        let mut schedule = PatienceSchedule::new(config.learning_rate, config.patience);
        let mut best_checkpoint: Option<PathBuf> = None;
        let mut epochs_run = 0;

        info!(
            experiment_id = %id,
            model = %model.model_id(),
            epochs = config.epochs,
            train_items = data.train.item_count(),
            val_items = data.val.item_count(),
            "training started"
        );
        progress.on_event(ProgressEvent::Started { experiment_id: id.clone(), epochs: config.epochs });

        for i in 0..config.epochs {
            let epoch = i + 1;
            self.set_status(TrainerStatus::Running { epoch });
            let started = Instant::now();
            let learning_rate = schedule.learning_rate();

            let (train, val) = match self.run_epoch(model, data, i, learning_rate) {
                Ok(costs) => costs,
                Err(TrainingError::Cancelled) => {
                    warn!(experiment_id = %id, epoch, "training cancelled");
                    progress.on_event(ProgressEvent::Cancelled { experiment_id: id.clone(), epoch });
                    return Err(TrainingError::Cancelled);
                }
                Err(e) => return Err(e),
            };

            let costs = EpochCosts {
                epoch,
                train_cost: train.total(),
                train_task_cost: train.task_column(),
                train_discriminator_cost: train.discriminator_column(),
                val_cost: val.total(),
                val_task_cost: val.task_column(),
                val_discriminator_cost: val.discriminator_column(),
                epoch_time_seconds: started.elapsed().as_secs_f64(),
                learning_rate,
            };
            log.append(&costs)?;
            epochs_run = epoch;

            let decision = schedule.observe(epoch, val.task());
            if decision.improved {
                let path = model
                    .save(&checkpoints)
                    .map_err(|e| TrainingError::Checkpoint(format!("epoch {epoch}: {e}")))?;
                progress.on_event(ProgressEvent::CheckpointSaved {
                    experiment_id: id.clone(),
                    epoch,
                    path: path.clone(),
                });
                best_checkpoint = Some(path);
            }

            info!(
                experiment_id = %id,
                epoch,
                train_cost = costs.train_cost,
                val_cost = costs.val_cost,
                train_batches = train.batches,
                val_batches = val.batches,
                learning_rate,
                best = decision.improved,
                "epoch finished"
            );
            progress.on_event(ProgressEvent::Epoch { experiment_id: id.clone(), costs, best: decision.improved });
            if decision.lr_decayed {
                progress.on_event(ProgressEvent::LearningRateDecayed {
                    experiment_id: id.clone(),
                    epoch,
                    learning_rate: decision.learning_rate,
                });
            }
        }

        let mut artifacts = vec![
            make_artifact(ArtifactKind::Config, self.layout.config_path(id))?,
            make_artifact(ArtifactKind::TrainLog, log.path().to_path_buf())?,
        ];
        if let Some(path) = best_checkpoint {
            artifacts.push(make_artifact(ArtifactKind::BestCheckpoint, path)?);
        }
        let manifest = ExperimentManifest {
            experiment_id: id.clone(),
            created_at: Utc::now(),
            fold: config.fold,
            model: config.model,
            features: config.features.iter().map(|f| f.name.clone()).collect(),
            summary: RunSummary {
                best_epoch: schedule.best_epoch(),
                best_val_cost: schedule.best_cost(),
                final_learning_rate: schedule.learning_rate(),
                epochs_run,
                lr_decays: schedule.decays(),
            },
            artifacts,
        };
        manifest.write(&self.layout.manifest_path(id))?;
        progress.on_event(ProgressEvent::Finished { experiment_id: id.clone() });
        Ok(manifest)
    }

    /// Train (skipped for the first epoch) then validate.
    fn run_epoch(
        &self,
        model: &mut dyn Model,
        data: &RunData,
        index: usize,
        learning_rate: f64,
    ) -> TrainingResult<(CostAccumulator, CostAccumulator)> {
        let train = if index == 0 {
            CostAccumulator::new(self.config.is_adversarial())
        } else {
            self.train_epoch(model, &data.train, learning_rate, self.config.seed.wrapping_add(index as u64))?
        };
        let val = self.validate_epoch(model, &data.val)?;
        Ok((train, val))
    }

    fn train_epoch(
        &self,
        model: &mut dyn Model,
        plan: &StreamPlan,
        learning_rate: f64,
        seed: u64,
    ) -> TrainingResult<CostAccumulator> {
        let mut acc = CostAccumulator::new(self.config.is_adversarial());
        let budget = self.config.train_batches_per_epoch;
        for batch in plan.spawn(seed)? {
            if self.cancelled() {
                return Err(TrainingError::Cancelled);
            }
            acc.push(model.train_step(&batch, learning_rate)?);
            if budget.is_some_and(|b| acc.batches >= b) {
                break;
            }
        }
        if let Some(b) = budget {
            if acc.batches < b {
                warn!(expected = b, produced = acc.batches, "training pass ended before the batch budget");
            }
        }
        if acc.batches == 0 {
            warn!("training pass produced no batches");
        }
        Ok(acc)
    }

    fn validate_epoch(&self, model: &mut dyn Model, plan: &StreamPlan) -> TrainingResult<CostAccumulator> {
        let mut acc = CostAccumulator::new(self.config.is_adversarial());
        for batch in plan.spawn(self.config.seed)? {
            if self.cancelled() {
                return Err(TrainingError::Cancelled);
            }
            acc.push(model.evaluate(&batch)?.cost);
        }
        if acc.batches == 0 {
            warn!("validation pass produced no batches");
        }
        Ok(acc)
    }
}
