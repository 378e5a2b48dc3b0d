use crate::experiment::ExperimentId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Per-epoch costs as reported to sinks and written to the epoch log.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochCosts {
    /// 1-based epoch number.
    pub epoch: usize,
    /// NaN when the epoch did not train (epoch 1 only validates).
    pub train_cost: f64,
    pub train_task_cost: Option<f64>,
    pub train_discriminator_cost: Option<f64>,
    pub val_cost: f64,
    pub val_task_cost: Option<f64>,
    pub val_discriminator_cost: Option<f64>,
    pub epoch_time_seconds: f64,
    /// Learning rate the epoch trained with.
    pub learning_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Started { experiment_id: ExperimentId, epochs: usize },
    Message { experiment_id: ExperimentId, message: String },
    Epoch { experiment_id: ExperimentId, costs: EpochCosts, best: bool },
    CheckpointSaved { experiment_id: ExperimentId, epoch: usize, path: PathBuf },
    LearningRateDecayed { experiment_id: ExperimentId, epoch: usize, learning_rate: f64 },
    Finished { experiment_id: ExperimentId },
    Cancelled { experiment_id: ExperimentId, epoch: usize },
}

pub trait ProgressSink: Send + Sync {
    fn on_event(&self, event: ProgressEvent);
}

#[derive(Debug, Default)]
pub struct StdoutProgressSink;

impl ProgressSink for StdoutProgressSink {
    fn on_event(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Started { experiment_id, epochs } => {
                println!("[train:{experiment_id}] started ({epochs} epochs)");
            }
            ProgressEvent::Message { experiment_id, message } => println!("[train:{experiment_id}] {message}"),
            ProgressEvent::Epoch { experiment_id, costs, best } => {
                let marker = if best { " - [BEST MODEL]" } else { "" };
                println!(
                    "[train:{experiment_id}] epoch {}, train cost {:.6}, val cost {:.6}, epoch-time {:.1}s, lr {}{marker}",
                    costs.epoch, costs.train_cost, costs.val_cost, costs.epoch_time_seconds, costs.learning_rate
                );
            }
            ProgressEvent::CheckpointSaved { experiment_id, epoch, path } => {
                println!("[train:{experiment_id}] epoch {epoch} checkpoint saved in {}", path.display());
            }
            ProgressEvent::LearningRateDecayed { experiment_id, epoch, learning_rate } => {
                println!("[train:{experiment_id}] epoch {epoch}: learning rate halved to {learning_rate}");
            }
            ProgressEvent::Finished { experiment_id } => println!("[train:{experiment_id}] finished"),
            ProgressEvent::Cancelled { experiment_id, epoch } => {
                println!("[train:{experiment_id}] cancelled during epoch {epoch}");
            }
        }
    }
}

/// Sink that keeps every event, for tests and embedding.
#[derive(Debug, Default)]
pub struct RecordingProgressSink {
    events: std::sync::Mutex<Vec<ProgressEvent>>,
}

impl RecordingProgressSink {
    #[must_use]
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl ProgressSink for RecordingProgressSink {
    fn on_event(&self, event: ProgressEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
