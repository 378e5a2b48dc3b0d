//! Sonotag Training
//!
//! Run orchestration on top of `sonotag-data` and the `Model` trait:
//! - Loading and validating run configurations (`RunConfig`)
//! - The epoch loop with patience-driven LR decay and best-model checkpoints (`TrainingRun`)
//! - Experiment layout, per-epoch logs, manifests and discovery
//! - Item-level prediction and ensembling of experiments

pub mod artifacts;
pub mod builders;
pub mod config;
pub mod epoch_log;
pub mod error;
pub mod experiment;
pub mod layout;
pub mod predict;
pub mod progress;
pub mod registry;
pub mod schedule;
pub mod trainer;

pub use artifacts::{ArtifactKind, ExperimentArtifact, ExperimentManifest, RunSummary};
pub use builders::{build_eval_plan, build_run_data, load_split, RunData, SAMPLE_SEED};
pub use config::{AdversarialSection, GroundTruthFiles, PipelineSection, RunConfig, RunConfigFile, TrainingSection};
pub use epoch_log::EpochLog;
pub use error::{TrainingError, TrainingResult};
pub use experiment::ExperimentId;
pub use layout::ExperimentLayout;
pub use predict::{predict, predict_experiments, Predictions};
pub use progress::{EpochCosts, ProgressEvent, ProgressSink, RecordingProgressSink, StdoutProgressSink};
pub use registry::{discover_experiments, resolve_experiment, ExperimentEntry};
pub use schedule::{EpochDecision, PatienceSchedule};
pub use trainer::{TrainerStatus, TrainingRun};
