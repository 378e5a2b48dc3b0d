//! Per-epoch TSV log (`train_log.tsv`).

use crate::error::TrainingResult;
use crate::progress::EpochCosts;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

const PLAIN_HEADER: &[&str] = &["Epoch", "train_cost", "val_cost", "epoch_time_seconds", "learning_rate"];
const ADVERSARIAL_HEADER: &[&str] = &[
    "Epoch",
    "train_cost",
    "train_task_cost",
    "train_discriminator_cost",
    "val_cost",
    "val_task_cost",
    "val_discriminator_cost",
    "epoch_time_seconds",
    "learning_rate",
];

/// Append-only epoch log. Each row is flushed as soon as it is written.
#[derive(Debug)]
pub struct EpochLog {
    path: PathBuf,
    adversarial: bool,
}

impl EpochLog {
    /// Creates the file and writes the header.
    pub fn create(path: &Path, adversarial: bool) -> TrainingResult<Self> {
        let header = if adversarial { ADVERSARIAL_HEADER } else { PLAIN_HEADER };
        let mut writer = tsv_writer(File::create(path)?);
        writer.write_record(header)?;
        writer.flush()?;
        Ok(Self { path: path.to_path_buf(), adversarial })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, costs: &EpochCosts) -> TrainingResult<()> {
        let mut cols = vec![costs.epoch.to_string(), fmt_cost(costs.train_cost)];
        if self.adversarial {
            cols.push(fmt_opt(costs.train_task_cost));
            cols.push(fmt_opt(costs.train_discriminator_cost));
        }
        cols.push(fmt_cost(costs.val_cost));
        if self.adversarial {
            cols.push(fmt_opt(costs.val_task_cost));
            cols.push(fmt_opt(costs.val_discriminator_cost));
        }
        cols.push(format!("{:.3}", costs.epoch_time_seconds));
        cols.push(costs.learning_rate.to_string());

        let mut writer = tsv_writer(OpenOptions::new().append(true).open(&self.path)?);
        writer.write_record(&cols)?;
        writer.flush()?;
        Ok(())
    }
}

fn tsv_writer(file: File) -> csv::Writer<File> {
    csv::WriterBuilder::new()
        .delimiter(b'\t')
        .terminator(csv::Terminator::Any(b'\n'))
        .has_headers(false)
        .from_writer(file)
}

fn fmt_cost(v: f64) -> String {
    if v.is_nan() { "nan".to_string() } else { format!("{v:.6}") }
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map_or_else(|| "nan".to_string(), fmt_cost)
}
