#![allow(dead_code)]

use assert_cmd::Command;
use ndarray::Array2;
use sonotag_data::write_representation;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub fn cli() -> Command {
    Command::cargo_bin("sonotag-cli").unwrap()
}

fn write_split(root: &Path, prefix: &str, frames: &[usize], index: &mut String) -> String {
    let mut gt = String::new();
    for (i, &n) in frames.iter().enumerate() {
        let id = format!("{prefix}{i}");
        let class = i % 2;
        let rep = Array2::from_shape_fn((n, 2), |(_, b)| if b == class { 1.0 } else { 0.0 });
        write_representation(&root.join("repr/mel").join(format!("{id}.bin")), &rep).unwrap();
        writeln!(index, "{id}\t{id}.bin").unwrap();
        writeln!(gt, "{id}\t{class}").unwrap();
    }
    gt
}

/// A small run directory with a `run.toml` using the given model type.
pub fn run_dir(model: &str) -> TempDir {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    let mut index = String::new();
    let train = write_split(root, "train", &[8, 12, 6, 10], &mut index);
    let val = write_split(root, "val", &[4, 8], &mut index);
    let test = write_split(root, "test", &[8, 4], &mut index);
    std::fs::write(root.join("index_repr.tsv"), index).unwrap();
    std::fs::write(root.join("gt_train_0.tsv"), train).unwrap();
    std::fs::write(root.join("gt_val_0.tsv"), val).unwrap();
    std::fs::write(root.join("gt_test_0.tsv"), test).unwrap();
    std::fs::write(
        root.join("run.toml"),
        format!(
            r#"
exp_dir = "exp"
index = "index_repr.tsv"
num_classes = 2
patch_width = 4
model = "{model}"

[[features]]
name = "mel"
dir = "repr/mel"
bands = 2

[ground_truth]
train = "gt_train_0.tsv"
val = "gt_val_0.tsv"
test = "gt_test_0.tsv"

[training]
epochs = 3
learning_rate = 0.5
patience = 2
batch_size = 2
sampling = {{ mode = "random", draws = 2 }}

[pipeline]
workers = 2
queue_capacity = 2
"#
        ),
    )
    .unwrap();
    temp
}

pub fn config_path(dir: &TempDir) -> PathBuf {
    dir.path().join("run.toml")
}

pub fn exp_dir(dir: &TempDir) -> PathBuf {
    dir.path().join("exp")
}

/// Trains once and returns the experiment id recorded for fold 0.
pub fn train(dir: &TempDir) -> String {
    cli().arg("train").arg(config_path(dir)).assert().success();
    std::fs::read_to_string(exp_dir(dir).join("experiment_id_0")).unwrap().trim().to_string()
}
