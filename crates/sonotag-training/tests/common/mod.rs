#![allow(dead_code)]

use ndarray::Array2;
use sonotag_data::write_representation;
use sonotag_training::{RunConfig, RunConfigFile};
use std::fmt::Write as _;
use std::path::Path;
use tempfile::TempDir;

pub const BANDS: usize = 2;
pub const PATCH_WIDTH: usize = 4;

/// Writes `<id>.bin` files for `frames` under `repr/mel/` and returns the
/// index lines and ground-truth lines (class = position % 2).
fn write_items(root: &Path, prefix: &str, frames: &[usize]) -> (String, String) {
    let mut index = String::new();
    let mut gt = String::new();
    for (i, &n) in frames.iter().enumerate() {
        let id = format!("{prefix}{i}");
        let rel = format!("{id}.bin");
        let class = i % 2;
        let rep = Array2::from_shape_fn((n, BANDS), |(_, b)| if b == class { 1.0 } else { 0.0 });
        write_representation(&root.join("repr/mel").join(&rel), &rep).unwrap();
        writeln!(index, "{id}\t{rel}").unwrap();
        writeln!(gt, "{id}\t{class}").unwrap();
    }
    (index, gt)
}

/// A complete run directory: representations, index, splits and a TOML file.
pub struct RunFixture {
    pub temp: TempDir,
}

impl RunFixture {
    /// Four training items (random draws 2 → 8 patches) and two validation
    /// items of exactly one patch each.
    pub fn new(extra_training: &str, extra: &str) -> Self {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        let (train_index, train_gt) = write_items(root, "train", &[8, 10, 6, 12]);
        let (val_index, val_gt) = write_items(root, "val", &[PATCH_WIDTH, PATCH_WIDTH]);
        let (test_index, test_gt) = write_items(root, "test", &[8, 4, 2]);
        std::fs::write(root.join("index_repr.tsv"), format!("{train_index}{val_index}{test_index}")).unwrap();
        std::fs::write(root.join("gt_train_0.tsv"), train_gt).unwrap();
        std::fs::write(root.join("gt_val_0.tsv"), val_gt).unwrap();
        std::fs::write(root.join("gt_test_0.tsv"), test_gt).unwrap();
        std::fs::write(root.join("dom_train.tsv"), "train0\t0\ntrain1\t1\ntrain2\t0\ntrain3\t1\n").unwrap();
        std::fs::write(root.join("dom_val.tsv"), "val0\t1\nval1\t0\n").unwrap();

        let toml = format!(
            r#"
exp_dir = "exp"
index = "index_repr.tsv"
num_classes = 2
patch_width = {PATCH_WIDTH}
model = "mock"

[[features]]
name = "mel"
dir = "repr/mel"
bands = {BANDS}

[ground_truth]
train = "gt_train_0.tsv"
val = "gt_val_0.tsv"
test = "gt_test_0.tsv"

[training]
epochs = 4
learning_rate = 0.1
patience = 2
batch_size = 2
val_batch_size = 8
sampling = {{ mode = "random", draws = 2 }}
{extra_training}

[pipeline]
workers = 2
queue_capacity = 2
{extra}
"#
        );
        std::fs::write(root.join("run.toml"), toml).unwrap();
        Self { temp }
    }

    pub fn config_path(&self) -> std::path::PathBuf {
        self.temp.path().join("run.toml")
    }

    pub fn config(&self) -> RunConfig {
        RunConfig::load(&self.config_path()).unwrap()
    }

    pub fn raw(&self) -> RunConfigFile {
        RunConfigFile::parse(&std::fs::read_to_string(self.config_path()).unwrap()).unwrap()
    }
}

pub const ADVERSARIAL: &str = r#"
[adversarial]
num_domains = 2
train = "dom_train.tsv"
val = "dom_val.tsv"
"#;
