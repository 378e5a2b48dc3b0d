//! Index and ground-truth loading.
//!
//! Index file: `id \t representation_path [\t audio_path]`.
//! Ground-truth file: `id \t label`, where the label is a class index (`3`) or
//! a comma-separated multi-hot vector (`0,1,0`).

use crate::error::{DataError, DataResult};
use crate::sampler::ItemSpec;
use csv::StringRecord;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub id: String,
    pub repr_path: PathBuf,
    pub audio_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct ItemIndex {
    order: Vec<String>,
    entries: HashMap<String, IndexEntry>,
}

impl ItemIndex {
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&IndexEntry> {
        self.entries.get(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Ids in file order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }
}

/// Non-blank records of a headerless TSV file with their 1-based line numbers.
fn read_tsv(path: &Path) -> DataResult<Vec<(usize, StringRecord)>> {
    let file = File::open(path).map_err(|source| DataError::Read { path: path.to_path_buf(), source })?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .from_reader(file);

    let mut records = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let record = result.map_err(|e| DataError::Parse {
            path: path.to_path_buf(),
            line: e.position().map_or(idx + 1, |p| p.line() as usize),
            message: e.to_string(),
        })?;
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        let line = record.position().map_or(idx + 1, |p| p.line() as usize);
        records.push((line, record));
    }
    Ok(records)
}

pub fn load_index(path: &Path) -> DataResult<ItemIndex> {
    let mut index = ItemIndex::default();

    for (line, record) in read_tsv(path)? {
        let mut cols = record.iter().map(str::trim);
        let (Some(id), Some(repr)) = (cols.next(), cols.next()) else {
            return Err(DataError::Parse {
                path: path.to_path_buf(),
                line,
                message: "expected `id<TAB>representation_path`".to_string(),
            });
        };
        if id.is_empty() || repr.is_empty() {
            return Err(DataError::Parse {
                path: path.to_path_buf(),
                line,
                message: "empty id or representation path".to_string(),
            });
        }
        let entry = IndexEntry {
            id: id.to_string(),
            repr_path: PathBuf::from(repr),
            audio_path: cols.next().filter(|s| !s.is_empty()).map(PathBuf::from),
        };
        if index.entries.insert(id.to_string(), entry).is_none() {
            index.order.push(id.to_string());
        }
    }

    Ok(index)
}

/// A ground-truth label as written in the file.
#[derive(Debug, Clone, PartialEq)]
pub enum Label {
    Class(usize),
    Vector(Vec<f32>),
}

impl FromStr for Label {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.contains(',') {
            let values = s
                .split(',')
                .map(|v| v.trim().parse::<f32>().map_err(|e| format!("invalid value `{v}`: {e}")))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Self::Vector(values));
        }
        s.parse::<usize>().map(Self::Class).map_err(|e| format!("invalid class index `{s}`: {e}"))
    }
}

impl Label {
    /// Dense `num_classes`-long vector (one-hot for a class index).
    pub fn to_dense(&self, num_classes: usize) -> Result<Vec<f32>, String> {
        match self {
            Self::Class(c) if *c < num_classes => {
                let mut v = vec![0.0; num_classes];
                v[*c] = 1.0;
                Ok(v)
            }
            Self::Class(c) => Err(format!("class index {c} out of range for {num_classes} classes")),
            Self::Vector(v) if v.len() == num_classes => Ok(v.clone()),
            Self::Vector(v) => Err(format!("label has {} values, expected {num_classes}", v.len())),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GroundTruth {
    ids: Vec<String>,
    labels: HashMap<String, Arc<[f32]>>,
}

impl GroundTruth {
    /// Ids in file order.
    #[must_use]
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Arc<[f32]>> {
        self.labels.get(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Keeps `n` ids drawn with a fixed seed, preserving file order.
    #[must_use]
    pub fn sample(&self, n: usize, seed: u64) -> Self {
        if n >= self.ids.len() {
            return self.clone();
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let mut picked: Vec<usize> = (0..self.ids.len()).collect();
        picked.shuffle(&mut rng);
        picked.truncate(n);
        picked.sort_unstable();
        let ids: Vec<String> = picked.into_iter().map(|i| self.ids[i].clone()).collect();
        let labels = ids.iter().map(|id| (id.clone(), Arc::clone(&self.labels[id]))).collect();
        Self { ids, labels }
    }

    /// Joins labels with index paths (and optional domain labels), skipping
    /// ids that cannot be resolved.
    #[must_use]
    pub fn items(&self, index: &ItemIndex, domains: Option<&Self>) -> Vec<ItemSpec> {
        let mut items = Vec::with_capacity(self.ids.len());
        for id in &self.ids {
            let Some(entry) = index.get(id) else {
                warn!(id = %id, "id has ground truth but no index entry, skipping");
                continue;
            };
            let domain = match domains {
                Some(d) => match d.get(id) {
                    Some(label) => Some(Arc::clone(label)),
                    None => {
                        warn!(id = %id, "id has no domain label, skipping");
                        continue;
                    }
                },
                None => None,
            };
            items.push(ItemSpec {
                id: Arc::from(id.as_str()),
                repr_path: entry.repr_path.clone(),
                label: Arc::clone(&self.labels[id]),
                domain,
            });
        }
        items
    }
}

pub fn load_ground_truth(path: &Path, num_classes: usize) -> DataResult<GroundTruth> {
    let mut gt = GroundTruth::default();

    for (line, record) in read_tsv(path)? {
        let parse_err = |message: String| DataError::Parse { path: path.to_path_buf(), line, message };
        let (Some(id), Some(label)) = (record.get(0), record.get(1)) else {
            return Err(parse_err("expected `id<TAB>label`".to_string()));
        };
        let dense = label.parse::<Label>().and_then(|l| l.to_dense(num_classes)).map_err(parse_err)?;
        let id = id.trim().to_string();
        if gt.labels.insert(id.clone(), Arc::from(dense)).is_none() {
            gt.ids.push(id);
        }
    }

    Ok(gt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_index_with_optional_audio_column() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("index_repr.tsv");
        std::fs::write(&path, "a\trepr/a.bin\taudio/a.mp3\n\nb\trepr/b.bin\n").unwrap();

        let index = load_index(&path).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.ids().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(index.get("a").unwrap().audio_path, Some(PathBuf::from("audio/a.mp3")));
        assert_eq!(index.get("b").unwrap().audio_path, None);
    }

    #[test]
    fn test_load_index_reports_bad_line() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("index.tsv");
        std::fs::write(&path, "a\trepr/a.bin\nbroken\n").unwrap();
        match load_index(&path) {
            Err(DataError::Parse { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_errors_name_the_line_past_whitespace_lines() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("gt.tsv");
        std::fs::write(&path, "a\t0\n   \nb\t1\nc\t7\n\n").unwrap();
        match load_ground_truth(&path, 2) {
            Err(DataError::Parse { line, .. }) => assert_eq!(line, 4),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_index_paths_are_taken_literally() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("index.tsv");
        std::fs::write(&path, "q\trepr/\"odd\" name.bin\n").unwrap();
        let index = load_index(&path).unwrap();
        assert_eq!(index.get("q").unwrap().repr_path, PathBuf::from("repr/\"odd\" name.bin"));
    }

    #[test]
    fn test_labels_parse_as_class_or_vector() {
        assert_eq!("2".parse::<Label>().unwrap().to_dense(3).unwrap(), vec![0.0, 0.0, 1.0]);
        assert_eq!("0,1,1".parse::<Label>().unwrap().to_dense(3).unwrap(), vec![0.0, 1.0, 1.0]);
        assert!("3".parse::<Label>().unwrap().to_dense(3).is_err());
        assert!("0,1".parse::<Label>().unwrap().to_dense(3).is_err());
        assert!("x".parse::<Label>().is_err());
    }

    #[test]
    fn test_ground_truth_items_skip_unresolvable_ids() {
        let temp = TempDir::new().unwrap();
        let index_path = temp.path().join("index.tsv");
        let gt_path = temp.path().join("gt.tsv");
        let dom_path = temp.path().join("dom.tsv");
        std::fs::write(&index_path, "a\ta.bin\nb\tb.bin\nc\tc.bin\n").unwrap();
        std::fs::write(&gt_path, "a\t0\nmissing\t1\nb\t1\nc\t0\n").unwrap();
        std::fs::write(&dom_path, "a\t1\nb\t0\n").unwrap();

        let index = load_index(&index_path).unwrap();
        let gt = load_ground_truth(&gt_path, 2).unwrap();
        assert_eq!(gt.ids(), &["a", "missing", "b", "c"]);

        let items = gt.items(&index, None);
        assert_eq!(items.iter().map(|i| &*i.id).collect::<Vec<_>>(), vec!["a", "b", "c"]);

        let domains = load_ground_truth(&dom_path, 2).unwrap();
        let items = gt.items(&index, Some(&domains));
        assert_eq!(items.len(), 2);
        assert_eq!(&items[0].domain.as_ref().unwrap()[..], &[0.0, 1.0]);
    }

    #[test]
    fn test_sample_is_deterministic_and_ordered() {
        let temp = TempDir::new().unwrap();
        let gt_path = temp.path().join("gt.tsv");
        let body: String = (0..20).map(|i| format!("id{i:02}\t{}\n", i % 2)).collect();
        std::fs::write(&gt_path, body).unwrap();
        let gt = load_ground_truth(&gt_path, 2).unwrap();

        let a = gt.sample(5, 0);
        let b = gt.sample(5, 0);
        assert_eq!(a.ids(), b.ids());
        assert_eq!(a.len(), 5);
        let mut sorted = a.ids().to_vec();
        sorted.sort();
        assert_eq!(a.ids(), &sorted[..]);
    }
}
