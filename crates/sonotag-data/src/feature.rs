//! Feature descriptors and value compression.

use crate::error::{DataError, DataResult};
use crate::reader::frame_count;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Log compression applied to representation values after reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Compression {
    #[default]
    #[serde(rename = "none")]
    None,
    /// `log10(x + eps)`
    #[serde(rename = "logEPS")]
    LogEps,
    /// `log10(10000 * x + 1)`
    #[serde(rename = "logC")]
    LogC,
}

/// Machine epsilon of an f64, added before the log so that zeros stay finite.
const LOG_EPS: f32 = f64::EPSILON as f32;

impl Compression {
    #[must_use]
    pub fn compress_value(self, x: f32) -> f32 {
        match self {
            Self::None => x,
            Self::LogEps => (x + LOG_EPS).log10(),
            Self::LogC => 10_000f32.mul_add(x, 1.0).log10(),
        }
    }

    pub fn apply(self, rep: &mut Array2<f32>) {
        if self == Self::None {
            return;
        }
        rep.mapv_inplace(|x| self.compress_value(x));
    }
}

/// One feature type: where its files live and how they are laid out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureDescriptor {
    /// Feature type name (e.g. `musicnn`, `yamnet`).
    pub name: String,
    /// Directory the index-relative representation paths are resolved against.
    pub dir: PathBuf,
    /// Bands (columns) per frame.
    pub bands: usize,
    /// How many stored frames make up one frame of the common time axis.
    ///
    /// A feature stored at twice the frame rate of the others declares `2`:
    /// its offsets are scaled up by two and every other row is kept.
    #[serde(default = "default_rate_factor")]
    pub rate_factor: usize,
    #[serde(default)]
    pub compression: Compression,
}

fn default_rate_factor() -> usize {
    1
}

impl FeatureDescriptor {
    #[must_use]
    pub fn new(name: impl Into<String>, dir: impl Into<PathBuf>, bands: usize) -> Self {
        Self {
            name: name.into(),
            dir: dir.into(),
            bands,
            rate_factor: 1,
            compression: Compression::None,
        }
    }

    #[must_use]
    pub fn with_rate_factor(mut self, rate_factor: usize) -> Self {
        self.rate_factor = rate_factor;
        self
    }

    #[must_use]
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Full path of this feature's file for an index-relative path.
    #[must_use]
    pub fn file_path(&self, relative: &Path) -> PathBuf {
        self.dir.join(relative)
    }
}

/// Checks a feature list for the conditions every reader relies on.
pub fn validate_features(features: &[FeatureDescriptor]) -> DataResult<()> {
    if features.is_empty() {
        return Err(DataError::InvalidConfig("at least one feature is required".to_string()));
    }
    let mut seen = HashSet::new();
    for f in features {
        if f.name.trim().is_empty() {
            return Err(DataError::InvalidConfig("feature name must not be empty".to_string()));
        }
        if !seen.insert(f.name.as_str()) {
            return Err(DataError::InvalidConfig(format!("duplicate feature name: {}", f.name)));
        }
        if f.bands == 0 {
            return Err(DataError::InvalidConfig(format!("feature {}: bands must be >= 1", f.name)));
        }
        if f.rate_factor == 0 {
            return Err(DataError::InvalidConfig(format!(
                "feature {}: rate_factor must be >= 1",
                f.name
            )));
        }
    }
    Ok(())
}

/// Sum of bands across features: the width of a concatenated patch.
#[must_use]
pub fn total_bands(features: &[FeatureDescriptor]) -> usize {
    features.iter().map(|f| f.bands).sum()
}

/// Frames of an item on the common time axis: each feature's stored frames
/// divided by its rate factor, shortest feature wins.
pub fn aligned_frames(features: &[FeatureDescriptor], relative: &Path) -> DataResult<usize> {
    let mut frames = usize::MAX;
    for feature in features {
        let stored = frame_count(&feature.file_path(relative), feature.bands)?;
        frames = frames.min(stored / feature.rate_factor);
    }
    Ok(frames)
}
