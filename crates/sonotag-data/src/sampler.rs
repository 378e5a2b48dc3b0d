//! Per-item patch producers.
//!
//! An [`ItemStreamer`] describes one item and how to sample it; opening it
//! yields an [`ItemStream`], a pull-based iterator of fixed-shape
//! [`Example`]s. A stream moves through `Pending → Open → Exhausted`. Any
//! failure while opening or reading is logged with the offending path and
//! moves the stream straight to `Exhausted`.

use crate::error::{DataError, DataResult};
use crate::feature::{aligned_frames, total_bands, validate_features, FeatureDescriptor};
use crate::reader::{read_representation, ReadRequest, ReadWindow, F16_BYTES};
use ndarray::{concatenate, s, Array2, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// How patches are drawn from one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SamplingPolicy {
    /// `draws` independent windows at uniformly random offsets.
    Random { draws: usize },
    /// Every window at `0, stride, 2*stride, ...` that fits in the item.
    Overlap { stride: usize },
}

impl SamplingPolicy {
    pub fn validate(&self) -> DataResult<()> {
        match *self {
            Self::Random { draws: 0 } => {
                Err(DataError::InvalidConfig("random sampling needs draws >= 1".to_string()))
            }
            Self::Overlap { stride: 0 } => {
                Err(DataError::InvalidConfig("overlap sampling needs stride >= 1".to_string()))
            }
            _ => Ok(()),
        }
    }
}

/// Immutable sampling settings shared by every item of a pass.
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    features: Vec<FeatureDescriptor>,
    patch_width: usize,
    policy: SamplingPolicy,
}

impl SamplerConfig {
    pub fn new(features: Vec<FeatureDescriptor>, patch_width: usize, policy: SamplingPolicy) -> DataResult<Self> {
        validate_features(&features)?;
        if patch_width == 0 {
            return Err(DataError::InvalidConfig("patch width must be >= 1".to_string()));
        }
        policy.validate()?;
        Ok(Self { features, patch_width, policy })
    }

    #[must_use]
    pub fn features(&self) -> &[FeatureDescriptor] {
        &self.features
    }

    #[must_use]
    pub fn patch_width(&self) -> usize {
        self.patch_width
    }

    #[must_use]
    pub fn policy(&self) -> SamplingPolicy {
        self.policy
    }

    /// Column count of an emitted patch.
    #[must_use]
    pub fn total_bands(&self) -> usize {
        total_bands(&self.features)
    }
}

/// One item as seen by the sampler.
#[derive(Debug, Clone)]
pub struct ItemSpec {
    pub id: Arc<str>,
    /// Path relative to each feature directory.
    pub repr_path: PathBuf,
    /// Dense task label.
    pub label: Arc<[f32]>,
    /// Dense domain label for adversarial runs.
    pub domain: Option<Arc<[f32]>>,
}

/// A patch paired with its item's labels and id.
#[derive(Debug, Clone)]
pub struct Example {
    pub x: Array2<f32>,
    pub y: Arc<[f32]>,
    pub domain: Option<Arc<[f32]>>,
    pub id: Arc<str>,
}

/// Factory for an item's patch stream. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ItemStreamer {
    item: ItemSpec,
    config: Arc<SamplerConfig>,
}

impl ItemStreamer {
    #[must_use]
    pub fn new(item: ItemSpec, config: Arc<SamplerConfig>) -> Self {
        Self { item, config }
    }

    #[must_use]
    pub fn item(&self) -> &ItemSpec {
        &self.item
    }

    /// Starts a fresh stream. Files are not touched until the first pull.
    #[must_use]
    pub fn open(&self, seed: u64) -> ItemStream {
        ItemStream {
            item: self.item.clone(),
            config: Arc::clone(&self.config),
            rng: StdRng::seed_from_u64(seed),
            state: StreamState::Pending,
            emitted: 0,
        }
    }
}

enum StreamState {
    Pending,
    Random { frames: usize, remaining: usize },
    Overlap { rep: Array2<f32>, next: usize },
    Exhausted,
}

/// Lazy patch sequence of a single item.
pub struct ItemStream {
    item: ItemSpec,
    config: Arc<SamplerConfig>,
    rng: StdRng,
    state: StreamState,
    emitted: usize,
}

impl ItemStream {
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        matches!(self.state, StreamState::Exhausted)
    }

    /// Patches emitted so far.
    #[must_use]
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// Stops the stream early and releases the buffered representation.
    pub fn close(&mut self) {
        self.state = StreamState::Exhausted;
    }

    fn open_state(&self) -> DataResult<StreamState> {
        let frames = aligned_frames(&self.config.features, &self.item.repr_path)?;
        match self.config.policy {
            SamplingPolicy::Random { draws } => Ok(StreamState::Random { frames, remaining: draws }),
            SamplingPolicy::Overlap { .. } => {
                let rep = self.read_aligned(frames, None)?;
                Ok(StreamState::Overlap { rep, next: 0 })
            }
        }
    }

    /// Reads every feature over the same time span and concatenates columns.
    ///
    /// `offset_frames` is on the common axis; each feature scales it (and the
    /// patch width) by its rate factor and keeps every `rate_factor`-th row.
    /// `None` reads the whole aligned span; `Some(offset)` reads one patch.
    fn read_aligned(&self, frames: usize, offset_frames: Option<usize>) -> DataResult<Array2<f32>> {
        let width = self.config.patch_width;
        let mut parts = Vec::with_capacity(self.config.features.len());
        for feature in &self.config.features {
            let rate = feature.rate_factor;
            let path = feature.file_path(&self.item.repr_path);
            let window = match offset_frames {
                Some(offset) => ReadWindow::Patch {
                    byte_offset: (offset * rate * feature.bands * F16_BYTES) as u64,
                },
                None => ReadWindow::Full,
            };
            let rep = read_representation(&ReadRequest {
                path: &path,
                patch_width: width * rate,
                bands: feature.bands,
                total_frames: frames * rate,
                window,
                compression: feature.compression,
            })?;
            parts.push(decimate(rep, rate));
        }
        if parts.len() == 1 {
            return Ok(parts.remove(0));
        }
        let views: Vec<ArrayView2<'_, f32>> = parts.iter().map(Array2::view).collect();
        Ok(concatenate(Axis(1), &views)?)
    }

    fn example(&mut self, x: Array2<f32>) -> Example {
        self.emitted += 1;
        Example {
            x,
            y: Arc::clone(&self.item.label),
            domain: self.item.domain.clone(),
            id: Arc::clone(&self.item.id),
        }
    }

    fn fail(&mut self, err: &DataError) {
        warn!(
            id = %self.item.id,
            path = %self.item.repr_path.display(),
            error = %err,
            "item sampling failed, skipping the rest of this item"
        );
        self.state = StreamState::Exhausted;
    }
}

fn decimate(rep: Array2<f32>, rate: usize) -> Array2<f32> {
    if rate <= 1 {
        return rep;
    }
    let step = isize::try_from(rate).unwrap_or(isize::MAX);
    rep.slice(s![..;step, ..]).to_owned()
}

impl Iterator for ItemStream {
    type Item = Example;

    fn next(&mut self) -> Option<Example> {
        loop {
            match &mut self.state {
                StreamState::Pending => match self.open_state() {
                    Ok(state) => {
                        debug!(id = %self.item.id, "item stream opened");
                        self.state = state;
                    }
                    Err(e) => {
                        self.fail(&e);
                        return None;
                    }
                },
                StreamState::Random { frames, remaining } => {
                    if *remaining == 0 {
                        self.state = StreamState::Exhausted;
                        return None;
                    }
                    *remaining -= 1;
                    let frames = *frames;
                    let width = self.config.patch_width;
                    // Items shorter than a patch are padded from offset 0.
                    let offset = if frames >= width { self.rng.gen_range(0..=frames - width) } else { 0 };
                    return match self.read_aligned(frames, Some(offset)) {
                        Ok(x) => Some(self.example(x)),
                        Err(e) => {
                            self.fail(&e);
                            None
                        }
                    };
                }
                StreamState::Overlap { rep, next } => {
                    let width = self.config.patch_width;
                    if *next + width > rep.nrows() {
                        self.state = StreamState::Exhausted;
                        return None;
                    }
                    let x = rep.slice(s![*next..*next + width, ..]).to_owned();
                    if let SamplingPolicy::Overlap { stride } = self.config.policy {
                        *next += stride;
                    }
                    return Some(self.example(x));
                }
                StreamState::Exhausted => return None,
            }
        }
    }
}
