//! Sonotag Data
//!
//! Patch sampling and batch streaming for stored audio representations:
//! - Reading f16 representation files at an offset (`reader`)
//! - Per-item patch streams with random or overlapping windows (`sampler`)
//! - Stochastic and chained multiplexing of item streams (`mux`)
//! - Fixed-size batching and the background producer pool (`batcher`, `pipeline`)
//! - Index and ground-truth files (`index`)

pub mod batcher;
pub mod error;
pub mod feature;
pub mod index;
pub mod mux;
pub mod pipeline;
pub mod reader;
pub mod sampler;

pub use batcher::{assemble_batch, Batcher};
pub use error::{DataError, DataResult};
pub use feature::{aligned_frames, total_bands, validate_features, Compression, FeatureDescriptor};
pub use index::{load_ground_truth, load_index, GroundTruth, IndexEntry, ItemIndex, Label};
pub use mux::{ChainMux, MuxMode, StochasticMux};
pub use pipeline::{BatchStream, MuxPolicy, PipelineOptions, StreamPlan};
pub use reader::{frame_count, read_representation, read_rows, write_representation, ReadRequest, ReadWindow};
pub use sampler::{Example, ItemSpec, ItemStream, ItemStreamer, SamplerConfig, SamplingPolicy};
