use sonotag_abstraction::ModelError;
use std::path::PathBuf;
use thiserror::Error;

pub type DataResult<T> = std::result::Result<T, DataError>;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("invalid data configuration: {0}")]
    InvalidConfig(String),

    #[error("{}: size {bytes} bytes is not a multiple of {bands} bands of f16", path.display())]
    MalformedSize { path: PathBuf, bytes: u64, bands: usize },

    #[error("{}: reading {rows} rows at byte offset {byte_offset} runs past end of file", path.display())]
    OutOfRange { path: PathBuf, byte_offset: u64, rows: usize },

    #[error("{}:{line}: {message}", path.display())]
    Parse { path: PathBuf, line: usize, message: String },

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("batch assembly failed: {0}")]
    Batch(String),

    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
