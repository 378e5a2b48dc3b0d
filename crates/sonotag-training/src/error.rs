use sonotag_abstraction::ModelError;
use sonotag_data::DataError;
use thiserror::Error;

pub type TrainingResult<T> = std::result::Result<T, TrainingError>;

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("invalid run configuration: {0}")]
    InvalidConfig(String),

    #[error("artifact error: {0}")]
    Artifact(String),

    #[error("checkpoint save failed: {0}")]
    Checkpoint(String),

    #[error("run cancelled")]
    Cancelled,

    #[error(transparent)]
    Data(#[from] DataError),

    #[error("model error: {0}")]
    Model(#[from] ModelError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("epoch log write failed: {0}")]
    Log(#[from] csv::Error),
}
