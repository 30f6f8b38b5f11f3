use std::path::PathBuf;

use thiserror::Error;
use yinguo_algo::SimError;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("unknown config key: {0}")]
    UnknownConfig(String),

    #[error(transparent)]
    Sim(#[from] SimError),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization: {0}")]
    Json(#[from] serde_json::Error),

    #[error("propensity training diverged")]
    PropensityDiverged,

    #[error("overlap weights contain invalid values")]
    InvalidWeights,

    #[error("missing checkpoint file: {0}")]
    MissingCheckpoint(PathBuf),
}
