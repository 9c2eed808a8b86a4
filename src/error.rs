use std::path::PathBuf;

use thiserror::Error;

use crate::context::Feature;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("feature {0} is not enabled on this context")]
    FeatureDisabled(Feature),

    #[error("{len} values do not fit in {capacity} slots")]
    TooManyValues { len: usize, capacity: usize },

    #[error("BGV plaintexts hold integers, cannot multiply by {0}")]
    NonIntegralScalar(f64),

    #[error("no rotation key for index {0}")]
    MissingRotationKey(i64),

    #[error("no relinearization key, run eval_mult_key_gen first")]
    MissingRelinKey,

    #[error("computation needs multiplicative depth {required}, context has {available}")]
    InsufficientDepth { required: usize, available: usize },

    #[error("dataset is empty")]
    EmptyDataset,

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("{0}")]
    Transport(String),

    #[error("line {line}: no second field")]
    MissingField { line: usize },

    #[error("line {line}: {value:?} is not a number")]
    InvalidNumber { line: usize, value: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid value {value:?} for {field}")]
    InvalidValue { field: &'static str, value: String },

    #[error("no value provided for {0}")]
    Missing(&'static str),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
