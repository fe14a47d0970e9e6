//! Failures raised while reading, parsing or checking Parley settings.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{origin} is not valid JSON5: {source}")]
    Syntax {
        origin: String,
        source: json5::Error,
    },
    /// The merged document passed the key schema but not deserialization.
    #[error("config does not match the expected shape: {0}")]
    Shape(#[from] serde_json::Error),
    /// Unknown key or wrongly typed value in one layer.
    #[error("{origin}: bad value at `{key}`: {reason}")]
    Field {
        origin: String,
        key: String,
        reason: String,
    },
    /// Settings that parse but cannot work together.
    #[error("unusable config: {0}")]
    Unusable(String),
}
