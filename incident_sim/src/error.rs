//! Error type for the persistence and configuration boundaries
//!
//! Pipeline stages are total over their domain and never fail; only loading
//! and saving checkpoints, matrices and configuration can.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed checkpoint or matrix data: {0}")]
    Checkpoint(#[from] serde_json::Error),

    #[error("invalid TOML configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SimError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SimError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, SimError>;
