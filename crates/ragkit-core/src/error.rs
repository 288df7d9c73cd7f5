use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid fusion policy '{0}': expected one of equal, weighted, rrf")]
    InvalidPolicy(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Failed to load artifact {}: {reason}", path.display())]
    ArtifactLoad { path: PathBuf, reason: String },

    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("Embedding dimension mismatch: index expects {expected}, query has {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Position {position} out of bounds for corpus of {len} records (index/corpus desync)")]
    PositionOutOfBounds { position: usize, len: usize },

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub fn artifact(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::ArtifactLoad { path: path.into(), reason: reason.to_string() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
