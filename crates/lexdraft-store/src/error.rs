use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("reading corpus {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parsing corpus: {0}")]
    Json(#[from] serde_json::Error),

    #[error("duplicate passage id {0:?}")]
    DuplicatePassage(String),

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("vector has {got} dimensions, index expects {expected}")]
    Dimension { expected: usize, got: usize },

    #[error("corpus index unavailable: {0}")]
    Unavailable(String),

    #[cfg(feature = "lancedb")]
    #[error("lancedb error: {0}")]
    Lance(#[from] lancedb::Error),

    #[cfg(feature = "lancedb")]
    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for StoreError {
    fn from(e: anyhow::Error) -> Self {
        Self::Embedding(format!("{e:#}"))
    }
}
