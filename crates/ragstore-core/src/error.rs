use std::time::Duration;
use thiserror::Error;

use crate::types::Topology;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Index {0} is not trained")]
    NotTrained(Topology),

    #[error("Training needs at least {required} vectors, got {provided}")]
    InsufficientTrainingData { required: usize, provided: usize },

    #[error("Corrupt state: {0}")]
    CorruptState(String),

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Embedding timed out after {0:?}")]
    EmbeddingTimeout(Duration),

    #[error("Unsupported topology: {0}")]
    UnsupportedTopology(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether the in-memory state is untouched and the same call can be retried.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Embedding(_) | Self::EmbeddingTimeout(_) | Self::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
