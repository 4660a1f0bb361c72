//! Error types for reindexing.

use skill_embeddings::EmbeddingError;
use skill_storage::StorageError;
use skill_types::ItemType;
use skill_vector::VectorError;
use thiserror::Error;

/// Errors that can occur while reindexing
#[derive(Error, Debug)]
pub enum IndexingError {
    /// Another job holds the reindex lock for this item type
    #[error("Reindex already running for {item_type}")]
    Conflict { item_type: ItemType },

    /// Too many consecutive batches failed; the checkpoint is kept
    #[error("Reindex aborted after {failures} consecutive failed batches (next offset {next_offset})")]
    Aborted { failures: usize, next_offset: usize },

    /// Storage operation failed
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Vector write failed
    #[error("Vector error: {0}")]
    Vector(#[from] VectorError),

    /// Embedding generation error
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    /// JSON encoding/decoding errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Blocking task panicked or was cancelled
    #[error("Indexing task failed: {0}")]
    Task(String),
}

impl From<serde_json::Error> for IndexingError {
    fn from(err: serde_json::Error) -> Self {
        IndexingError::Serialization(err.to_string())
    }
}

impl From<tokio::task::JoinError> for IndexingError {
    fn from(err: tokio::task::JoinError) -> Self {
        IndexingError::Task(err.to_string())
    }
}
