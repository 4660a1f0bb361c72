//! Vector search error types.

use thiserror::Error;

use crate::store::Backend;

/// Errors that can occur during vector operations.
#[derive(Debug, Error)]
pub enum VectorError {
    /// usearch index error
    #[error("Index error: {0}")]
    Index(String),

    /// Primary backend has no index path configured
    #[error("Vector index not configured")]
    NotConfigured,

    /// Index holds no vectors
    #[error("Vector index is empty")]
    EmptyIndex,

    /// Dimension mismatch
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Backend call exceeded its deadline
    #[error("{backend} backend timed out after {timeout_ms}ms")]
    Timeout { backend: Backend, timeout_ms: u64 },

    /// Both backends failed
    #[error("search unavailable")]
    Unavailable,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// RocksDB error (index key map)
    #[error("Database error: {0}")]
    Database(#[from] rocksdb::Error),

    /// Relational store error
    #[error("Storage error: {0}")]
    Storage(#[from] skill_storage::StorageError),

    /// Blocking task failed to complete
    #[error("Search task failed: {0}")]
    Join(String),
}

impl From<tokio::task::JoinError> for VectorError {
    fn from(err: tokio::task::JoinError) -> Self {
        VectorError::Join(err.to_string())
    }
}
