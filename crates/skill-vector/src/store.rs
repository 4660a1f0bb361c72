//! Vector store trait and types.
//!
//! Every backend reports higher-is-more-similar scores.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use skill_types::{ItemSnapshot, ItemType};

use crate::error::VectorError;

/// Which backend produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// Approximate HNSW index
    Index,
    /// Brute-force scan over raw stored vectors
    LinearScan,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Index => "index",
            Backend::LinearScan => "linear_scan",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Restricts which items a query may return.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilter {
    pub item_type: ItemType,
    /// Keep only items whose related project or employer matches
    pub project: Option<String>,
}

impl SearchFilter {
    pub fn for_project(project: impl Into<String>) -> Self {
        Self {
            project: Some(project.into()),
            ..Default::default()
        }
    }

    /// True when the filter narrows beyond the item type
    pub fn is_restrictive(&self) -> bool {
        self.project.is_some()
    }

    pub fn matches(&self, item_type: ItemType, metadata: &ItemSnapshot) -> bool {
        if item_type != self.item_type {
            return false;
        }
        match &self.project {
            Some(project) => metadata.belongs_to(project),
            None => true,
        }
    }
}

/// A single search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorMatch {
    pub id: String,
    pub item_type: ItemType,
    /// Cosine similarity, higher is more similar
    pub score: f32,
    pub metadata: ItemSnapshot,
}

/// A vector to write
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    pub item_id: String,
    pub item_type: ItemType,
    pub version: u64,
    pub values: Vec<f32>,
    pub metadata: ItemSnapshot,
}

/// Upsert statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertStats {
    pub written: usize,
    /// Rejected records (wrong dimension, non-finite values)
    pub skipped: usize,
}

/// Contract shared by the primary and secondary backends.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Up to `top_k` matches passing `filter`, best first
    async fn query(
        &self,
        embedding: &[f32],
        top_k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<VectorMatch>, VectorError>;

    async fn upsert(&self, batch: &[VectorRecord]) -> Result<UpsertStats, VectorError>;

    async fn health(&self) -> bool;

    fn backend(&self) -> Backend;
}

/// True when every value is finite
pub(crate) fn all_finite(values: &[f32]) -> bool {
    values.iter().all(|v| v.is_finite())
}
