//! Composite vector store: primary with automatic fallback.
//!
//! The primary (approximate index) runs under `primary_timeout`. Any primary
//! failure, including a timeout, a missing configuration or an empty index,
//! is logged and the query is retried once against the secondary under
//! `fallback_timeout`. Callers only see an error when both fail.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::VectorError;
use crate::store::{Backend, SearchFilter, UpsertStats, VectorMatch, VectorRecord, VectorStore};

/// Search result with provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    pub matches: Vec<VectorMatch>,
    /// Backend that produced `matches`
    pub provenance: Backend,
    /// True when the primary failed and the secondary answered
    pub fallback_occurred: bool,
}

/// Result of a composite upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOutcome {
    /// Stats from the secondary (source of truth)
    pub stats: UpsertStats,
    /// Whether the primary accepted the batch too
    pub primary_synced: bool,
}

/// Health of both backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub primary: bool,
    pub secondary: bool,
}

impl HealthReport {
    /// Searchable if either backend is up
    pub fn healthy(&self) -> bool {
        self.primary || self.secondary
    }
}

pub struct CompositeVectorStore {
    primary: Arc<dyn VectorStore>,
    secondary: Arc<dyn VectorStore>,
    primary_timeout: Duration,
    fallback_timeout: Duration,
}

impl CompositeVectorStore {
    pub fn new(
        primary: Arc<dyn VectorStore>,
        secondary: Arc<dyn VectorStore>,
        primary_timeout: Duration,
        fallback_timeout: Duration,
    ) -> Self {
        Self {
            primary,
            secondary,
            primary_timeout,
            fallback_timeout,
        }
    }

    async fn query_with_timeout(
        store: &dyn VectorStore,
        deadline: Duration,
        embedding: &[f32],
        top_k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<VectorMatch>, VectorError> {
        match timeout(deadline, store.query(embedding, top_k, filter)).await {
            Ok(result) => result,
            Err(_) => Err(VectorError::Timeout {
                backend: store.backend(),
                timeout_ms: deadline.as_millis() as u64,
            }),
        }
    }

    /// Query the primary, falling back to the secondary on any failure.
    pub async fn search(
        &self,
        embedding: &[f32],
        top_k: usize,
        filter: &SearchFilter,
    ) -> Result<SearchOutcome, VectorError> {
        let primary_error = match Self::query_with_timeout(
            self.primary.as_ref(),
            self.primary_timeout,
            embedding,
            top_k,
            filter,
        )
        .await
        {
            Ok(matches) => {
                debug!(backend = %self.primary.backend(), found = matches.len(), "Primary search succeeded");
                return Ok(SearchOutcome {
                    matches,
                    provenance: self.primary.backend(),
                    fallback_occurred: false,
                });
            }
            Err(e) => e,
        };

        match primary_error {
            VectorError::NotConfigured => {
                debug!("Primary backend not configured, using fallback")
            }
            ref e => warn!(
                backend = %self.primary.backend(),
                error = %e,
                "Primary search failed, falling back"
            ),
        }

        match Self::query_with_timeout(
            self.secondary.as_ref(),
            self.fallback_timeout,
            embedding,
            top_k,
            filter,
        )
        .await
        {
            Ok(matches) => {
                info!(backend = %self.secondary.backend(), found = matches.len(), "Fallback search succeeded");
                Ok(SearchOutcome {
                    matches,
                    provenance: self.secondary.backend(),
                    fallback_occurred: true,
                })
            }
            Err(fallback_error) => {
                warn!(
                    primary_error = %primary_error,
                    fallback_error = %fallback_error,
                    "Both vector backends failed"
                );
                Err(VectorError::Unavailable)
            }
        }
    }

    /// Write to the secondary first, then the primary best-effort.
    pub async fn upsert(&self, batch: &[VectorRecord]) -> Result<UpsertOutcome, VectorError> {
        let stats = self.secondary.upsert(batch).await?;

        let primary_synced = match self.primary.upsert(batch).await {
            Ok(_) => true,
            Err(VectorError::NotConfigured) => false,
            Err(e) => {
                warn!(error = %e, count = batch.len(), "Primary upsert failed; secondary holds the batch");
                false
            }
        };

        Ok(UpsertOutcome {
            stats,
            primary_synced,
        })
    }

    /// True if either backend is healthy
    pub async fn health(&self) -> bool {
        self.health_report().await.healthy()
    }

    pub async fn health_report(&self) -> HealthReport {
        let (primary, secondary) = tokio::join!(self.primary.health(), self.secondary.health());
        HealthReport { primary, secondary }
    }
}
