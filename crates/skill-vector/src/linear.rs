//! Secondary backend: brute-force cosine scan over raw stored vectors.
//!
//! Always available while the relational store is. Malformed rows are
//! skipped and counted, never fatal to the scan.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use skill_storage::{decode_vector, RawVector, SkillRepository};

use crate::error::VectorError;
use crate::ranking::cosine_similarity;
use crate::store::{
    all_finite, Backend, SearchFilter, UpsertStats, VectorMatch, VectorRecord, VectorStore,
};

/// Per-scan counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanStats {
    pub scanned: usize,
    pub filtered_out: usize,
    pub malformed: usize,
    pub dimension_mismatch: usize,
}

/// Linear-scan vector store over a [`SkillRepository`].
pub struct LinearScanStore {
    repo: Arc<dyn SkillRepository>,
    dimension: usize,
}

impl LinearScanStore {
    pub fn new(repo: Arc<dyn SkillRepository>, dimension: usize) -> Self {
        Self { repo, dimension }
    }

    /// Score every stored vector passing `filter`.
    ///
    /// Returns all scored matches (unsorted) plus scan counters.
    pub fn scan(
        repo: &dyn SkillRepository,
        query: &[f32],
        filter: &SearchFilter,
    ) -> Result<(Vec<VectorMatch>, ScanStats), VectorError> {
        let mut stats = ScanStats::default();
        let mut matches = Vec::new();

        for raw in repo.raw_vectors(filter.item_type)? {
            stats.scanned += 1;
            if !filter.matches(raw.item_type, &raw.metadata) {
                stats.filtered_out += 1;
                continue;
            }

            let values = match decode_vector(&raw.bytes) {
                Some(values) if all_finite(&values) => values,
                _ => {
                    stats.malformed += 1;
                    continue;
                }
            };

            let Some(score) = cosine_similarity(query, &values) else {
                stats.dimension_mismatch += 1;
                continue;
            };

            matches.push(VectorMatch {
                id: raw.item_id,
                item_type: raw.item_type,
                score,
                metadata: raw.metadata,
            });
        }

        Ok((matches, stats))
    }
}

#[async_trait]
impl VectorStore for LinearScanStore {
    async fn query(
        &self,
        embedding: &[f32],
        top_k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<VectorMatch>, VectorError> {
        let repo = Arc::clone(&self.repo);
        let query = embedding.to_vec();
        let filter = filter.clone();

        let (mut matches, stats) =
            tokio::task::spawn_blocking(move || Self::scan(repo.as_ref(), &query, &filter))
                .await??;

        if stats.malformed > 0 || stats.dimension_mismatch > 0 {
            warn!(
                malformed = stats.malformed,
                dimension_mismatch = stats.dimension_mismatch,
                "Skipped unusable stored vectors"
            );
        }

        matches.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.id.cmp(&b.id))
        });
        matches.truncate(top_k);

        debug!(
            scanned = stats.scanned,
            filtered_out = stats.filtered_out,
            found = matches.len(),
            "Linear scan complete"
        );
        Ok(matches)
    }

    async fn upsert(&self, batch: &[VectorRecord]) -> Result<UpsertStats, VectorError> {
        let repo = Arc::clone(&self.repo);
        let dimension = self.dimension;
        let batch = batch.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut stats = UpsertStats::default();
            for record in batch {
                if record.values.len() != dimension || !all_finite(&record.values) {
                    warn!(item_id = %record.item_id, dim = record.values.len(), "Rejecting vector");
                    stats.skipped += 1;
                    continue;
                }
                let raw = RawVector::new(
                    record.item_id,
                    record.item_type,
                    record.version,
                    &record.values,
                    record.metadata,
                );
                repo.put_raw_vector(&raw)?;
                stats.written += 1;
            }
            Ok::<_, VectorError>(stats)
        })
        .await?
    }

    async fn health(&self) -> bool {
        let repo = Arc::clone(&self.repo);
        tokio::task::spawn_blocking(move || repo.count_skills().is_ok())
            .await
            .unwrap_or(false)
    }

    fn backend(&self) -> Backend {
        Backend::LinearScan
    }
}
