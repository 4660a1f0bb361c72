//! Batched reindex job.
//!
//! Records are read in id order, `batch_size` at a time, embedded on the
//! blocking pool and written through the composite vector store. The
//! checkpoint is saved after every batch. A failed batch is recorded and
//! skipped; once more than `max_consecutive_failures` batches fail in a row
//! the job stops and rewinds the checkpoint to the first batch of that run,
//! so the next run retries them.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use skill_embeddings::{EmbeddingError, EmbeddingModel};
use skill_storage::{KeyValueStore, SkillRepository};
use skill_types::{IndexingConfig, ItemType, SkillRecord};
use skill_vector::{CompositeVectorStore, UpsertStats, VectorRecord};
use tracing::{info, instrument, warn};
use ulid::Ulid;

use crate::checkpoint::ReindexCheckpoint;
use crate::error::IndexingError;
use crate::lock::ReindexLock;

/// Options for a single reindex run.
#[derive(Debug, Clone, Default)]
pub struct ReindexOptions {
    pub item_type: ItemType,
    /// Batch size for a new generation; a resumed job keeps its own
    pub batch_size: Option<usize>,
    /// Stop after this many batches (the checkpoint allows resuming)
    pub max_batches: Option<usize>,
    /// Discard any checkpoint and start a new version
    pub fresh: bool,
}

/// Outcome of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReindexReport {
    pub job_id: String,
    pub item_type: ItemType,
    pub version: u64,
    /// True if this run continued an interrupted job
    pub resumed: bool,
    pub batches_run: usize,
    pub items_indexed: usize,
    /// Vectors rejected by the store (bad dimension, non-finite values)
    pub items_skipped: usize,
    pub failed_batches: usize,
    pub next_offset: usize,
    pub total_items: usize,
    pub completed: bool,
}

pub struct ReindexJob {
    repo: Arc<dyn SkillRepository>,
    kv: Arc<dyn KeyValueStore>,
    embedder: Arc<dyn EmbeddingModel>,
    vectors: Arc<CompositeVectorStore>,
    config: IndexingConfig,
}

impl ReindexJob {
    pub fn new(
        repo: Arc<dyn SkillRepository>,
        kv: Arc<dyn KeyValueStore>,
        embedder: Arc<dyn EmbeddingModel>,
        vectors: Arc<CompositeVectorStore>,
        config: IndexingConfig,
    ) -> Self {
        Self {
            repo,
            kv,
            embedder,
            vectors,
            config,
        }
    }

    /// Saved progress for an item type, if any
    pub fn status(&self, item_type: ItemType) -> Result<Option<ReindexCheckpoint>, IndexingError> {
        ReindexCheckpoint::load(self.kv.as_ref(), item_type)
    }

    #[instrument(skip(self), fields(item_type = %options.item_type))]
    pub async fn run(&self, options: ReindexOptions) -> Result<ReindexReport, IndexingError> {
        let item_type = options.item_type;
        let lock = ReindexLock::acquire(
            self.kv.clone(),
            item_type,
            Duration::from_secs(self.config.lock_ttl_secs),
        )?;

        let (mut checkpoint, resumed) = self.start(&options)?;
        info!(
            job_id = %checkpoint.job_id,
            version = checkpoint.version,
            offset = checkpoint.next_offset,
            resumed,
            owner = lock.owner(),
            "Reindex started"
        );

        let mut report = ReindexReport {
            job_id: checkpoint.job_id.clone(),
            item_type,
            version: checkpoint.version,
            resumed,
            batches_run: 0,
            items_indexed: 0,
            items_skipped: 0,
            failed_batches: 0,
            next_offset: checkpoint.next_offset,
            total_items: checkpoint.total_items,
            completed: false,
        };

        let mut consecutive_failures = 0;
        let mut failure_run_start = checkpoint.next_offset;

        loop {
            if options.max_batches.is_some_and(|max| report.batches_run >= max) {
                if self.repo.count_skills()? <= checkpoint.next_offset {
                    checkpoint.mark_completed();
                    checkpoint.save(self.kv.as_ref())?;
                }
                break;
            }

            let records = self
                .repo
                .list_skills(checkpoint.next_offset, checkpoint.batch_size)?;
            if records.is_empty() {
                checkpoint.mark_completed();
                checkpoint.save(self.kv.as_ref())?;
                break;
            }

            let size = records.len();
            report.batches_run += 1;

            match self.index_batch(records, item_type, checkpoint.version).await {
                Ok(stats) => {
                    consecutive_failures = 0;
                    report.items_indexed += stats.written;
                    report.items_skipped += stats.skipped;
                    checkpoint.record_success(size);
                }
                Err(e) => {
                    if consecutive_failures == 0 {
                        failure_run_start = checkpoint.next_offset;
                    }
                    consecutive_failures += 1;
                    report.failed_batches += 1;
                    warn!(offset = checkpoint.next_offset, size, error = %e, "Reindex batch failed");
                    checkpoint.record_failure(size, e.to_string());
                }
            }

            if consecutive_failures > self.config.max_consecutive_failures {
                let keep = checkpoint.failed_batches.len() - consecutive_failures;
                checkpoint.failed_batches.truncate(keep);
                checkpoint.next_offset = failure_run_start;
                checkpoint.save(self.kv.as_ref())?;
                warn!(
                    failures = consecutive_failures,
                    next_offset = failure_run_start,
                    "Reindex aborted"
                );
                return Err(IndexingError::Aborted {
                    failures: consecutive_failures,
                    next_offset: failure_run_start,
                });
            }

            checkpoint.save(self.kv.as_ref())?;
        }

        report.next_offset = checkpoint.next_offset;
        report.completed = checkpoint.completed;
        info!(
            batches = report.batches_run,
            indexed = report.items_indexed,
            failed = report.failed_batches,
            completed = report.completed,
            "Reindex finished"
        );

        lock.release()?;
        Ok(report)
    }

    /// Resume an unfinished checkpoint or start a new generation.
    fn start(&self, options: &ReindexOptions) -> Result<(ReindexCheckpoint, bool), IndexingError> {
        let existing = ReindexCheckpoint::load(self.kv.as_ref(), options.item_type)?;

        match existing {
            Some(checkpoint) if !checkpoint.completed && !options.fresh => Ok((checkpoint, true)),
            previous => {
                if let Some(old) = &previous {
                    if !old.completed {
                        info!(job_id = %old.job_id, offset = old.next_offset, "Discarding unfinished checkpoint");
                        ReindexCheckpoint::discard(self.kv.as_ref(), options.item_type)?;
                    }
                }
                let version = previous.map_or(1, |c| c.version + 1);
                let batch_size = options
                    .batch_size
                    .unwrap_or(self.config.batch_size)
                    .max(1);
                let checkpoint = ReindexCheckpoint::new(
                    Ulid::new().to_string(),
                    options.item_type,
                    version,
                    batch_size,
                    self.repo.count_skills()?,
                );
                checkpoint.save(self.kv.as_ref())?;
                Ok((checkpoint, false))
            }
        }
    }

    async fn index_batch(
        &self,
        records: Vec<SkillRecord>,
        item_type: ItemType,
        version: u64,
    ) -> Result<UpsertStats, IndexingError> {
        let embedder = Arc::clone(&self.embedder);
        let texts: Vec<String> = records.iter().map(SkillRecord::embedding_text).collect();
        let embeddings = tokio::task::spawn_blocking(move || embedder.embed_texts(&texts)).await??;

        if embeddings.len() != records.len() {
            return Err(EmbeddingError::Parse(format!(
                "expected {} embeddings, got {}",
                records.len(),
                embeddings.len()
            ))
            .into());
        }

        let batch: Vec<VectorRecord> = records
            .iter()
            .zip(embeddings)
            .map(|(record, embedding)| VectorRecord {
                item_id: record.id.clone(),
                item_type,
                version,
                values: embedding.values,
                metadata: record.snapshot(),
            })
            .collect();

        let outcome = self.vectors.upsert(&batch).await?;
        Ok(outcome.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use skill_embeddings::{Embedding, HashEmbedder, ModelInfo};
    use skill_storage::Storage;
    use skill_types::ProficiencyLevel;
    use skill_vector::{IndexedStoreConfig, IndexedVectorStore, LinearScanStore, VectorStore};
    use tempfile::TempDir;

    const DIM: usize = 32;

    /// Hash embedder that logs its input and fails on demand
    struct RecordingEmbedder {
        inner: HashEmbedder,
        seen: Mutex<Vec<String>>,
        fail_all: AtomicBool,
    }

    impl RecordingEmbedder {
        fn new() -> Self {
            Self {
                inner: HashEmbedder::new(DIM),
                seen: Mutex::new(Vec::new()),
                fail_all: AtomicBool::new(false),
            }
        }

        fn take_seen(&self) -> Vec<String> {
            std::mem::take(&mut *self.seen.lock().unwrap())
        }
    }

    impl EmbeddingModel for RecordingEmbedder {
        fn info(&self) -> &ModelInfo {
            self.inner.info()
        }

        fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
            if self.fail_all.load(Ordering::SeqCst) || text.contains("BROKEN") {
                return Err(EmbeddingError::Http("connection reset".into()));
            }
            self.seen.lock().unwrap().push(text.to_string());
            self.inner.embed(text)
        }
    }

    struct Fixture {
        job: ReindexJob,
        storage: Arc<Storage>,
        embedder: Arc<RecordingEmbedder>,
        _temp: TempDir,
    }

    fn fixture(records: usize, config: IndexingConfig) -> Fixture {
        let temp = TempDir::new().unwrap();
        let storage = Arc::new(Storage::open(temp.path()).unwrap());
        for i in 0..records {
            let record = SkillRecord::new(
                format!("skill-{i:02}"),
                format!("Skill {i}"),
                "Languages",
                i as f32,
                ProficiencyLevel::Advanced,
            );
            storage.put_skill(&record).unwrap();
        }

        let primary: Arc<dyn VectorStore> =
            Arc::new(IndexedVectorStore::open(IndexedStoreConfig::unconfigured(DIM)).unwrap());
        let secondary: Arc<dyn VectorStore> = Arc::new(LinearScanStore::new(storage.clone(), DIM));
        let vectors = Arc::new(CompositeVectorStore::new(
            primary,
            secondary,
            Duration::from_millis(500),
            Duration::from_secs(2),
        ));

        let embedder = Arc::new(RecordingEmbedder::new());
        let job = ReindexJob::new(storage.clone(), storage.clone(), embedder.clone(), vectors, config);

        Fixture {
            job,
            storage,
            embedder,
            _temp: temp,
        }
    }

    fn small_batches() -> IndexingConfig {
        IndexingConfig {
            batch_size: 2,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_full_run_indexes_everything() {
        let fx = fixture(5, IndexingConfig::default());
        let report = fx.job.run(ReindexOptions::default()).await.unwrap();

        assert!(report.completed);
        assert!(!report.resumed);
        assert_eq!(report.version, 1);
        assert_eq!(report.items_indexed, 5);
        assert_eq!(report.batches_run, 1);

        let vectors = fx.storage.raw_vectors(ItemType::Skill).unwrap();
        assert_eq!(vectors.len(), 5);
        assert!(vectors.iter().all(|v| v.version == 1));
    }

    #[tokio::test]
    async fn test_resumes_after_interruption() {
        let fx = fixture(10, small_batches());

        let first = fx
            .job
            .run(ReindexOptions {
                max_batches: Some(2),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(!first.completed);
        assert_eq!(first.next_offset, 4);
        assert_eq!(fx.embedder.take_seen().len(), 4);

        let saved = fx.job.status(ItemType::Skill).unwrap().unwrap();
        assert_eq!(saved.batches_completed, 2);
        assert!(!saved.completed);

        let second = fx.job.run(ReindexOptions::default()).await.unwrap();
        assert!(second.resumed);
        assert!(second.completed);
        assert_eq!(second.batches_run, 3);
        assert_eq!(second.job_id, first.job_id);
        assert_eq!(second.version, first.version);

        let seen = fx.embedder.take_seen();
        assert_eq!(seen.len(), 6);
        assert!(seen[0].starts_with("Skill 4 "));
        assert_eq!(fx.storage.raw_vectors(ItemType::Skill).unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_failed_batch_is_skipped() {
        let fx = fixture(6, small_batches());
        let broken = SkillRecord::new("skill-03", "Skill 3", "Languages", 3.0, ProficiencyLevel::Advanced)
            .with_summary("BROKEN");
        fx.storage.put_skill(&broken).unwrap();

        let report = fx.job.run(ReindexOptions::default()).await.unwrap();
        assert!(report.completed);
        assert_eq!(report.failed_batches, 1);
        assert_eq!(report.items_indexed, 4);

        let saved = fx.job.status(ItemType::Skill).unwrap().unwrap();
        assert_eq!(saved.failed_batches.len(), 1);
        assert_eq!(saved.failed_batches[0].offset, 2);
    }

    #[tokio::test]
    async fn test_consecutive_failures_abort_and_rewind() {
        let fx = fixture(12, small_batches());
        fx.embedder.fail_all.store(true, Ordering::SeqCst);

        let err = fx.job.run(ReindexOptions::default()).await.unwrap_err();
        assert!(matches!(
            err,
            IndexingError::Aborted {
                failures: 4,
                next_offset: 0
            }
        ));

        let saved = fx.job.status(ItemType::Skill).unwrap().unwrap();
        assert_eq!(saved.next_offset, 0);
        assert!(saved.failed_batches.is_empty());

        // Lock was released on the error path
        fx.embedder.fail_all.store(false, Ordering::SeqCst);
        let report = fx.job.run(ReindexOptions::default()).await.unwrap();
        assert!(report.resumed);
        assert!(report.completed);
        assert_eq!(report.items_indexed, 12);
    }

    #[tokio::test]
    async fn test_fresh_starts_new_version() {
        let fx = fixture(3, IndexingConfig::default());
        fx.job.run(ReindexOptions::default()).await.unwrap();

        let report = fx
            .job
            .run(ReindexOptions {
                fresh: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(report.version, 2);
        assert!(fx
            .storage
            .raw_vectors(ItemType::Skill)
            .unwrap()
            .iter()
            .all(|v| v.version == 2));
    }

    #[tokio::test]
    async fn test_fresh_discards_unfinished_checkpoint() {
        let fx = fixture(3, IndexingConfig::default());
        let interrupted = fx
            .job
            .run(ReindexOptions {
                batch_size: Some(1),
                max_batches: Some(1),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(!interrupted.completed);

        let report = fx
            .job
            .run(ReindexOptions {
                fresh: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(!report.resumed);
        assert!(report.completed);
        assert_ne!(report.job_id, interrupted.job_id);
        assert_eq!(report.version, 2);
        assert_eq!(report.items_indexed, 3);

        let saved = fx.job.status(ItemType::Skill).unwrap().unwrap();
        assert_eq!(saved.job_id, report.job_id);
    }

    #[tokio::test]
    async fn test_running_job_conflicts() {
        let fx = fixture(3, IndexingConfig::default());
        let kv: Arc<dyn KeyValueStore> = fx.storage.clone();
        let _held = ReindexLock::acquire(kv, ItemType::Skill, Duration::from_secs(60)).unwrap();

        let err = fx.job.run(ReindexOptions::default()).await.unwrap_err();
        assert!(matches!(err, IndexingError::Conflict { .. }));
        assert!(fx.embedder.take_seen().is_empty());
    }
}
