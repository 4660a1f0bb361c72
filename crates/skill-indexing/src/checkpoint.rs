//! Reindex checkpoints.
//!
//! One checkpoint per item type, stored as JSON in the key-value store at
//! `reindex:checkpoint:{item_type}`. It is rewritten after every batch so an
//! interrupted job resumes at `next_offset` without reprocessing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use skill_storage::KeyValueStore;
use skill_types::ItemType;

use crate::error::IndexingError;

/// A batch that failed and was skipped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedBatch {
    pub offset: usize,
    pub size: usize,
    pub error: String,
}

/// Progress of one reindex generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReindexCheckpoint {
    pub job_id: String,
    pub item_type: ItemType,

    /// Generation stamped on every vector this job writes
    pub version: u64,

    /// Offset of the first record not yet processed
    pub next_offset: usize,
    pub batch_size: usize,
    pub total_items: usize,
    pub batches_completed: usize,

    #[serde(default)]
    pub failed_batches: Vec<FailedBatch>,

    pub completed: bool,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

impl ReindexCheckpoint {
    pub fn new(
        job_id: impl Into<String>,
        item_type: ItemType,
        version: u64,
        batch_size: usize,
        total_items: usize,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            item_type,
            version,
            next_offset: 0,
            batch_size,
            total_items,
            batches_completed: 0,
            failed_batches: Vec::new(),
            completed: false,
            updated_at: Utc::now(),
        }
    }

    pub fn key(item_type: ItemType) -> String {
        format!("reindex:checkpoint:{item_type}")
    }

    /// Advance past a successfully indexed batch
    pub fn record_success(&mut self, size: usize) {
        self.next_offset += size;
        self.batches_completed += 1;
        self.updated_at = Utc::now();
    }

    /// Record a failed batch and skip it
    pub fn record_failure(&mut self, size: usize, error: impl Into<String>) {
        self.failed_batches.push(FailedBatch {
            offset: self.next_offset,
            size,
            error: error.into(),
        });
        self.next_offset += size;
        self.updated_at = Utc::now();
    }

    pub fn mark_completed(&mut self) {
        self.completed = true;
        self.updated_at = Utc::now();
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, IndexingError> {
        serde_json::to_vec(self).map_err(IndexingError::from)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IndexingError> {
        serde_json::from_slice(bytes).map_err(IndexingError::from)
    }

    pub fn load(kv: &dyn KeyValueStore, item_type: ItemType) -> Result<Option<Self>, IndexingError> {
        match kv.get(&Self::key(item_type))? {
            Some(bytes) => Ok(Some(Self::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn save(&self, kv: &dyn KeyValueStore) -> Result<(), IndexingError> {
        kv.put_with_ttl(&Self::key(self.item_type), &self.to_bytes()?, None)?;
        Ok(())
    }

    pub fn discard(kv: &dyn KeyValueStore, item_type: ItemType) -> Result<bool, IndexingError> {
        Ok(kv.delete(&Self::key(item_type))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skill_storage::MemoryKvStore;

    #[test]
    fn test_key_format() {
        assert_eq!(ReindexCheckpoint::key(ItemType::Skill), "reindex:checkpoint:skill");
    }

    #[test]
    fn test_progress_accounting() {
        let mut checkpoint = ReindexCheckpoint::new("job", ItemType::Skill, 3, 10, 25);
        checkpoint.record_success(10);
        checkpoint.record_failure(10, "embedding timeout");
        checkpoint.record_success(5);

        assert_eq!(checkpoint.next_offset, 25);
        assert_eq!(checkpoint.batches_completed, 2);
        assert_eq!(checkpoint.failed_batches[0].offset, 10);
        assert_eq!(checkpoint.failed_batches[0].error, "embedding timeout");
        assert!(!checkpoint.completed);
    }

    #[test]
    fn test_persisted_in_kv() {
        let kv = MemoryKvStore::new();
        assert!(ReindexCheckpoint::load(&kv, ItemType::Skill).unwrap().is_none());

        let mut checkpoint = ReindexCheckpoint::new("job", ItemType::Skill, 1, 32, 64);
        checkpoint.record_success(32);
        checkpoint.save(&kv).unwrap();

        let loaded = ReindexCheckpoint::load(&kv, ItemType::Skill).unwrap().unwrap();
        assert_eq!(loaded.next_offset, 32);
        assert_eq!(loaded.job_id, "job");

        assert!(ReindexCheckpoint::discard(&kv, ItemType::Skill).unwrap());
        assert!(ReindexCheckpoint::load(&kv, ItemType::Skill).unwrap().is_none());
    }

    #[test]
    fn test_corrupt_checkpoint_is_an_error() {
        let kv = MemoryKvStore::new();
        kv.put_with_ttl("reindex:checkpoint:skill", b"{not json", None)
            .unwrap();
        assert!(matches!(
            ReindexCheckpoint::load(&kv, ItemType::Skill),
            Err(IndexingError::Serialization(_))
        ));
    }
}
