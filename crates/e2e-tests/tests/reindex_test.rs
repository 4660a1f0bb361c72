//! Reindex E2E tests.
//!
//! A reindex interrupted after a few batches resumes from its checkpoint,
//! and the exclusive lock keeps a second job out while one is running.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;

use e2e_tests::{numbered_records, sample_records, TestHarness};
use skill_indexing::{IndexingError, ReindexLock, ReindexOptions};
use skill_llm::MockCompleter;
use skill_types::ItemType;

fn options(max_batches: Option<usize>) -> ReindexOptions {
    ReindexOptions {
        batch_size: Some(4),
        max_batches,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_interrupted_reindex_resumes() {
    let harness = TestHarness::new();
    harness.seed(&numbered_records(20));
    let job = harness.reindex_job(harness.default_vectors());

    let first = job.run(options(Some(2))).await.unwrap();
    assert!(!first.resumed);
    assert!(!first.completed);
    assert_eq!(first.batches_run, 2);
    assert_eq!(first.next_offset, 8);
    assert_eq!(first.total_items, 20);
    assert_eq!(harness.storage.count_vectors(ItemType::Skill).unwrap(), 8);

    let checkpoint = job.status(ItemType::Skill).unwrap().unwrap();
    assert_eq!(checkpoint.next_offset, 8);
    assert_eq!(checkpoint.batches_completed, 2);

    let second = job.run(options(None)).await.unwrap();
    assert!(second.resumed);
    assert!(second.completed);
    assert_eq!(second.job_id, first.job_id);
    assert_eq!(second.version, first.version);
    assert_eq!(second.batches_run, 3);
    assert_eq!(second.items_indexed, 12);
    assert_eq!(second.next_offset, 20);
    assert_eq!(harness.storage.count_vectors(ItemType::Skill).unwrap(), 20);
}

#[tokio::test]
async fn test_completed_reindex_starts_new_version() {
    let harness = TestHarness::new();
    harness.seed(&numbered_records(6));
    let job = harness.reindex_job(harness.default_vectors());

    let first = job.run(options(None)).await.unwrap();
    assert!(first.completed);
    assert_eq!(first.version, 1);

    let second = job.run(options(None)).await.unwrap();
    assert!(!second.resumed);
    assert_eq!(second.version, 2);
    assert_ne!(second.job_id, first.job_id);
    assert_eq!(second.items_indexed, 6);
}

#[tokio::test]
async fn test_held_lock_rejects_second_job() {
    let harness = TestHarness::new();
    harness.seed(&numbered_records(4));
    let job = harness.reindex_job(harness.default_vectors());

    let lock = ReindexLock::acquire(harness.storage.clone(), ItemType::Skill, Duration::from_secs(60)).unwrap();
    let err = job.run(options(None)).await.unwrap_err();
    assert!(matches!(err, IndexingError::Conflict { item_type: ItemType::Skill }));

    // Nothing was written while the lock was held
    assert_eq!(harness.storage.count_vectors(ItemType::Skill).unwrap(), 0);
    assert!(job.status(ItemType::Skill).unwrap().is_none());

    assert!(lock.release().unwrap());
    let report = job.run(options(None)).await.unwrap();
    assert!(report.completed);
}

#[tokio::test]
async fn test_reindexed_records_are_searchable() {
    let harness = TestHarness::new();
    harness.seed(&sample_records());
    let vectors = harness.default_vectors();

    harness
        .reindex_job(vectors.clone())
        .run(ReindexOptions::default())
        .await
        .unwrap();

    let response = harness
        .orchestrator_with(vectors, Arc::new(MockCompleter::default()))
        .answer_query("What is your experience with Python?", None)
        .await
        .unwrap();
    assert_eq!(response.matches.len(), 5);
    assert_eq!(response.matches[0].record.name, "Python");
}
