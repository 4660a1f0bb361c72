//! Reindexing for the skill engine.
//!
//! Rebuilds stored embeddings from skill records without blocking queries.
//!
//! ## Key Components
//!
//! - [`ReindexJob`]: batched, resumable embedding rebuild
//! - [`ReindexCheckpoint`]: per-item-type progress persisted in the KV store
//! - [`ReindexLock`]: exclusive TTL lock so only one job runs per item type
//! - [`IndexingError`]: error types, including `Conflict` for a held lock
//!
//! ## Example
//!
//! ```ignore
//! use skill_indexing::{ReindexJob, ReindexOptions};
//!
//! let job = ReindexJob::new(repo, kv, embedder, vectors, settings.indexing.clone());
//! let report = job.run(ReindexOptions { max_batches: Some(10), ..Default::default() }).await?;
//! if !report.completed {
//!     // Run again later; the job resumes at report.next_offset
//! }
//! ```

pub mod checkpoint;
pub mod error;
pub mod job;
pub mod lock;

pub use checkpoint::{FailedBatch, ReindexCheckpoint};
pub use error::IndexingError;
pub use job::{ReindexJob, ReindexOptions, ReindexReport};
pub use lock::ReindexLock;
