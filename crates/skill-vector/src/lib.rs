//! # skill-vector
//!
//! Similarity search over skill embeddings.
//!
//! ## Features
//! - `VectorStore` trait with two backends:
//!   - `IndexedVectorStore`: usearch HNSW index (approximate, primary)
//!   - `LinearScanStore`: brute-force cosine over stored raw vectors (secondary)
//! - `CompositeVectorStore`: primary under a timeout, automatic fallback,
//!   provenance on every result
//! - `Ranker`: clamped cosine scores with experience boost and stable ordering

pub mod composite;
pub mod error;
pub mod indexed;
pub mod linear;
pub mod ranking;
pub mod store;

pub use composite::{CompositeVectorStore, HealthReport, SearchOutcome, UpsertOutcome};
pub use error::VectorError;
pub use indexed::{IndexedStoreConfig, IndexedVectorStore, VectorEntry, CF_VECTOR_IDS, CF_VECTOR_META};
pub use linear::LinearScanStore;
pub use ranking::{clamp_similarity, cosine_similarity, QueryShape, Ranker, ScoredMatch};
pub use store::{Backend, SearchFilter, UpsertStats, VectorMatch, VectorRecord, VectorStore};
