//! End-to-end test infrastructure for the skill engine.
//!
//! Provides a shared TestHarness and helper functions for E2E tests
//! covering the full question-to-reply pipeline.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use skill_embeddings::{EmbeddingModel, HashEmbedder};
use skill_indexing::ReindexJob;
use skill_llm::CompletionModel;
use skill_query::{PipelineParts, QueryOrchestrator};
use skill_storage::{RawVector, SkillRepository, Storage};
use skill_types::{ItemType, ProficiencyLevel, Settings, SkillRecord};
use skill_vector::{
    Backend, CompositeVectorStore, IndexedStoreConfig, IndexedVectorStore, LinearScanStore,
    SearchFilter, UpsertStats, VectorError, VectorMatch, VectorRecord, VectorStore,
};

/// Embedding dimension used by every harness
pub const TEST_DIMENSION: usize = 64;

/// Shared test harness for E2E tests.
///
/// Owns a temp directory with RocksDB storage, a hash embedder and the
/// settings every component is built from.
pub struct TestHarness {
    /// Keeps temp dir alive for the lifetime of the harness
    pub _temp_dir: tempfile::TempDir,
    /// Shared storage instance (records, raw vectors, KV)
    pub storage: Arc<Storage>,
    pub embedder: Arc<HashEmbedder>,
    /// Path for the HNSW index, used only by tests that configure it
    pub vector_index_path: PathBuf,
    pub settings: Settings,
}

impl TestHarness {
    /// Create a new test harness with default settings.
    pub fn new() -> Self {
        Self::with_settings(Settings::default())
    }

    /// Create a harness; storage paths and the dimension are overridden.
    pub fn with_settings(mut settings: Settings) -> Self {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let storage =
            Arc::new(Storage::open(&temp_dir.path().join("db")).expect("Failed to open test storage"));
        let vector_index_path = temp_dir.path().join("vector-index");

        settings.vector.dimension = TEST_DIMENSION;
        settings.vector.index_path = None;

        Self {
            _temp_dir: temp_dir,
            storage,
            embedder: Arc::new(HashEmbedder::new(TEST_DIMENSION)),
            vector_index_path,
            settings,
        }
    }

    /// Store records without embeddings.
    pub fn seed(&self, records: &[SkillRecord]) {
        for record in records {
            self.storage.put_skill(record).expect("Failed to put skill");
        }
    }

    /// Store records and their hash embeddings (version 1).
    pub fn seed_and_embed(&self, records: &[SkillRecord]) {
        self.seed(records);
        for record in records {
            let embedding = self
                .embedder
                .embed(&record.embedding_text())
                .expect("Failed to embed record");
            self.put_vector(record, embedding.as_slice());
        }
    }

    /// Store a record with an explicit vector.
    pub fn seed_with_vector(&self, record: &SkillRecord, values: &[f32]) {
        self.seed(std::slice::from_ref(record));
        self.put_vector(record, values);
    }

    fn put_vector(&self, record: &SkillRecord, values: &[f32]) {
        self.storage
            .put_raw_vector(&RawVector::new(
                record.id.clone(),
                ItemType::Skill,
                1,
                values,
                record.snapshot(),
            ))
            .expect("Failed to put raw vector");
    }

    /// Hash embedding of `text`
    pub fn embed(&self, text: &str) -> Vec<f32> {
        self.embedder
            .embed(text)
            .expect("Failed to embed text")
            .values
    }

    pub fn linear_store(&self) -> Arc<dyn VectorStore> {
        Arc::new(LinearScanStore::new(self.storage.clone(), TEST_DIMENSION))
    }

    /// Primary that is not configured, so every search uses the linear scan.
    pub fn unconfigured_index() -> Arc<dyn VectorStore> {
        Arc::new(
            IndexedVectorStore::open(IndexedStoreConfig::unconfigured(TEST_DIMENSION))
                .expect("Failed to create unconfigured index"),
        )
    }

    /// HNSW index under the harness temp dir
    pub fn configured_index(&self) -> Arc<dyn VectorStore> {
        let config = IndexedStoreConfig::new(TEST_DIMENSION, &self.vector_index_path).with_capacity(64);
        Arc::new(IndexedVectorStore::open(config).expect("Failed to open vector index"))
    }

    pub fn composite(
        &self,
        primary: Arc<dyn VectorStore>,
        secondary: Arc<dyn VectorStore>,
    ) -> Arc<CompositeVectorStore> {
        Arc::new(CompositeVectorStore::new(
            primary,
            secondary,
            Duration::from_millis(self.settings.vector.primary_timeout_ms),
            Duration::from_millis(self.settings.vector.fallback_timeout_ms),
        ))
    }

    /// Unconfigured primary + linear scan secondary
    pub fn default_vectors(&self) -> Arc<CompositeVectorStore> {
        self.composite(Self::unconfigured_index(), self.linear_store())
    }

    pub fn orchestrator(&self, completer: Arc<dyn CompletionModel>) -> QueryOrchestrator {
        self.orchestrator_with(self.default_vectors(), completer)
    }

    pub fn orchestrator_with(
        &self,
        vectors: Arc<CompositeVectorStore>,
        completer: Arc<dyn CompletionModel>,
    ) -> QueryOrchestrator {
        QueryOrchestrator::new(
            &self.settings,
            PipelineParts {
                embedder: self.embedder.clone(),
                vectors,
                repo: self.storage.clone(),
                kv: self.storage.clone(),
                completer,
            },
        )
        .expect("Failed to build orchestrator")
    }

    pub fn reindex_job(&self, vectors: Arc<CompositeVectorStore>) -> ReindexJob {
        ReindexJob::new(
            self.storage.clone(),
            self.storage.clone(),
            self.embedder.clone(),
            vectors,
            self.settings.indexing.clone(),
        )
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Unit vector whose cosine similarity with `query` is `similarity`.
///
/// Built from `query` and a unit vector orthogonal to it.
pub fn vector_with_similarity(query: &[f32], similarity: f32) -> Vec<f32> {
    let norm = |v: &[f32]| v.iter().map(|x| x * x).sum::<f32>().sqrt();
    let q_norm = norm(query);
    let q: Vec<f32> = query.iter().map(|x| x / q_norm).collect();

    // Pick the basis axis least aligned with q and orthogonalize it
    let axis = q
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
        .map(|(i, _)| i)
        .unwrap_or(0);
    let mut u: Vec<f32> = (0..q.len()).map(|i| if i == axis { 1.0 } else { 0.0 }).collect();
    let dot: f32 = u.iter().zip(&q).map(|(a, b)| a * b).sum();
    for (ui, qi) in u.iter_mut().zip(&q) {
        *ui -= dot * qi;
    }
    let u_norm = norm(&u);

    let ortho = (1.0 - similarity * similarity).max(0.0).sqrt();
    q.iter()
        .zip(&u)
        .map(|(qi, ui)| similarity * qi + ortho * ui / u_norm)
        .collect()
}

/// A small, varied set of skill records.
pub fn sample_records() -> Vec<SkillRecord> {
    vec![
        SkillRecord::new("python", "Python", "Languages", 12.0, ProficiencyLevel::Advanced)
            .with_summary("Python services, Python data pipelines and Python tooling")
            .with_impact(
                "Rebuilt the ingestion service in Python",
                "Cut processing latency",
                "40% faster p99",
            )
            .with_employer("Acme"),
        SkillRecord::new("postgres", "PostgreSQL", "Databases", 8.0, ProficiencyLevel::Intermediate)
            .with_summary("Relational databases, schema design and query tuning")
            .with_employer("Acme"),
        SkillRecord::new("redis", "Redis", "Databases", 3.0, ProficiencyLevel::Intermediate)
            .with_summary("Caching databases and rate limiting")
            .with_employer("Globex"),
        SkillRecord::new("rust", "Rust", "Languages", 5.0, ProficiencyLevel::Advanced)
            .with_summary("Rust command-line tools and storage engines")
            .with_project("Skill Engine"),
        SkillRecord::new("kubernetes", "Kubernetes", "Infrastructure", 16.0, ProficiencyLevel::Expert)
            .with_summary("Kubernetes clusters and deployment automation")
            .with_employer("Initech"),
    ]
}

/// `count` records with ids `skill-000`, `skill-001`, ... in id order
pub fn numbered_records(count: usize) -> Vec<SkillRecord> {
    (0..count)
        .map(|i| {
            SkillRecord::new(
                format!("skill-{i:03}"),
                format!("Skill {i}"),
                "Languages",
                (i % 20) as f32,
                ProficiencyLevel::Advanced,
            )
            .with_summary(format!("Work on system number {i}"))
        })
        .collect()
}

/// Vector store that always fails, optionally after hanging.
pub struct BrokenStore {
    pub backend: Backend,
    pub hang: bool,
}

impl BrokenStore {
    pub fn failing(backend: Backend) -> Arc<dyn VectorStore> {
        Arc::new(Self {
            backend,
            hang: false,
        })
    }

    pub fn hanging(backend: Backend) -> Arc<dyn VectorStore> {
        Arc::new(Self {
            backend,
            hang: true,
        })
    }
}

#[async_trait]
impl VectorStore for BrokenStore {
    async fn query(
        &self,
        _embedding: &[f32],
        _top_k: usize,
        _filter: &SearchFilter,
    ) -> Result<Vec<VectorMatch>, VectorError> {
        if self.hang {
            std::future::pending::<()>().await;
        }
        Err(VectorError::Index("backend offline".to_string()))
    }

    async fn upsert(&self, _batch: &[VectorRecord]) -> Result<UpsertStats, VectorError> {
        Err(VectorError::Index("backend offline".to_string()))
    }

    async fn health(&self) -> bool {
        false
    }

    fn backend(&self) -> Backend {
        self.backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skill_vector::cosine_similarity;

    #[test]
    fn test_vector_with_similarity() {
        let harness = TestHarness::new();
        let query = harness.embed("What is your experience with Python?");
        for target in [0.0, 0.42, 0.78, 0.82, 1.0] {
            let v = vector_with_similarity(&query, target);
            let actual = cosine_similarity(&query, &v).unwrap();
            assert!((actual - target).abs() < 1e-4, "target {target}, got {actual}");
        }
    }
}
