//! Primary backend: HNSW index via usearch.
//!
//! Parameters tuned for quality over speed:
//! - M = 16 (connections per layer)
//! - ef_construction = 200 (build-time quality)
//! - ef_search = 100 (search-time quality)
//!
//! usearch keys are internal u64 ids. A RocksDB key map next to the index
//! file links each id to its item and metadata snapshot.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

use skill_types::{ItemSnapshot, ItemType, VectorSettings};

use crate::error::VectorError;
use crate::store::{
    all_finite, Backend, SearchFilter, UpsertStats, VectorMatch, VectorRecord, VectorStore,
};

/// Column family: vector id (u64 BE) -> VectorEntry JSON
pub const CF_VECTOR_META: &str = "vector_meta";

/// Column family: `{item_type}:{item_id}` -> vector id (u64 BE)
pub const CF_VECTOR_IDS: &str = "vector_ids";

const INDEX_FILE: &str = "hnsw.usearch";
const KEYMAP_DIR: &str = "keymap";

/// Filtered queries fetch this many times `top_k` before filtering
const FILTER_OVERFETCH: usize = 4;

/// Key map entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorEntry {
    /// Internal vector ID (key in HNSW index)
    pub vector_id: u64,
    pub item_id: String,
    pub item_type: ItemType,
    /// Reindex generation that wrote this vector
    pub version: u64,
    pub metadata: ItemSnapshot,
}

/// HNSW index configuration
#[derive(Debug, Clone)]
pub struct IndexedStoreConfig {
    /// Index directory; `None` leaves the backend unconfigured
    pub index_path: Option<PathBuf>,
    /// Embedding dimension (must match model)
    pub dimension: usize,
    /// Number of connections per layer (M parameter)
    pub connectivity: usize,
    /// Build-time search depth (ef_construction)
    pub expansion_add: usize,
    /// Query-time search depth (ef_search)
    pub expansion_search: usize,
    /// Initial capacity (for pre-allocation)
    pub capacity: usize,
}

impl IndexedStoreConfig {
    pub fn new(dimension: usize, index_path: impl Into<PathBuf>) -> Self {
        Self {
            index_path: Some(index_path.into()),
            dimension,
            connectivity: 16,
            expansion_add: 200,
            expansion_search: 100,
            capacity: 10_000,
        }
    }

    pub fn unconfigured(dimension: usize) -> Self {
        Self {
            index_path: None,
            ..Self::new(dimension, PathBuf::new())
        }
    }

    pub fn from_settings(settings: &VectorSettings, index_path: Option<PathBuf>) -> Self {
        Self {
            index_path,
            dimension: settings.dimension,
            connectivity: settings.connectivity,
            expansion_add: settings.expansion_add,
            expansion_search: settings.expansion_search,
            capacity: settings.capacity,
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    fn index_options(&self) -> IndexOptions {
        IndexOptions {
            dimensions: self.dimension,
            metric: MetricKind::Cos, // Cosine similarity
            quantization: ScalarKind::F32,
            connectivity: self.connectivity,
            expansion_add: self.expansion_add,
            expansion_search: self.expansion_search,
            multi: false, // Single vector per key
        }
    }
}

/// RocksDB map between usearch keys and items.
struct KeyMap {
    db: DB,
    next_id: AtomicU64,
}

impl KeyMap {
    fn open(path: &Path) -> Result<Self, VectorError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cfs = vec![
            ColumnFamilyDescriptor::new(CF_VECTOR_META, Options::default()),
            ColumnFamilyDescriptor::new(CF_VECTOR_IDS, Options::default()),
        ];
        let db = DB::open_cf_descriptors(&opts, path, cfs)?;

        // Continue numbering after the highest stored id
        let next_id = {
            let cf = db
                .cf_handle(CF_VECTOR_META)
                .ok_or_else(|| VectorError::Index(format!("{CF_VECTOR_META} missing")))?;
            match db.iterator_cf(cf, IteratorMode::End).next() {
                Some(item) => {
                    let (key, _) = item?;
                    decode_id(&key)? + 1
                }
                None => 0,
            }
        };

        info!(path = ?path, next_id, "Opened vector key map");
        Ok(Self {
            db,
            next_id: AtomicU64::new(next_id),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily, VectorError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| VectorError::Index(format!("{name} missing")))
    }

    fn get(&self, vector_id: u64) -> Result<Option<VectorEntry>, VectorError> {
        match self.db.get_cf(self.cf(CF_VECTOR_META)?, vector_id.to_be_bytes())? {
            Some(bytes) => Ok(Some(
                serde_json::from_slice(&bytes)
                    .map_err(|e| VectorError::Serialization(e.to_string()))?,
            )),
            None => Ok(None),
        }
    }

    fn id_for(&self, item_type: ItemType, item_id: &str) -> Result<Option<u64>, VectorError> {
        let key = format!("{item_type}:{item_id}");
        match self.db.get_cf(self.cf(CF_VECTOR_IDS)?, key.as_bytes())? {
            Some(bytes) => Ok(Some(decode_id(&bytes)?)),
            None => Ok(None),
        }
    }

    fn allocate(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn put(&self, entry: &VectorEntry) -> Result<(), VectorError> {
        let value =
            serde_json::to_vec(entry).map_err(|e| VectorError::Serialization(e.to_string()))?;
        let id_key = format!("{}:{}", entry.item_type, entry.item_id);

        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf(CF_VECTOR_META)?, entry.vector_id.to_be_bytes(), value);
        batch.put_cf(
            self.cf(CF_VECTOR_IDS)?,
            id_key.as_bytes(),
            entry.vector_id.to_be_bytes(),
        );
        self.db.write(batch)?;
        Ok(())
    }
}

fn decode_id(bytes: &[u8]) -> Result<u64, VectorError> {
    let array: [u8; 8] = bytes
        .try_into()
        .map_err(|_| VectorError::Serialization(format!("bad vector id: {} bytes", bytes.len())))?;
    Ok(u64::from_be_bytes(array))
}

fn poisoned<T>(_: T) -> VectorError {
    VectorError::Index("index lock poisoned".to_string())
}

struct IndexInner {
    index: RwLock<Index>,
    keys: KeyMap,
    config: IndexedStoreConfig,
    index_file: PathBuf,
}

impl IndexInner {
    fn open(config: IndexedStoreConfig, dir: &Path) -> Result<Self, VectorError> {
        std::fs::create_dir_all(dir)?;
        let index_file = dir.join(INDEX_FILE);
        let options = config.index_options();

        let index = Index::new(&options).map_err(|e| VectorError::Index(e.to_string()))?;
        if index_file.exists() {
            info!(path = ?index_file, "Opening existing vector index");
            let path = index_file
                .to_str()
                .ok_or_else(|| VectorError::Index("Invalid path encoding".to_string()))?;
            index
                .load(path)
                .map_err(|e| VectorError::Index(format!("Failed to load: {}", e)))?;
        } else {
            info!(path = ?index_file, dim = config.dimension, "Creating new vector index");
            index
                .reserve(config.capacity)
                .map_err(|e| VectorError::Index(e.to_string()))?;
        }

        let keys = KeyMap::open(&dir.join(KEYMAP_DIR))?;

        Ok(Self {
            index: RwLock::new(index),
            keys,
            config,
            index_file,
        })
    }

    fn len(&self) -> Result<usize, VectorError> {
        Ok(self.index.read().map_err(poisoned)?.size())
    }

    fn search(
        &self,
        query: &[f32],
        top_k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<VectorMatch>, VectorError> {
        if query.len() != self.config.dimension {
            return Err(VectorError::DimensionMismatch {
                expected: self.config.dimension,
                actual: query.len(),
            });
        }

        let index = self.index.read().map_err(poisoned)?;
        let size = index.size();
        if size == 0 {
            return Err(VectorError::EmptyIndex);
        }

        let mut fetch = if filter.is_restrictive() {
            top_k.saturating_mul(FILTER_OVERFETCH)
        } else {
            top_k
        }
        .min(size);

        loop {
            let results = index
                .search(query, fetch)
                .map_err(|e| VectorError::Index(e.to_string()))?;
            let matches = self.collect_matches(&results.keys, &results.distances, top_k, filter)?;

            // Under-filled filtered result: widen to the whole index once
            if matches.len() < top_k && filter.is_restrictive() && fetch < size {
                debug!(fetch, found = matches.len(), "Filtered search under-filled, widening");
                fetch = size;
                continue;
            }

            debug!(top_k, fetched = results.keys.len(), found = matches.len(), "Index search complete");
            return Ok(matches);
        }
    }

    /// Resolve index hits through the key map and apply `filter`.
    fn collect_matches(
        &self,
        keys: &[u64],
        distances: &[f32],
        top_k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<VectorMatch>, VectorError> {
        let mut matches = Vec::with_capacity(top_k);
        for (&vector_id, &distance) in keys.iter().zip(distances.iter()) {
            let Some(entry) = self.keys.get(vector_id)? else {
                warn!(vector_id, "Index key without key map entry, skipping");
                continue;
            };
            if !filter.matches(entry.item_type, &entry.metadata) {
                continue;
            }
            matches.push(VectorMatch {
                id: entry.item_id,
                item_type: entry.item_type,
                score: 1.0 - distance, // Convert distance to similarity
                metadata: entry.metadata,
            });
            if matches.len() == top_k {
                break;
            }
        }
        Ok(matches)
    }

    #[allow(clippy::readonly_write_lock)] // usearch::Index uses interior mutability
    fn upsert(&self, batch: &[VectorRecord]) -> Result<UpsertStats, VectorError> {
        let index = self.index.write().map_err(poisoned)?;
        let needed = index.size() + batch.len();
        if needed > index.capacity() {
            index
                .reserve(needed.max(self.config.capacity))
                .map_err(|e| VectorError::Index(e.to_string()))?;
        }

        let mut stats = UpsertStats::default();
        for record in batch {
            if record.values.len() != self.config.dimension || !all_finite(&record.values) {
                warn!(item_id = %record.item_id, dim = record.values.len(), "Rejecting vector");
                stats.skipped += 1;
                continue;
            }

            let vector_id = match self.keys.id_for(record.item_type, &record.item_id)? {
                Some(existing) => {
                    if index.contains(existing) {
                        index
                            .remove(existing)
                            .map_err(|e| VectorError::Index(e.to_string()))?;
                    }
                    existing
                }
                None => self.keys.allocate(),
            };

            index
                .add(vector_id, &record.values)
                .map_err(|e| VectorError::Index(e.to_string()))?;
            self.keys.put(&VectorEntry {
                vector_id,
                item_id: record.item_id.clone(),
                item_type: record.item_type,
                version: record.version,
                metadata: record.metadata.clone(),
            })?;
            stats.written += 1;
        }

        let path = self
            .index_file
            .to_str()
            .ok_or_else(|| VectorError::Index("Invalid path encoding".to_string()))?;
        index
            .save(path)
            .map_err(|e| VectorError::Index(format!("Failed to save: {}", e)))?;

        debug!(written = stats.written, skipped = stats.skipped, vectors = index.size(), "Index upsert complete");
        Ok(stats)
    }
}

/// Primary vector store backed by an HNSW index.
pub struct IndexedVectorStore {
    dimension: usize,
    inner: Option<Arc<IndexInner>>,
}

impl IndexedVectorStore {
    /// Open the index named by `config`, or build an unconfigured store when
    /// no index path is set.
    pub fn open(config: IndexedStoreConfig) -> Result<Self, VectorError> {
        let dimension = config.dimension;
        let inner = match config.index_path.clone() {
            Some(dir) => Some(Arc::new(IndexInner::open(config, &dir)?)),
            None => {
                info!("No vector index path configured; primary backend disabled");
                None
            }
        };
        Ok(Self { dimension, inner })
    }

    pub fn is_configured(&self) -> bool {
        self.inner.is_some()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of indexed vectors (0 when unconfigured)
    pub fn len(&self) -> usize {
        self.inner
            .as_ref()
            .and_then(|inner| inner.len().ok())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn inner(&self) -> Result<Arc<IndexInner>, VectorError> {
        self.inner.clone().ok_or(VectorError::NotConfigured)
    }
}

#[async_trait]
impl VectorStore for IndexedVectorStore {
    async fn query(
        &self,
        embedding: &[f32],
        top_k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<VectorMatch>, VectorError> {
        let inner = self.inner()?;
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let query = embedding.to_vec();
        let filter = filter.clone();
        tokio::task::spawn_blocking(move || inner.search(&query, top_k, &filter)).await?
    }

    async fn upsert(&self, batch: &[VectorRecord]) -> Result<UpsertStats, VectorError> {
        let inner = self.inner()?;
        let batch = batch.to_vec();
        tokio::task::spawn_blocking(move || inner.upsert(&batch)).await?
    }

    async fn health(&self) -> bool {
        self.inner
            .as_ref()
            .map(|inner| inner.len().map(|n| n > 0).unwrap_or(false))
            .unwrap_or(false)
    }

    fn backend(&self) -> Backend {
        Backend::Index
    }
}
