//! RocksDB wrapper for skill-engine storage.
//!
//! Provides:
//! - Database open with column family setup
//! - Skill record reads, id-ordered paging and admin writes
//! - Raw vector + metadata writes as one atomic batch
//! - The KV column family used by [`crate::kv::KeyValueStore`]

use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info, warn};

use skill_types::{ItemType, SkillRecord};

use crate::column_families::{build_cf_descriptors, CF_EMBEDDINGS, CF_EMBEDDING_META, CF_SKILLS};
use crate::error::StorageError;
use crate::keys::{SkillKey, VectorKey};
use crate::vectors::{RawVector, StoredVectorMeta};

/// Read access to skill records and their stored embeddings.
///
/// The query path only reads; `put_skill` and `put_raw_vector` are used by
/// administrative migration and the reindex job.
pub trait SkillRepository: Send + Sync {
    fn get_skill(&self, id: &str) -> Result<Option<SkillRecord>, StorageError>;

    /// Records ordered by id, skipping `offset` and returning at most `limit`
    fn list_skills(&self, offset: usize, limit: usize) -> Result<Vec<SkillRecord>, StorageError>;

    fn count_skills(&self) -> Result<usize, StorageError>;

    fn put_skill(&self, record: &SkillRecord) -> Result<(), StorageError>;

    /// Every stored vector of the given item type, undecoded
    fn raw_vectors(&self, item_type: ItemType) -> Result<Vec<RawVector>, StorageError>;

    fn put_raw_vector(&self, vector: &RawVector) -> Result<(), StorageError>;
}

/// Main storage interface
pub struct Storage {
    pub(crate) db: DB,
    /// Serializes read-modify-write operations on the KV column family
    pub(crate) rmw_lock: Mutex<()>,
}

impl Storage {
    /// Open storage at the given path, creating if necessary
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        info!("Opening storage at {:?}", path);

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_background_jobs(2);

        let cf_descriptors = build_cf_descriptors();
        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        Ok(Self {
            db,
            rmw_lock: Mutex::new(()),
        })
    }

    pub(crate) fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily, StorageError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StorageError::ColumnFamilyNotFound(name.to_string()))
    }

    /// Number of stored vectors of one item type
    pub fn count_vectors(&self, item_type: ItemType) -> Result<usize, StorageError> {
        let cf = self.cf(CF_EMBEDDINGS)?;
        let prefix = VectorKey::prefix(item_type);
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&prefix, Direction::Forward));

        let mut count = 0;
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            count += 1;
        }
        Ok(count)
    }
}

impl SkillRepository for Storage {
    fn get_skill(&self, id: &str) -> Result<Option<SkillRecord>, StorageError> {
        let cf = self.cf(CF_SKILLS)?;
        match self.db.get_cf(cf, SkillKey::new(id).to_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn list_skills(&self, offset: usize, limit: usize) -> Result<Vec<SkillRecord>, StorageError> {
        let cf = self.cf(CF_SKILLS)?;
        let prefix = SkillKey::PREFIX.as_bytes();
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix, Direction::Forward));

        let mut records = Vec::new();
        for item in iter.skip(offset) {
            if records.len() >= limit {
                break;
            }
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            records.push(serde_json::from_slice(&value)?);
        }
        Ok(records)
    }

    fn count_skills(&self) -> Result<usize, StorageError> {
        let cf = self.cf(CF_SKILLS)?;
        let mut count = 0;
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            item?;
            count += 1;
        }
        Ok(count)
    }

    fn put_skill(&self, record: &SkillRecord) -> Result<(), StorageError> {
        let cf = self.cf(CF_SKILLS)?;
        let bytes = serde_json::to_vec(record)?;
        self.db.put_cf(cf, SkillKey::new(&record.id).to_bytes(), bytes)?;
        debug!(skill_id = %record.id, "Stored skill record");
        Ok(())
    }

    fn raw_vectors(&self, item_type: ItemType) -> Result<Vec<RawVector>, StorageError> {
        let vectors_cf = self.cf(CF_EMBEDDINGS)?;
        let meta_cf = self.cf(CF_EMBEDDING_META)?;
        let prefix = VectorKey::prefix(item_type);

        let iter = self
            .db
            .iterator_cf(vectors_cf, IteratorMode::From(&prefix, Direction::Forward));

        let mut vectors = Vec::new();
        for item in iter {
            let (key, bytes) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            let vector_key = match VectorKey::from_bytes(&key) {
                Ok(vector_key) => vector_key,
                Err(e) => {
                    warn!(error = %e, "Malformed vector key, skipping");
                    continue;
                }
            };

            let meta: StoredVectorMeta = match self.db.get_cf(meta_cf, &key)? {
                Some(meta_bytes) => match serde_json::from_slice(&meta_bytes) {
                    Ok(meta) => meta,
                    Err(e) => {
                        warn!(item_id = %vector_key.item_id, error = %e, "Unreadable vector metadata, skipping");
                        continue;
                    }
                },
                None => {
                    warn!(item_id = %vector_key.item_id, "Vector without metadata, skipping");
                    continue;
                }
            };

            vectors.push(RawVector {
                item_id: vector_key.item_id,
                item_type: vector_key.item_type,
                version: meta.version,
                bytes: bytes.to_vec(),
                metadata: meta.metadata,
            });
        }
        Ok(vectors)
    }

    fn put_raw_vector(&self, vector: &RawVector) -> Result<(), StorageError> {
        let vectors_cf = self.cf(CF_EMBEDDINGS)?;
        let meta_cf = self.cf(CF_EMBEDDING_META)?;

        let key = VectorKey::new(vector.item_type, &vector.item_id).to_bytes();
        let meta = serde_json::to_vec(&StoredVectorMeta {
            version: vector.version,
            metadata: vector.metadata.clone(),
        })?;

        // Bytes and snapshot must never diverge
        let mut batch = WriteBatch::default();
        batch.put_cf(vectors_cf, &key, &vector.bytes);
        batch.put_cf(meta_cf, &key, meta);
        self.db.write(batch)?;

        debug!(item_id = %vector.item_id, version = vector.version, "Stored raw vector");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column_families::ALL_CF_NAMES;
    use skill_types::ProficiencyLevel;
    use tempfile::TempDir;

    fn create_test_storage() -> (Storage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::open(temp_dir.path()).unwrap();
        (storage, temp_dir)
    }

    fn skill(id: &str) -> SkillRecord {
        SkillRecord::new(id, id.to_uppercase(), "Languages", 4.0, ProficiencyLevel::Intermediate)
    }

    #[test]
    fn test_open_creates_column_families() {
        let (storage, _temp) = create_test_storage();
        for cf_name in ALL_CF_NAMES {
            assert!(
                storage.db.cf_handle(cf_name).is_some(),
                "CF {} should exist",
                cf_name
            );
        }
    }

    #[test]
    fn test_put_and_get_skill() {
        let (storage, _temp) = create_test_storage();
        let record = skill("rust").with_employer("Acme");

        storage.put_skill(&record).unwrap();

        assert_eq!(storage.get_skill("rust").unwrap(), Some(record));
        assert_eq!(storage.get_skill("go").unwrap(), None);
    }

    #[test]
    fn test_list_skills_pages_in_id_order() {
        let (storage, _temp) = create_test_storage();
        for id in ["delta", "alpha", "echo", "charlie", "bravo"] {
            storage.put_skill(&skill(id)).unwrap();
        }

        let first: Vec<String> = storage
            .list_skills(0, 2)
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        let rest: Vec<String> = storage
            .list_skills(2, 10)
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();

        assert_eq!(first, vec!["alpha", "bravo"]);
        assert_eq!(rest, vec!["charlie", "delta", "echo"]);
        assert_eq!(storage.count_skills().unwrap(), 5);
        assert!(storage.list_skills(5, 10).unwrap().is_empty());
    }

    #[test]
    fn test_raw_vector_roundtrip_with_snapshot() {
        let (storage, _temp) = create_test_storage();
        let record = skill("python").with_project("Atlas");
        let raw = RawVector::new("python", ItemType::Skill, 3, &[0.5, -0.25], record.snapshot());

        storage.put_raw_vector(&raw).unwrap();

        let stored = storage.raw_vectors(ItemType::Skill).unwrap();
        assert_eq!(stored, vec![raw]);
        assert_eq!(storage.count_vectors(ItemType::Skill).unwrap(), 1);
    }

    #[test]
    fn test_put_raw_vector_overwrites_version() {
        let (storage, _temp) = create_test_storage();
        let snapshot = skill("sql").snapshot();

        storage
            .put_raw_vector(&RawVector::new("sql", ItemType::Skill, 1, &[1.0], snapshot.clone()))
            .unwrap();
        storage
            .put_raw_vector(&RawVector::new("sql", ItemType::Skill, 2, &[0.0, 1.0], snapshot))
            .unwrap();

        let stored = storage.raw_vectors(ItemType::Skill).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].version, 2);
    }

    #[test]
    fn test_raw_vectors_skips_malformed_keys() {
        let (storage, _temp) = create_test_storage();
        let good = RawVector::new("go", ItemType::Skill, 1, &[1.0, 0.0], skill("go").snapshot());
        storage.put_raw_vector(&good).unwrap();

        // Key under the skill prefix whose id is not UTF-8
        let mut bad_key = VectorKey::prefix(ItemType::Skill);
        bad_key.extend_from_slice(&[0xff, 0xfe]);
        let cf = storage.cf(CF_EMBEDDINGS).unwrap();
        storage.db.put_cf(cf, &bad_key, [0u8; 8]).unwrap();

        let stored = storage.raw_vectors(ItemType::Skill).unwrap();
        assert_eq!(stored, vec![good]);
    }
}
