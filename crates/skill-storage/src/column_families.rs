//! Column family definitions for RocksDB.
//!
//! Each column family isolates data with different access patterns:
//! - skills: Curated skill records, read-mostly (default compaction)
//! - embeddings: Raw little-endian f32 vector bytes (LZ4 compression)
//! - embedding_meta: Vector version + metadata snapshot JSON
//! - kv: TTL-bounded counters, cache entries, locks and checkpoints

use rocksdb::{ColumnFamilyDescriptor, Options};

/// Column family name for skill records
pub const CF_SKILLS: &str = "skills";

/// Column family name for raw embedding bytes
pub const CF_EMBEDDINGS: &str = "embeddings";

/// Column family name for embedding version + snapshot
pub const CF_EMBEDDING_META: &str = "embedding_meta";

/// Column family name for the key-value store
pub const CF_KV: &str = "kv";

/// All column family names
pub const ALL_CF_NAMES: &[&str] = &[CF_SKILLS, CF_EMBEDDINGS, CF_EMBEDDING_META, CF_KV];

/// Raw float bytes compress poorly with Zstd; LZ4 is cheaper to decode on every scan
fn embeddings_options() -> Options {
    let mut opts = Options::default();
    opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
    opts
}

/// Build all column family descriptors
pub fn build_cf_descriptors() -> Vec<ColumnFamilyDescriptor> {
    vec![
        ColumnFamilyDescriptor::new(CF_SKILLS, Options::default()),
        ColumnFamilyDescriptor::new(CF_EMBEDDINGS, embeddings_options()),
        ColumnFamilyDescriptor::new(CF_EMBEDDING_META, Options::default()),
        ColumnFamilyDescriptor::new(CF_KV, Options::default()),
    ]
}
