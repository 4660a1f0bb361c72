//! Storage layer for the skill engine.
//!
//! Provides RocksDB-backed storage with:
//! - Column family isolation for skill records, raw vectors and KV entries
//! - Id-ordered skill keys for stable batch paging
//! - A key-value store with TTL and atomic read-modify-write operations
//! - An in-memory `DashMap` key-value store for tests and single-process use

pub mod column_families;
pub mod db;
pub mod error;
pub mod keys;
pub mod kv;
pub mod vectors;

pub use db::{SkillRepository, Storage};
pub use error::StorageError;
pub use kv::{KeyValueStore, MemoryKvStore};
pub use vectors::{decode_vector, encode_vector, RawVector};
