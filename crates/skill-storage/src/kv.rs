//! Key-value store with TTL and atomic read-modify-write operations.
//!
//! Holds every piece of shared mutable state on the query path: daily budget
//! counters, cached responses, reindex locks and reindex checkpoints.
//!
//! Expired entries read as absent and are removed lazily on access or by
//! [`KeyValueStore::purge_expired`].

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rocksdb::{IteratorMode, WriteBatch};
use tracing::debug;

use crate::column_families::CF_KV;
use crate::db::Storage;
use crate::error::StorageError;

/// Key-value store contract.
///
/// `increment`, `put_if_absent` and `compare_and_delete` are atomic with
/// respect to each other for the same key.
pub trait KeyValueStore: Send + Sync {
    /// Value for `key`, or `None` if missing or expired
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Store `value`, expiring after `ttl` (never when `None`)
    fn put_with_ttl(
        &self,
        key: &str,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> Result<(), StorageError>;

    /// Remove `key`. Returns true if a live entry was removed.
    fn delete(&self, key: &str) -> Result<bool, StorageError>;

    /// Add `delta` to the counter at `key` and set its expiry to `expires_at`.
    /// A missing or expired counter starts at zero. Returns the new value.
    fn increment(
        &self,
        key: &str,
        delta: u64,
        expires_at: DateTime<Utc>,
    ) -> Result<u64, StorageError>;

    /// Store `value` only if no live entry exists. Returns true if stored.
    fn put_if_absent(
        &self,
        key: &str,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> Result<bool, StorageError>;

    /// Remove `key` only if its live value equals `expected`.
    fn compare_and_delete(&self, key: &str, expected: &[u8]) -> Result<bool, StorageError>;

    /// Remove every expired entry. Returns the number removed.
    fn purge_expired(&self) -> Result<usize, StorageError>;

    /// Read a counter written by `increment` or `set_counter`
    fn get_counter(&self, key: &str) -> Result<u64, StorageError> {
        match self.get(key)? {
            Some(bytes) => decode_counter(key, &bytes),
            None => Ok(0),
        }
    }

    /// Overwrite a counter with an absolute value
    fn set_counter(
        &self,
        key: &str,
        value: u64,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let ttl = (expires_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        self.put_with_ttl(key, value.to_string().as_bytes(), Some(ttl))
    }
}

/// Counters are stored as decimal text.
fn decode_counter(key: &str, bytes: &[u8]) -> Result<u64, StorageError> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| StorageError::NotACounter {
            key: key.to_string(),
        })
}

fn expiry_from_ttl(ttl: Option<Duration>) -> Option<DateTime<Utc>> {
    ttl.and_then(|ttl| chrono::Duration::from_std(ttl).ok())
        .map(|ttl| Utc::now() + ttl)
}

fn is_expired(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    matches!(expires_at, Some(at) if at <= now)
}

// ==================== RocksDB ====================

/// On-disk layout: 8-byte big-endian expiry in epoch millis (0 = never), then payload.
const HEADER_LEN: usize = 8;

fn encode_entry(value: &[u8], expires_at: Option<DateTime<Utc>>) -> Vec<u8> {
    let expires_ms = expires_at.map(|at| at.timestamp_millis().max(1)).unwrap_or(0);
    let mut bytes = Vec::with_capacity(HEADER_LEN + value.len());
    bytes.extend_from_slice(&(expires_ms as u64).to_be_bytes());
    bytes.extend_from_slice(value);
    bytes
}

fn decode_entry(bytes: &[u8]) -> Result<(Option<DateTime<Utc>>, &[u8]), StorageError> {
    if bytes.len() < HEADER_LEN {
        return Err(StorageError::Serialization(format!(
            "KV entry shorter than header: {} bytes",
            bytes.len()
        )));
    }
    let mut header = [0u8; HEADER_LEN];
    header.copy_from_slice(&bytes[..HEADER_LEN]);
    let expires_ms = u64::from_be_bytes(header);
    let expires_at = if expires_ms == 0 {
        None
    } else {
        Utc.timestamp_millis_opt(expires_ms as i64).single()
    };
    Ok((expires_at, &bytes[HEADER_LEN..]))
}

impl Storage {
    fn kv_get_live(&self, key: &str) -> Result<Option<(Option<DateTime<Utc>>, Vec<u8>)>, StorageError> {
        let cf = self.cf(CF_KV)?;
        let Some(bytes) = self.db.get_cf(cf, key.as_bytes())? else {
            return Ok(None);
        };
        let (expires_at, payload) = decode_entry(&bytes)?;
        if is_expired(expires_at, Utc::now()) {
            return Ok(None);
        }
        Ok(Some((expires_at, payload.to_vec())))
    }

    fn kv_put(
        &self,
        key: &str,
        value: &[u8],
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), StorageError> {
        let cf = self.cf(CF_KV)?;
        self.db
            .put_cf(cf, key.as_bytes(), encode_entry(value, expires_at))?;
        Ok(())
    }
}

impl KeyValueStore for Storage {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let cf = self.cf(CF_KV)?;
        let Some(bytes) = self.db.get_cf(cf, key.as_bytes())? else {
            return Ok(None);
        };
        let (expires_at, payload) = decode_entry(&bytes)?;
        if is_expired(expires_at, Utc::now()) {
            // Lazy removal; a concurrent rewrite under the lock wins
            let _guard = self.rmw_lock.lock().map_err(|_| StorageError::Poisoned)?;
            if self.kv_get_live(key)?.is_none() {
                self.db.delete_cf(cf, key.as_bytes())?;
            }
            return Ok(None);
        }
        Ok(Some(payload.to_vec()))
    }

    fn put_with_ttl(
        &self,
        key: &str,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> Result<(), StorageError> {
        let _guard = self.rmw_lock.lock().map_err(|_| StorageError::Poisoned)?;
        self.kv_put(key, value, expiry_from_ttl(ttl))
    }

    fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let _guard = self.rmw_lock.lock().map_err(|_| StorageError::Poisoned)?;
        let existed = self.kv_get_live(key)?.is_some();
        let cf = self.cf(CF_KV)?;
        self.db.delete_cf(cf, key.as_bytes())?;
        Ok(existed)
    }

    fn increment(
        &self,
        key: &str,
        delta: u64,
        expires_at: DateTime<Utc>,
    ) -> Result<u64, StorageError> {
        let _guard = self.rmw_lock.lock().map_err(|_| StorageError::Poisoned)?;
        let current = match self.kv_get_live(key)? {
            Some((_, payload)) => decode_counter(key, &payload)?,
            None => 0,
        };
        let next = current.saturating_add(delta);
        self.kv_put(key, next.to_string().as_bytes(), Some(expires_at))?;
        Ok(next)
    }

    fn put_if_absent(
        &self,
        key: &str,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> Result<bool, StorageError> {
        let _guard = self.rmw_lock.lock().map_err(|_| StorageError::Poisoned)?;
        if self.kv_get_live(key)?.is_some() {
            return Ok(false);
        }
        self.kv_put(key, value, expiry_from_ttl(ttl))?;
        Ok(true)
    }

    fn compare_and_delete(&self, key: &str, expected: &[u8]) -> Result<bool, StorageError> {
        let _guard = self.rmw_lock.lock().map_err(|_| StorageError::Poisoned)?;
        match self.kv_get_live(key)? {
            Some((_, payload)) if payload == expected => {
                let cf = self.cf(CF_KV)?;
                self.db.delete_cf(cf, key.as_bytes())?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn purge_expired(&self) -> Result<usize, StorageError> {
        let _guard = self.rmw_lock.lock().map_err(|_| StorageError::Poisoned)?;
        let cf = self.cf(CF_KV)?;
        let now = Utc::now();

        let mut batch = WriteBatch::default();
        let mut count = 0;
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, value) = item?;
            let expired = match decode_entry(&value) {
                Ok((expires_at, _)) => is_expired(expires_at, now),
                // Entries without a valid header are unreadable anyway
                Err(_) => true,
            };
            if expired {
                batch.delete_cf(cf, &key);
                count += 1;
            }
        }

        if count > 0 {
            self.db.write(batch)?;
            debug!(count, "Purged expired KV entries");
        }
        Ok(count)
    }
}

// ==================== In-memory ====================

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: Vec<u8>,
    expires_at: Option<DateTime<Utc>>,
}

impl MemoryEntry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        !is_expired(self.expires_at, now)
    }
}

/// In-memory key-value store.
///
/// Read-modify-write operations hold the `DashMap` entry lock for their key.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: DashMap<String, MemoryEntry>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries held, live or not
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyValueStore for MemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let now = Utc::now();
        if let Some(entry) = self.entries.get(key) {
            if entry.is_live(now) {
                return Ok(Some(entry.value.clone()));
            }
        }
        self.entries.remove_if(key, |_, entry| !entry.is_live(now));
        Ok(None)
    }

    fn put_with_ttl(
        &self,
        key: &str,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> Result<(), StorageError> {
        self.entries.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_vec(),
                expires_at: expiry_from_ttl(ttl),
            },
        );
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let now = Utc::now();
        Ok(self
            .entries
            .remove(key)
            .map(|(_, entry)| entry.is_live(now))
            .unwrap_or(false))
    }

    fn increment(
        &self,
        key: &str,
        delta: u64,
        expires_at: DateTime<Utc>,
    ) -> Result<u64, StorageError> {
        let now = Utc::now();
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let current = if occupied.get().is_live(now) {
                    decode_counter(key, &occupied.get().value)?
                } else {
                    0
                };
                let next = current.saturating_add(delta);
                occupied.insert(MemoryEntry {
                    value: next.to_string().into_bytes(),
                    expires_at: Some(expires_at),
                });
                Ok(next)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(MemoryEntry {
                    value: delta.to_string().into_bytes(),
                    expires_at: Some(expires_at),
                });
                Ok(delta)
            }
        }
    }

    fn put_if_absent(
        &self,
        key: &str,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> Result<bool, StorageError> {
        let now = Utc::now();
        let entry = MemoryEntry {
            value: value.to_vec(),
            expires_at: expiry_from_ttl(ttl),
        };
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_live(now) {
                    return Ok(false);
                }
                occupied.insert(entry);
                Ok(true)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(entry);
                Ok(true)
            }
        }
    }

    fn compare_and_delete(&self, key: &str, expected: &[u8]) -> Result<bool, StorageError> {
        let now = Utc::now();
        Ok(self
            .entries
            .remove_if(key, |_, entry| entry.is_live(now) && entry.value == expected)
            .is_some())
    }

    fn purge_expired(&self) -> Result<usize, StorageError> {
        let now = Utc::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live(now));
        Ok(before.saturating_sub(self.entries.len()))
    }
}
