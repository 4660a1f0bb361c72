//! Exclusive reindex lock.
//!
//! `lock:reindex:{item_type}` holds a random owner token and expires after a
//! TTL, so a crashed job never blocks reindexing for longer than that. The
//! guard releases on drop, and only while the stored token is still its own.

use std::sync::Arc;
use std::time::Duration;

use skill_storage::KeyValueStore;
use skill_types::ItemType;
use tracing::{debug, warn};
use ulid::Ulid;

use crate::error::IndexingError;

pub struct ReindexLock {
    kv: Arc<dyn KeyValueStore>,
    key: String,
    owner: String,
    released: bool,
}

impl ReindexLock {
    pub fn key(item_type: ItemType) -> String {
        format!("lock:reindex:{item_type}")
    }

    /// Take the lock or fail immediately with `Conflict`.
    pub fn acquire(
        kv: Arc<dyn KeyValueStore>,
        item_type: ItemType,
        ttl: Duration,
    ) -> Result<Self, IndexingError> {
        let key = Self::key(item_type);
        let owner = Ulid::new().to_string();

        if !kv.put_if_absent(&key, owner.as_bytes(), Some(ttl))? {
            return Err(IndexingError::Conflict { item_type });
        }

        debug!(%key, %owner, ttl_secs = ttl.as_secs(), "Reindex lock acquired");
        Ok(Self {
            kv,
            key,
            owner,
            released: false,
        })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Release now. Returns false if the lock had expired or changed hands.
    pub fn release(mut self) -> Result<bool, IndexingError> {
        self.released = true;
        Ok(self.kv.compare_and_delete(&self.key, self.owner.as_bytes())?)
    }
}

impl Drop for ReindexLock {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        match self.kv.compare_and_delete(&self.key, self.owner.as_bytes()) {
            Ok(true) => debug!(key = %self.key, "Reindex lock released"),
            Ok(false) => warn!(key = %self.key, "Reindex lock expired before release"),
            Err(e) => warn!(key = %self.key, error = %e, "Failed to release reindex lock"),
        }
    }
}
