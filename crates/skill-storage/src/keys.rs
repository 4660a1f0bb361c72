//! Key encoding and decoding for the storage layer.
//!
//! Key formats:
//! - skills: `skill:{id}`
//! - embeddings / embedding_meta: `vec:{item_type}:{item_id}`
//!
//! Byte-wise ordering of skill keys equals ordering by id, which keeps
//! offset paging stable across reindex runs.

use skill_types::ItemType;

use crate::error::StorageError;

/// Key for skill records
/// Format: skill:{id}
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillKey {
    pub id: String,
}

impl SkillKey {
    pub const PREFIX: &'static str = "skill:";

    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        format!("{}{}", Self::PREFIX, self.id).into_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        let s = std::str::from_utf8(bytes)
            .map_err(|e| StorageError::Key(format!("Invalid UTF-8: {}", e)))?;
        let id = s
            .strip_prefix(Self::PREFIX)
            .ok_or_else(|| StorageError::Key(format!("Invalid skill key format: {}", s)))?;
        Ok(Self::new(id))
    }
}

/// Key for raw vectors and their metadata
/// Format: vec:{item_type}:{item_id}
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorKey {
    pub item_type: ItemType,
    pub item_id: String,
}

impl VectorKey {
    pub fn new(item_type: ItemType, item_id: impl Into<String>) -> Self {
        Self {
            item_type,
            item_id: item_id.into(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        format!("vec:{}:{}", self.item_type, self.item_id).into_bytes()
    }

    /// Scan prefix covering every vector of one item type
    pub fn prefix(item_type: ItemType) -> Vec<u8> {
        format!("vec:{}:", item_type).into_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        let s = std::str::from_utf8(bytes)
            .map_err(|e| StorageError::Key(format!("Invalid UTF-8: {}", e)))?;

        // item ids may themselves contain ':'
        let mut parts = s.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some("vec"), Some(item_type), Some(item_id)) => {
                let item_type: ItemType = item_type
                    .parse()
                    .map_err(|e: String| StorageError::Key(e))?;
                Ok(Self::new(item_type, item_id))
            }
            _ => Err(StorageError::Key(format!(
                "Invalid vector key format: {}",
                s
            ))),
        }
    }
}
