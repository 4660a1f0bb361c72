//! Raw embedding storage format.
//!
//! Vectors are stored as little-endian f32 bytes. The metadata snapshot and
//! reindex version live next to them as JSON so that filtering and boosting
//! never need the full record.

use serde::{Deserialize, Serialize};
use skill_types::{ItemSnapshot, ItemType};

/// A stored embedding as read back from the relational store.
///
/// `bytes` is left undecoded; readers decide how to treat malformed data.
#[derive(Debug, Clone, PartialEq)]
pub struct RawVector {
    pub item_id: String,
    pub item_type: ItemType,
    /// Reindex generation that produced this vector
    pub version: u64,
    pub bytes: Vec<u8>,
    pub metadata: ItemSnapshot,
}

impl RawVector {
    pub fn new(
        item_id: impl Into<String>,
        item_type: ItemType,
        version: u64,
        vector: &[f32],
        metadata: ItemSnapshot,
    ) -> Self {
        Self {
            item_id: item_id.into(),
            item_type,
            version,
            bytes: encode_vector(vector),
            metadata,
        }
    }
}

/// Sibling record in the embedding_meta column family.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StoredVectorMeta {
    pub version: u64,
    pub metadata: ItemSnapshot,
}

/// Encode a vector as little-endian f32 bytes.
pub fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decode little-endian f32 bytes.
///
/// Returns `None` for empty input or a length that is not a multiple of 4.
pub fn decode_vector(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.is_empty() || bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect(),
    )
}
