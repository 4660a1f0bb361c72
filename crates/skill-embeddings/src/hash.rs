//! Hash embeddings.
//!
//! FNV-1a feature hashing over lowercase word tokens and adjacent-word
//! bigrams. No model, no network; identical input always yields an identical
//! vector, which makes it the embedder of choice for tests and offline use.

use crate::error::EmbeddingError;
use crate::model::{Embedding, EmbeddingModel, ModelInfo};

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

/// Hash embedder using FNV-1a
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    info: ModelInfo,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

impl HashEmbedder {
    /// Create embedder with specified dimension
    pub fn new(dimension: usize) -> Self {
        Self {
            info: ModelInfo {
                name: "fnv1a-hash".to_string(),
                dimension,
            },
        }
    }

    fn tokens(text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric() && c != '+' && c != '#')
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
            .collect()
    }

    fn add_feature(&self, values: &mut [f32], feature: &str, weight: f32) {
        let hash = fnv1a(feature.as_bytes());
        let index = (hash % self.info.dimension as u64) as usize;
        // Top bit picks the sign so unrelated features cancel rather than pile up
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        values[index] += sign * weight;
    }
}

impl EmbeddingModel for HashEmbedder {
    fn info(&self) -> &ModelInfo {
        &self.info
    }

    fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        if self.info.dimension == 0 {
            return Err(EmbeddingError::Config("dimension must be > 0".into()));
        }
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("empty text".into()));
        }

        let mut values = vec![0.0f32; self.info.dimension];
        let tokens = Self::tokens(text);
        for token in &tokens {
            self.add_feature(&mut values, token, 1.0);
        }
        for pair in tokens.windows(2) {
            self.add_feature(&mut values, &format!("{} {}", pair[0], pair[1]), 0.5);
        }

        Ok(Embedding::new(values))
    }
}
