//! # skill-embeddings
//!
//! Embedding generation for skill records and incoming questions.
//!
//! ## Features
//! - `EmbeddingModel` trait shared by every embedder (sync, `Send + Sync`)
//! - `ApiEmbedder`: OpenAI-compatible `/embeddings` endpoint with retries
//! - `HashEmbedder`: deterministic, offline FNV-1a feature hashing
//! - `embed_on_blocking_pool` to call a sync model from async code

pub mod api;
pub mod error;
pub mod hash;
pub mod model;

use std::sync::Arc;

use skill_types::EmbeddingSettings;

pub use api::{ApiEmbedder, ApiEmbedderConfig};
pub use error::EmbeddingError;
pub use hash::HashEmbedder;
pub use model::{embed_on_blocking_pool, Embedding, EmbeddingModel, ModelInfo};

/// Build the embedder named by `settings.provider`.
///
/// `dimension` is the vector dimension the stores were built with; API
/// responses of any other length are rejected.
pub fn create_embedder(
    settings: &EmbeddingSettings,
    dimension: usize,
) -> Result<Arc<dyn EmbeddingModel>, EmbeddingError> {
    match settings.provider.to_ascii_lowercase().as_str() {
        "hash" => Ok(Arc::new(HashEmbedder::new(dimension))),
        "api" | "openai" => {
            let api_key = settings
                .api_key
                .clone()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok())
                .ok_or_else(|| {
                    EmbeddingError::Config("embedding.api_key or OPENAI_API_KEY required".into())
                })?;
            let mut config = ApiEmbedderConfig::openai(api_key, &settings.model, dimension);
            if let Some(base_url) = &settings.api_base_url {
                config.base_url = base_url.trim_end_matches('/').to_string();
            }
            config.timeout = std::time::Duration::from_secs(settings.timeout_secs);
            Ok(Arc::new(ApiEmbedder::new(config)))
        }
        other => Err(EmbeddingError::Config(format!(
            "unknown embedding provider: {other}"
        ))),
    }
}
