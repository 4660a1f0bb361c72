//! API-based embedder using OpenAI-compatible `/embeddings` endpoints.
//!
//! Uses the blocking reqwest client: embedding is a sync operation that async
//! callers run on the blocking pool.

use std::sync::OnceLock;
use std::time::Duration;

use backoff::ExponentialBackoff;
use reqwest::blocking::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::EmbeddingError;
use crate::model::{Embedding, EmbeddingModel, ModelInfo};

/// Configuration for the API embedder.
#[derive(Debug, Clone)]
pub struct ApiEmbedderConfig {
    /// API base URL (e.g., "https://api.openai.com/v1")
    pub base_url: String,

    /// Model to use (e.g., "text-embedding-3-small")
    pub model: String,

    /// API key
    pub api_key: SecretString,

    /// Expected vector dimension
    pub dimension: usize,

    /// Request timeout
    pub timeout: Duration,

    /// Give up retrying after this long
    pub max_elapsed: Duration,
}

impl ApiEmbedderConfig {
    /// Create config for the OpenAI API.
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>, dimension: usize) -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: model.into(),
            api_key: SecretString::from(api_key.into()),
            dimension,
            timeout: Duration::from_secs(10),
            max_elapsed: Duration::from_secs(20),
        }
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    dimensions: usize,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

/// API embedder implementation.
pub struct ApiEmbedder {
    /// Built on first use so construction never touches an async context
    client: OnceLock<Client>,
    config: ApiEmbedderConfig,
    info: ModelInfo,
}

impl ApiEmbedder {
    pub fn new(config: ApiEmbedderConfig) -> Self {
        let info = ModelInfo {
            name: config.model.clone(),
            dimension: config.dimension,
        };
        Self {
            client: OnceLock::new(),
            config,
            info,
        }
    }

    fn client(&self) -> Result<&Client, EmbeddingError> {
        if let Some(client) = self.client.get() {
            return Ok(client);
        }
        let client = Client::builder()
            .timeout(self.config.timeout)
            .build()
            .map_err(|e| EmbeddingError::Config(e.to_string()))?;
        Ok(self.client.get_or_init(|| client))
    }

    /// Make a single API request.
    fn request(&self, texts: &[&str]) -> Result<Vec<Embedding>, EmbeddingError> {
        let url = format!("{}/embeddings", self.config.base_url);
        let body = EmbeddingRequest {
            model: &self.config.model,
            input: texts,
            dimensions: self.config.dimension,
        };

        let response = self
            .client()?
            .post(&url)
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&body)
            .send()
            .map_err(|e| EmbeddingError::Http(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(EmbeddingError::RateLimited);
        }
        if !status.is_success() {
            let message = response.text().unwrap_or_default();
            return Err(EmbeddingError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .map_err(|e| EmbeddingError::Parse(e.to_string()))?;

        if parsed.data.len() != texts.len() {
            return Err(EmbeddingError::Parse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }
        parsed.data.sort_by_key(|d| d.index);

        parsed
            .data
            .into_iter()
            .map(|d| {
                if d.embedding.len() != self.config.dimension {
                    return Err(EmbeddingError::DimensionMismatch {
                        expected: self.config.dimension,
                        actual: d.embedding.len(),
                    });
                }
                Ok(Embedding::new(d.embedding))
            })
            .collect()
    }

    /// Call the API with retry on transient failures.
    fn call_api(&self, texts: &[&str]) -> Result<Vec<Embedding>, EmbeddingError> {
        let policy = ExponentialBackoff {
            initial_interval: Duration::from_millis(200),
            max_elapsed_time: Some(self.config.max_elapsed),
            ..Default::default()
        };

        let mut attempts = 0u32;
        backoff::retry(policy, || {
            attempts += 1;
            debug!(attempt = attempts, count = texts.len(), "Calling embeddings API");
            self.request(texts).map_err(|e| match e {
                EmbeddingError::RateLimited | EmbeddingError::Http(_) => {
                    warn!(error = %e, "Embedding call failed, retrying");
                    backoff::Error::transient(e)
                }
                EmbeddingError::Api { status, .. } if status >= 500 => {
                    warn!(error = %e, "Embedding call failed, retrying");
                    backoff::Error::transient(e)
                }
                other => backoff::Error::permanent(other),
            })
        })
        .map_err(|e| match e {
            backoff::Error::Permanent(e) => e,
            backoff::Error::Transient { err, .. } => err,
        })
    }
}

impl EmbeddingModel for ApiEmbedder {
    fn info(&self) -> &ModelInfo {
        &self.info
    }

    fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("empty text".into()));
        }
        self.call_api(&[text])?
            .pop()
            .ok_or_else(|| EmbeddingError::Parse("empty embedding response".into()))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if texts.iter().any(|t| t.trim().is_empty()) {
            return Err(EmbeddingError::InvalidInput("empty text in batch".into()));
        }
        self.call_api(texts)
    }
}
