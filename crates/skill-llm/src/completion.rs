//! Completion trait, request/response types and the drain helper.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::LlmError;

/// One inference request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// System instructions
    pub system: String,
    /// User turn (question plus retrieved context)
    pub user: String,
    pub max_tokens: u32,
    /// Sequences that end generation
    #[serde(default)]
    pub stop: Vec<String>,
}

/// Stream of generated text chunks.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

/// Model output: whole text or incremental chunks.
pub enum Completion {
    Text(String),
    Stream(TextStream),
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Completion::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Completion::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Pluggable completion model.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError>;

    /// Model name for logs
    fn name(&self) -> &str;
}

/// Collect a completion into a string within `deadline`.
///
/// On expiry the stream is dropped, which cancels the underlying request.
pub async fn drain_completion(
    completion: Completion,
    deadline: Duration,
) -> Result<String, LlmError> {
    let mut stream = match completion {
        Completion::Text(text) => return non_empty(text),
        Completion::Stream(stream) => stream,
    };

    let collect = async {
        let mut text = String::new();
        let mut chunks = 0usize;
        while let Some(chunk) = stream.next().await {
            text.push_str(&chunk?);
            chunks += 1;
        }
        debug!(chunks, chars = text.len(), "Drained completion stream");
        Ok::<_, LlmError>(text)
    };

    match tokio::time::timeout(deadline, collect).await {
        Ok(result) => non_empty(result?),
        Err(_) => {
            warn!(deadline_ms = deadline.as_millis() as u64, "Completion stream timed out");
            Err(LlmError::Timeout)
        }
    }
}

/// Request a completion and drain it, all under one deadline.
pub async fn complete_and_drain(
    model: Arc<dyn CompletionModel>,
    request: &CompletionRequest,
    deadline: Duration,
) -> Result<String, LlmError> {
    let started = tokio::time::Instant::now();
    let completion = tokio::time::timeout(deadline, model.complete(request))
        .await
        .map_err(|_| LlmError::Timeout)??;
    let remaining = deadline.saturating_sub(started.elapsed());
    drain_completion(completion, remaining).await
}

fn non_empty(text: String) -> Result<String, LlmError> {
    if text.trim().is_empty() {
        Err(LlmError::Empty)
    } else {
        Ok(text)
    }
}
