//! Completion models for answer generation.
//!
//! A `CompletionModel` returns either a whole text or a stream of text
//! chunks. Callers never consume streams directly: `drain_completion` turns
//! either form into a string under one hard deadline, and dropping the
//! stream on expiry cancels the request.

mod api;
mod completion;
mod error;
mod mock;
mod sse;

use std::sync::Arc;
use std::time::Duration;

use skill_types::LlmSettings;

pub use api::{ApiCompleter, ApiCompleterConfig, ApiFlavor};
pub use completion::{
    complete_and_drain, drain_completion, Completion, CompletionModel, CompletionRequest,
    TextStream,
};
pub use error::LlmError;
pub use mock::{MockBehavior, MockCompleter};

/// Build the completion model named by `settings.provider`.
pub fn create_completer(settings: &LlmSettings) -> Result<Arc<dyn CompletionModel>, LlmError> {
    let provider = settings.provider.to_ascii_lowercase();
    let env_key = match provider.as_str() {
        "mock" => return Ok(Arc::new(MockCompleter::new(MockBehavior::Echo))),
        "openai" => "OPENAI_API_KEY",
        "anthropic" | "claude" => "ANTHROPIC_API_KEY",
        other => return Err(LlmError::Config(format!("unknown llm provider: {other}"))),
    };

    let api_key = settings
        .api_key
        .clone()
        .or_else(|| std::env::var(env_key).ok())
        .ok_or_else(|| LlmError::Config(format!("llm.api_key or {env_key} required")))?;

    let mut config = if provider == "openai" {
        ApiCompleterConfig::openai(api_key, &settings.model)
    } else {
        ApiCompleterConfig::claude(api_key, &settings.model)
    };
    if let Some(base_url) = &settings.api_base_url {
        config.base_url = base_url.trim_end_matches('/').to_string();
    }
    config.stream = settings.stream;
    config.max_retries = settings.max_retries.max(1);
    config.timeout = Duration::from_secs(settings.inference_timeout_secs.max(1));

    Ok(Arc::new(ApiCompleter::new(config)?))
}
