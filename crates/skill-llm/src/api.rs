//! HTTP completion client for OpenAI-compatible and Anthropic endpoints.

use async_trait::async_trait;
use backoff::{backoff::Backoff, ExponentialBackoff};
use reqwest::{Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::completion::{Completion, CompletionModel, CompletionRequest};
use crate::error::LlmError;
use crate::sse::{anthropic_delta, openai_delta, text_stream};

/// Wire format spoken by the endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiFlavor {
    /// `/chat/completions` with bearer auth
    OpenAi,
    /// `/messages` with `x-api-key`
    Anthropic,
}

/// Configuration for [`ApiCompleter`].
#[derive(Debug, Clone)]
pub struct ApiCompleterConfig {
    /// API base URL (e.g., "https://api.openai.com/v1")
    pub base_url: String,

    /// Model to use (e.g., "gpt-4o-mini")
    pub model: String,

    pub api_key: SecretString,

    /// Per-request timeout
    pub timeout: Duration,

    /// Attempts before giving up, including the first
    pub max_retries: u32,

    /// Ask the endpoint to stream tokens
    pub stream: bool,

    pub flavor: ApiFlavor,
}

impl ApiCompleterConfig {
    /// Create config for OpenAI API.
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: model.into(),
            api_key: SecretString::from(api_key.into()),
            timeout: Duration::from_secs(20),
            max_retries: 2,
            stream: false,
            flavor: ApiFlavor::OpenAi,
        }
    }

    /// Create config for Claude API.
    pub fn claude(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: "https://api.anthropic.com/v1".to_string(),
            model: model.into(),
            api_key: SecretString::from(api_key.into()),
            timeout: Duration::from_secs(20),
            max_retries: 2,
            stream: false,
            flavor: ApiFlavor::Anthropic,
        }
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    stop: &'a [String],
    stream: bool,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    system: &'a str,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    stop_sequences: &'a [String],
    stream: bool,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Deserialize)]
struct AnthropicContent {
    #[serde(default)]
    text: String,
}

/// Completion model backed by a hosted API.
pub struct ApiCompleter {
    client: Client,
    config: ApiCompleterConfig,
}

impl ApiCompleter {
    pub fn new(config: ApiCompleterConfig) -> Result<Self, LlmError> {
        if config.model.trim().is_empty() {
            return Err(LlmError::Config("model must not be empty".to_string()));
        }
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Config(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Send with retry; only transient failures are retried.
    async fn call_api(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        let mut backoff = ExponentialBackoff {
            initial_interval: Duration::from_millis(200),
            max_elapsed_time: Some(self.config.timeout),
            ..Default::default()
        };

        let mut attempts = 0;

        loop {
            attempts += 1;
            debug!(attempt = attempts, model = %self.config.model, "Calling completion API");

            let err = match self.make_request(request).await {
                Ok(completion) => return Ok(completion),
                Err(e) => e,
            };

            if !err.is_transient() {
                warn!(error = %err, "Completion request rejected");
                return Err(err);
            }
            if attempts >= self.config.max_retries {
                error!(error = %err, "Max retries exceeded");
                return Err(err);
            }

            match backoff.next_backoff() {
                Some(duration) => {
                    warn!(
                        error = %err,
                        retry_in_ms = duration.as_millis(),
                        "Completion call failed, retrying"
                    );
                    tokio::time::sleep(duration).await;
                }
                None => {
                    error!(error = %err, "Backoff exhausted");
                    return Err(err);
                }
            }
        }
    }

    async fn make_request(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        match self.config.flavor {
            ApiFlavor::OpenAi => self.make_openai_request(request).await,
            ApiFlavor::Anthropic => self.make_anthropic_request(request).await,
        }
    }

    async fn make_openai_request(
        &self,
        request: &CompletionRequest,
    ) -> Result<Completion, LlmError> {
        let body = OpenAiRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            max_tokens: request.max_tokens,
            stop: &request.stop,
            stream: self.config.stream,
        };

        let url = format!("{}/chat/completions", self.config.base_url);
        let builder = self
            .client
            .post(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.config.api_key.expose_secret()),
            )
            .json(&body);
        let response = send_checked(builder).await?;

        if self.config.stream {
            return Ok(Completion::Stream(text_stream(
                Box::pin(response.bytes_stream()),
                openai_delta,
            )));
        }

        let parsed: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(Completion::Text)
            .ok_or_else(|| LlmError::Parse("No choices in response".to_string()))
    }

    async fn make_anthropic_request(
        &self,
        request: &CompletionRequest,
    ) -> Result<Completion, LlmError> {
        let body = AnthropicRequest {
            model: &self.config.model,
            system: &request.system,
            max_tokens: request.max_tokens,
            messages: vec![ChatMessage {
                role: "user",
                content: &request.user,
            }],
            stop_sequences: &request.stop,
            stream: self.config.stream,
        };

        let url = format!("{}/messages", self.config.base_url);
        let builder = self
            .client
            .post(&url)
            .header("x-api-key", self.config.api_key.expose_secret())
            .header("anthropic-version", "2023-06-01")
            .json(&body);
        let response = send_checked(builder).await?;

        if self.config.stream {
            return Ok(Completion::Stream(text_stream(
                Box::pin(response.bytes_stream()),
                anthropic_delta,
            )));
        }

        let parsed: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        if parsed.content.is_empty() {
            return Err(LlmError::Parse("No content in response".to_string()));
        }
        let text: String = parsed.content.into_iter().map(|c| c.text).collect();
        Ok(Completion::Text(text))
    }
}

async fn send_checked(builder: RequestBuilder) -> Result<Response, LlmError> {
    let response = builder
        .send()
        .await
        .map_err(|e| LlmError::Api(e.to_string()))?;

    let status = response.status();
    if status.as_u16() == 429 {
        return Err(LlmError::RateLimitExceeded);
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(LlmError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

#[async_trait]
impl CompletionModel for ApiCompleter {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        self.call_api(request).await
    }

    fn name(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::drain_completion;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> CompletionRequest {
        CompletionRequest {
            system: "Answer briefly.".to_string(),
            user: "What is your Python experience?".to_string(),
            max_tokens: 220,
            stop: vec!["\n\n".to_string()],
        }
    }

    fn openai(server: &MockServer, stream: bool) -> ApiCompleter {
        let mut config = ApiCompleterConfig::openai("sk-test", "gpt-4o-mini");
        config.base_url = server.uri();
        config.stream = stream;
        config.max_retries = 3;
        ApiCompleter::new(config).unwrap()
    }

    #[test]
    fn test_config_constructors() {
        let config = ApiCompleterConfig::openai("key", "gpt-4o-mini");
        assert_eq!(config.flavor, ApiFlavor::OpenAi);
        assert!(config.base_url.contains("openai.com"));

        let config = ApiCompleterConfig::claude("key", "claude-3-haiku-20240307");
        assert_eq!(config.flavor, ApiFlavor::Anthropic);
        assert!(config.base_url.contains("anthropic.com"));
    }

    #[test]
    fn test_empty_model_rejected() {
        let config = ApiCompleterConfig::openai("key", " ");
        assert!(matches!(ApiCompleter::new(config), Err(LlmError::Config(_))));
    }

    #[tokio::test]
    async fn test_openai_text_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-4o-mini",
                "max_tokens": 220,
                "stop": ["\n\n"],
                "stream": false
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "Twelve years of Python."}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let completion = openai(&server, false).complete(&request()).await.unwrap();
        let text = drain_completion(completion, Duration::from_secs(5)).await.unwrap();
        assert_eq!(text, "Twelve years of Python.");
    }

    #[tokio::test]
    async fn test_openai_streamed_response() {
        let server = MockServer::start().await;
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Twelve \"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"years.\"}}]}\n\n",
            "data: [DONE]\n\n"
        );
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(serde_json::json!({"stream": true})))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;

        let completion = openai(&server, true).complete(&request()).await.unwrap();
        assert!(matches!(completion, Completion::Stream(_)));
        let text = drain_completion(completion, Duration::from_secs(5)).await.unwrap();
        assert_eq!(text, "Twelve years.");
    }

    #[tokio::test]
    async fn test_anthropic_text_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(header("x-api-key", "sk-ant"))
            .and(header("anthropic-version", "2023-06-01"))
            .and(body_partial_json(serde_json::json!({
                "system": "Answer briefly.",
                "stop_sequences": ["\n\n"]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [{"type": "text", "text": "Eight years."}]
            })))
            .mount(&server)
            .await;

        let mut config = ApiCompleterConfig::claude("sk-ant", "claude-3-haiku-20240307");
        config.base_url = server.uri();
        let completer = ApiCompleter::new(config).unwrap();

        let completion = completer.complete(&request()).await.unwrap();
        let text = drain_completion(completion, Duration::from_secs(5)).await.unwrap();
        assert_eq!(text, "Eight years.");
    }

    #[tokio::test]
    async fn test_rate_limit_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "ok"}}]
            })))
            .mount(&server)
            .await;

        let completion = openai(&server, false).complete(&request()).await.unwrap();
        let text = drain_completion(completion, Duration::from_secs(5)).await.unwrap();
        assert_eq!(text, "ok");
    }

    #[tokio::test]
    async fn test_client_error_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .expect(1)
            .mount(&server)
            .await;

        let result = openai(&server, false).complete(&request()).await;
        match result {
            Err(LlmError::Status { status, body }) => {
                assert_eq!(status, 401);
                assert_eq!(body, "bad key");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }
}
