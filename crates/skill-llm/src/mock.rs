//! Mock completion model for testing.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::completion::{Completion, CompletionModel, CompletionRequest};
use crate::error::LlmError;

/// What the mock does when called.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Reply with a sentence quoting the start of the user prompt
    Echo,
    /// Reply with fixed text
    Reply(String),
    /// Stream the given chunks
    Stream(Vec<String>),
    /// Fail with a non-transient error
    Fail,
    /// Never respond
    Hang,
}

/// Deterministic completion model that records its calls.
pub struct MockCompleter {
    behavior: MockBehavior,
    calls: AtomicUsize,
    last_request: Mutex<Option<CompletionRequest>>,
}

impl MockCompleter {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// Number of `complete` calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.last_request.lock().ok().and_then(|guard| guard.clone())
    }
}

impl Default for MockCompleter {
    fn default() -> Self {
        Self::new(MockBehavior::Echo)
    }
}

#[async_trait]
impl CompletionModel for MockCompleter {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut guard) = self.last_request.lock() {
            *guard = Some(request.clone());
        }

        match &self.behavior {
            MockBehavior::Echo => {
                let first_line = request.user.lines().next().unwrap_or_default();
                Ok(Completion::Text(format!(
                    "Mock answer for: {}",
                    truncate(first_line, 60)
                )))
            }
            MockBehavior::Reply(text) => Ok(Completion::Text(text.clone())),
            MockBehavior::Stream(chunks) => {
                let items: Vec<Result<String, LlmError>> =
                    chunks.iter().cloned().map(Ok).collect();
                Ok(Completion::Stream(Box::pin(futures::stream::iter(items))))
            }
            MockBehavior::Fail => Err(LlmError::Status {
                status: 400,
                body: "mock failure".to_string(),
            }),
            MockBehavior::Hang => {
                futures::future::pending::<()>().await;
                Err(LlmError::Timeout)
            }
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::drain_completion;
    use std::time::Duration;

    fn request(user: &str) -> CompletionRequest {
        CompletionRequest {
            system: String::new(),
            user: user.to_string(),
            max_tokens: 50,
            stop: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_echo_records_calls() {
        let mock = MockCompleter::default();
        let completion = mock.complete(&request("Question: Rust?\nContext")).await.unwrap();
        let text = drain_completion(completion, Duration::from_secs(1)).await.unwrap();

        assert_eq!(text, "Mock answer for: Question: Rust?");
        assert_eq!(mock.calls(), 1);
        assert_eq!(mock.last_request().unwrap().max_tokens, 50);
    }

    #[tokio::test]
    async fn test_stream_behavior() {
        let mock = MockCompleter::new(MockBehavior::Stream(vec!["a".into(), "b".into()]));
        let completion = mock.complete(&request("q")).await.unwrap();
        let text = drain_completion(completion, Duration::from_secs(1)).await.unwrap();
        assert_eq!(text, "ab");
    }

    #[tokio::test]
    async fn test_fail_behavior() {
        let mock = MockCompleter::new(MockBehavior::Fail);
        let err = mock.complete(&request("q")).await.unwrap_err();
        assert!(!err.is_transient());
    }

    #[test]
    fn test_truncate_on_char_boundary() {
        assert_eq!(truncate("héllo", 2), "hé...");
        assert_eq!(truncate("short", 10), "short");
    }
}
