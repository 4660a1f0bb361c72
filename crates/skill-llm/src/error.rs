use thiserror::Error;

/// Error type for completion operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("API request failed: {0}")]
    Api(String),

    #[error("API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to parse API response: {0}")]
    Parse(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Timeout waiting for response")]
    Timeout,

    #[error("Model returned no text")]
    Empty,
}

impl LlmError {
    /// Worth another attempt with the same request
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::Api(_) | LlmError::RateLimitExceeded => true,
            LlmError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
