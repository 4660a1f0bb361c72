//! Error types for the query pipeline.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::validation::RejectReason;

/// Failures `answer_query` reports to its caller.
///
/// Quota exhaustion and inference failures are not errors: they degrade the
/// reply and are flagged on the response instead.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The query failed validation. Never retried.
    #[error("Query rejected ({reason}): {message}")]
    InputRejected {
        reason: RejectReason,
        message: String,
    },

    /// Outside the availability window
    #[error("Window closed: {message}")]
    WindowClosed {
        message: String,
        reopens_at: Option<DateTime<Utc>>,
    },

    /// Every vector backend failed
    #[error("search unavailable")]
    SearchUnavailable,
}

impl QueryError {
    /// Stable machine-readable category
    pub fn category(&self) -> &'static str {
        match self {
            QueryError::InputRejected { .. } => "input_rejected",
            QueryError::WindowClosed { .. } => "window_closed",
            QueryError::SearchUnavailable => "search_unavailable",
        }
    }

    /// Message safe to show an end user
    pub fn user_message(&self) -> String {
        match self {
            QueryError::InputRejected { message, .. } => message.clone(),
            QueryError::WindowClosed { message, .. } => message.clone(),
            QueryError::SearchUnavailable => {
                "Search is temporarily unavailable. Please try again in a few minutes.".to_string()
            }
        }
    }

    /// Worth retrying the same query later
    pub fn is_retryable(&self) -> bool {
        matches!(self, QueryError::SearchUnavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories_are_distinct() {
        let errors = [
            QueryError::InputRejected {
                reason: RejectReason::TooShort,
                message: "too short".into(),
            },
            QueryError::WindowClosed {
                message: "closed".into(),
                reopens_at: None,
            },
            QueryError::SearchUnavailable,
        ];
        let categories: Vec<&str> = errors.iter().map(|e| e.category()).collect();
        assert_eq!(
            categories,
            vec!["input_rejected", "window_closed", "search_unavailable"]
        );
        assert!(errors[2].is_retryable());
        assert!(!errors[0].is_retryable());
    }

    #[test]
    fn test_user_message_hides_internals() {
        let message = QueryError::SearchUnavailable.user_message();
        assert!(!message.contains("rocksdb"));
        assert!(message.contains("temporarily unavailable"));
    }
}
