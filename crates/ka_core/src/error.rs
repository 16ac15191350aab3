use serde::{Deserialize, Serialize};
use std::fmt;

/// Structured error shared by the document store, index, oracles and router.
///
/// `code` is a stable upper-snake identifier (`CONFIG_MISSING`, `AI_LLM_FAILED`, ...)
/// that callers match on; `message` is human-readable; `details` carries the
/// underlying cause. `retryable` marks transient failures (timeouts, 429, 5xx).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppError {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
    pub retryable: bool,
}

impl AppError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            retryable: false,
        }
    }

    /// Shorthand for a transient failure the caller may retry.
    pub fn transient(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(code, message).with_retryable(true)
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn is_config(&self) -> bool {
        self.code.starts_with("CONFIG_")
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.details.as_deref() {
            Some(d) => write!(f, "[{}] {} ({})", self.code, self.message, d),
            None => write!(f, "[{}] {}", self.code, self.message),
        }
    }
}

impl std::error::Error for AppError {}
