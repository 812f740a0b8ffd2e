//! Remote generative-text service port.
//!
//! The service is an opaque remote dependency reached through one narrow
//! operation: submit a bounded request, receive either a result with a
//! token-usage count, an overload signal with an optional retry-after hint,
//! or a hard error. Nothing above the governor calls it directly.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// A bounded generation request for one chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRequest {
    /// Chunk this request executes
    pub chunk_id: Uuid,
    /// Caller identity, passed through for accounting
    pub caller_id: String,
    /// The sub-goal text to work on
    pub instruction: String,
    /// Generation budget for this request
    pub max_tokens: u32,
    /// Set on the degraded service-failure retry: core deliverable only
    pub reduced_scope: bool,
    /// Set on the adjusted quality-gate retry: what to address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision_note: Option<String>,
}

impl TextRequest {
    pub fn new(chunk_id: Uuid, caller_id: impl Into<String>, instruction: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            chunk_id,
            caller_id: caller_id.into(),
            instruction: instruction.into(),
            max_tokens,
            reduced_scope: false,
            revision_note: None,
        }
    }

    /// Derive the degraded retry request: half the budget, core scope only.
    pub fn reduced(&self) -> Self {
        let mut request = self.clone();
        request.reduced_scope = true;
        request.max_tokens = (request.max_tokens / 2).max(64);
        request
    }

    /// Derive the adjusted retry request carrying gate feedback.
    pub fn with_revision_note(&self, note: impl Into<String>) -> Self {
        let mut request = self.clone();
        request.revision_note = Some(note.into());
        request
    }
}

/// Token consumption reported by the service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self { input_tokens, output_tokens }
    }

    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Successful generation result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextResponse {
    /// Generated text
    pub text: String,
    /// Tokens consumed by this request
    pub usage: TokenUsage,
    /// Model the gateway served the request with, when reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Errors surfaced by the text service port.
#[derive(Debug, Error)]
pub enum TextServiceError {
    #[error("Service overloaded{}", retry_after.map(|d| format!(", retry after {}ms", d.as_millis())).unwrap_or_default())]
    Overloaded { retry_after: Option<Duration> },

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Malformed response: {0}")]
    Serialization(String),
}

impl TextServiceError {
    /// Overload-class errors are reported to the governor and retried on the
    /// same chunk after backoff. Everything else is a hard failure handled by
    /// the chunk's service-failure fallback.
    pub fn is_overload(&self) -> bool {
        matches!(self, Self::Overloaded { .. } | Self::Unavailable(_) | Self::Transport(_))
    }

    /// Retry-after hint if the service provided one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Overloaded { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Narrow interface to the remote generative-text service.
#[async_trait]
pub trait TextService: Send + Sync {
    /// Submit a bounded request and wait for its result.
    async fn generate(&self, request: &TextRequest) -> Result<TextResponse, TextServiceError>;

    /// Cheap reachability probe used before starting a run.
    async fn health_check(&self) -> Result<(), TextServiceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reduced_request_halves_budget() {
        let request = TextRequest::new(Uuid::new_v4(), "caller-1", "Draft the summary", 1_000);
        let reduced = request.reduced();
        assert!(reduced.reduced_scope);
        assert_eq!(reduced.max_tokens, 500);
        // Floor keeps tiny budgets usable
        let tiny = TextRequest::new(Uuid::new_v4(), "caller-1", "x", 10).reduced();
        assert_eq!(tiny.max_tokens, 64);
    }

    #[test]
    fn test_error_classification() {
        assert!(TextServiceError::Overloaded { retry_after: None }.is_overload());
        assert!(TextServiceError::Unavailable("503".into()).is_overload());
        assert!(TextServiceError::Transport("reset".into()).is_overload());
        assert!(!TextServiceError::InvalidRequest("bad".into()).is_overload());
        assert!(!TextServiceError::Unauthorized("key".into()).is_overload());
    }

    #[test]
    fn test_retry_after_only_from_overload() {
        let hinted = TextServiceError::Overloaded { retry_after: Some(Duration::from_secs(5)) };
        assert_eq!(hinted.retry_after(), Some(Duration::from_secs(5)));
        assert_eq!(TextServiceError::Unavailable("502".into()).retry_after(), None);
    }
}
