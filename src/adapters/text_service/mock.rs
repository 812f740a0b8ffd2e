//! Mock text service for testing and offline runs.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::ports::{TextRequest, TextResponse, TextService, TextServiceError, TokenUsage};

/// Mock reply configuration.
#[derive(Debug, Clone)]
pub struct MockReply {
    /// Generated text
    pub text: String,
    /// Whether to simulate an overload signal
    pub overloaded: bool,
    /// Retry-after hint attached to the overload signal
    pub retry_after: Option<Duration>,
    /// Whether to simulate a hard failure
    pub fail: bool,
    /// Error message if failing
    pub error_message: Option<String>,
    /// Input tokens reported
    pub input_tokens: u64,
    /// Output tokens reported
    pub output_tokens: u64,
}

impl Default for MockReply {
    fn default() -> Self {
        Self {
            text: "Mock chunk completed successfully with the requested deliverable."
                .to_string(),
            overloaded: false,
            retry_after: None,
            fail: false,
            error_message: None,
            input_tokens: 100,
            output_tokens: 50,
        }
    }
}

impl MockReply {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn overload(retry_after: Option<Duration>) -> Self {
        Self {
            overloaded: true,
            retry_after,
            ..Default::default()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            fail: true,
            error_message: Some(error.into()),
            ..Default::default()
        }
    }
}

/// Mock text service for testing and offline runs.
pub struct MockTextService {
    default_reply: MockReply,
    reply_overrides: Arc<RwLock<HashMap<Uuid, MockReply>>>,
    requests: Arc<RwLock<Vec<TextRequest>>>,
}

impl MockTextService {
    pub fn new() -> Self {
        Self {
            default_reply: MockReply::default(),
            reply_overrides: Arc::new(RwLock::new(HashMap::new())),
            requests: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn with_default_reply(reply: MockReply) -> Self {
        Self {
            default_reply: reply,
            reply_overrides: Arc::new(RwLock::new(HashMap::new())),
            requests: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Set a specific reply for a chunk ID.
    pub async fn set_reply_for_chunk(&self, chunk_id: Uuid, reply: MockReply) {
        let mut overrides = self.reply_overrides.write().await;
        overrides.insert(chunk_id, reply);
    }

    /// Get the reply for a chunk.
    async fn get_reply(&self, chunk_id: Uuid) -> MockReply {
        let overrides = self.reply_overrides.read().await;
        overrides
            .get(&chunk_id)
            .cloned()
            .unwrap_or_else(|| self.default_reply.clone())
    }

    /// Get all requests received so far.
    pub async fn received_requests(&self) -> Vec<TextRequest> {
        let requests = self.requests.read().await;
        requests.clone()
    }

    /// Clear recorded requests.
    pub async fn clear(&self) {
        let mut requests = self.requests.write().await;
        requests.clear();
    }
}

impl Default for MockTextService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextService for MockTextService {
    async fn generate(&self, request: &TextRequest) -> Result<TextResponse, TextServiceError> {
        {
            let mut requests = self.requests.write().await;
            requests.push(request.clone());
        }

        let reply = self.get_reply(request.chunk_id).await;

        if reply.overloaded {
            return Err(TextServiceError::Overloaded {
                retry_after: reply.retry_after,
            });
        }
        if reply.fail {
            return Err(TextServiceError::InvalidRequest(
                reply
                    .error_message
                    .unwrap_or_else(|| "Mock failure".to_string()),
            ));
        }

        Ok(TextResponse {
            text: reply.text,
            usage: TokenUsage::new(reply.input_tokens, reply.output_tokens),
            model: Some("mock".to_string()),
        })
    }

    async fn health_check(&self) -> Result<(), TextServiceError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_generate_success() {
        let service = MockTextService::new();
        let request = TextRequest::new(Uuid::new_v4(), "caller-1", "Draft the outline", 500);

        let response = service.generate(&request).await.unwrap();

        assert!(!response.text.is_empty());
        assert_eq!(response.usage.total(), 150);
        assert_eq!(service.received_requests().await.len(), 1);
    }

    #[tokio::test]
    async fn test_mock_generate_failure() {
        let service = MockTextService::with_default_reply(MockReply::failure("Test error"));
        let request = TextRequest::new(Uuid::new_v4(), "caller-1", "Draft the outline", 500);

        let err = service.generate(&request).await.unwrap_err();

        assert!(matches!(err, TextServiceError::InvalidRequest(_)));
        assert!(!err.is_overload());
    }

    #[tokio::test]
    async fn test_mock_overload_with_hint() {
        let service =
            MockTextService::with_default_reply(MockReply::overload(Some(Duration::from_secs(7))));
        let request = TextRequest::new(Uuid::new_v4(), "caller-1", "Draft the outline", 500);

        let err = service.generate(&request).await.unwrap_err();

        assert!(err.is_overload());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
    }

    #[tokio::test]
    async fn test_mock_custom_reply_per_chunk() {
        let service = MockTextService::new();
        let chunk_id = Uuid::new_v4();

        service
            .set_reply_for_chunk(chunk_id, MockReply::success("Custom output"))
            .await;

        let targeted = TextRequest::new(chunk_id, "caller-1", "Draft the outline", 500);
        let other = TextRequest::new(Uuid::new_v4(), "caller-1", "Draft the outline", 500);

        let response = service.generate(&targeted).await.unwrap();
        assert_eq!(response.text, "Custom output");

        let response = service.generate(&other).await.unwrap();
        assert_ne!(response.text, "Custom output");
    }
}
