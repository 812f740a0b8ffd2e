//! HTTP adapter for the generative-text gateway.
//!
//! Talks to a single narrow endpoint: POST a bounded generation request,
//! map the response status onto the port's error taxonomy. Overload (429 and
//! 529) carries the gateway's Retry-After hint through to the governor.

use async_trait::async_trait;
use reqwest::{header, Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::models::ServiceSettings;
use crate::domain::ports::{TextRequest, TextResponse, TextService, TextServiceError, TokenUsage};

pub struct HttpTextService {
    settings: ServiceSettings,
    client: Client,
}

impl HttpTextService {
    pub fn new(settings: ServiceSettings) -> Result<Self, TextServiceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| TextServiceError::Transport(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { settings, client })
    }

    fn build_request(&self, request: &TextRequest) -> GenerateBody {
        GenerateBody {
            model: self.settings.model.clone(),
            input: compose_input(request),
            max_tokens: request.max_tokens.min(self.settings.max_output_tokens).max(1),
            metadata: GenerateMetadata {
                caller_id: request.caller_id.clone(),
                chunk_id: request.chunk_id.to_string(),
            },
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.settings.base_url.trim_end_matches('/'), path)
    }
}

/// Render the port request into one instruction string. Degraded-scope and
/// revision markers ride along as trailing notes.
fn compose_input(request: &TextRequest) -> String {
    let mut input = request.instruction.clone();
    if request.reduced_scope {
        input.push_str(
            "\n\nScope note: deliver only the core result; omit background and elaboration.",
        );
    }
    if let Some(note) = &request.revision_note {
        input.push_str(&format!(
            "\n\nRevision note: the previous attempt failed these checks: {note}. Address them."
        ));
    }
    input
}

fn retry_after_hint(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

async fn error_from_response(response: Response) -> TextServiceError {
    let status = response.status();
    let hint = retry_after_hint(&response);
    let body = response.text().await.unwrap_or_default();

    match status {
        StatusCode::TOO_MANY_REQUESTS => TextServiceError::Overloaded { retry_after: hint },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            TextServiceError::Unauthorized(format!("{status}: {body}"))
        }
        // 529 is the gateway's explicit overload signal.
        s if s.as_u16() == 529 => TextServiceError::Overloaded { retry_after: hint },
        s if s.is_server_error() => TextServiceError::Unavailable(format!("{status}: {body}")),
        _ => TextServiceError::InvalidRequest(format!("{status}: {body}")),
    }
}

#[async_trait]
impl TextService for HttpTextService {
    async fn generate(&self, request: &TextRequest) -> Result<TextResponse, TextServiceError> {
        let body = self.build_request(request);

        let mut http_request = self
            .client
            .post(self.endpoint("/v1/generate"))
            .header(header::CONTENT_TYPE, "application/json")
            .json(&body);
        if let Some(key) = &self.settings.api_key {
            http_request = http_request.bearer_auth(key);
        }

        let response = http_request
            .send()
            .await
            .map_err(|e| TextServiceError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| TextServiceError::Serialization(e.to_string()))?;

        Ok(TextResponse {
            text: parsed.output,
            usage: TokenUsage::new(parsed.usage.input_tokens, parsed.usage.output_tokens),
            model: parsed.model,
        })
    }

    async fn health_check(&self) -> Result<(), TextServiceError> {
        let response = self
            .client
            .get(self.endpoint("/health"))
            .send()
            .await
            .map_err(|e| TextServiceError::Transport(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(error_from_response(response).await)
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateBody {
    model: String,
    input: String,
    max_tokens: u32,
    metadata: GenerateMetadata,
}

#[derive(Debug, Serialize)]
struct GenerateMetadata {
    caller_id: String,
    chunk_id: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    output: String,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: UsageBody,
}

#[derive(Debug, Default, Deserialize)]
struct UsageBody {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}
