//! OpenAI-compatible inference client.
//!
//! Sends non-streaming chat completion requests and returns the assistant
//! text. The engine only sees the `ModelClient` trait, so tests and hosts can
//! substitute their own model boundary.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;

use super::errors::ModelError;
use super::types::{ChatCompletionRequest, ChatCompletionResponse, ChatMessage};
use crate::config::ModelSettings;

// ─── Constants ───────────────────────────────────────────────────────────────

/// TCP connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

// ─── ModelClient ─────────────────────────────────────────────────────────────

/// The model-call boundary: messages in, assistant text out.
///
/// `Ok` is the success branch (the text may be empty); `Err` carries the
/// failure reason.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn call_model(&self, messages: &[ChatMessage]) -> Result<String, ModelError>;
}

// ─── OpenAiCompatClient ──────────────────────────────────────────────────────

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiCompatClient {
    http: HttpClient,
    settings: ModelSettings,
}

impl OpenAiCompatClient {
    /// Build the client. Does NOT check connectivity; that happens on the
    /// first request.
    pub fn from_settings(settings: ModelSettings) -> Result<Self, ModelError> {
        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(|e| ModelError::ConnectionFailed {
                endpoint: settings.base_url.clone(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self { http, settings })
    }

    pub fn model_name(&self) -> &str {
        &self.settings.model_name
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.settings.base_url.trim_end_matches('/'))
    }

    fn classify_send_error(&self, url: &str, e: reqwest::Error) -> ModelError {
        if e.is_timeout() {
            ModelError::Timeout {
                duration_secs: self.settings.request_timeout_secs,
            }
        } else {
            ModelError::ConnectionFailed {
                endpoint: url.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl ModelClient for OpenAiCompatClient {
    async fn call_model(&self, messages: &[ChatMessage]) -> Result<String, ModelError> {
        let url = self.endpoint();
        let body = ChatCompletionRequest {
            model: &self.settings.model_name,
            messages,
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            stream: false,
        };

        // Log the request metadata (not the full body; it can be huge)
        tracing::info!(
            url = %url,
            model = %body.model,
            message_count = messages.len(),
            "model request"
        );

        let mut request = self.http.post(&url).json(&body);
        if let Some(key) = self.settings.api_key.as_deref() {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.classify_send_error(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(ModelError::HttpError {
                status: status.as_u16(),
                body: body_text,
            });
        }

        let body_text = response
            .text()
            .await
            .map_err(|e| self.classify_send_error(&url, e))?;

        let text = parse_completion(&body_text)?;
        tracing::debug!(chars = text.len(), "model response");
        Ok(text)
    }
}

/// Pull the first choice's content out of a completion body.
///
/// `null` content is treated as empty text, not an error; the caller decides
/// what an empty turn means.
pub fn parse_completion(body: &str) -> Result<String, ModelError> {
    let resp: ChatCompletionResponse =
        serde_json::from_str(body).map_err(|e| ModelError::InvalidResponse {
            reason: format!("failed to parse completion: {e}"),
        })?;

    let choice = resp
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ModelError::InvalidResponse {
            reason: "completion has no choices".to_string(),
        })?;

    Ok(choice.message.content.unwrap_or_default())
}

// ─── Tests ───────────────────────────────────────────────────────────────────
