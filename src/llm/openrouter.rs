//! OpenRouter chat-completion client.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::error::{classify_http_status, LlmError, LlmErrorKind, RetryConfig};
use super::{ChatMessage, ChatRequest, ChatResponse, LlmClient, TokenUsage};

const OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

pub struct OpenRouterClient {
    http: Client,
    api_key: String,
    endpoint: String,
    retry: RetryConfig,
}

impl OpenRouterClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            api_key: api_key.into(),
            endpoint: OPENROUTER_API_URL.to_string(),
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Point at an OpenRouter-compatible endpoint other than the public one.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// One HTTP round trip, no retries.
    async fn send_once(&self, body: &WireRequest<'_>) -> Result<ChatResponse, LlmError> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .header("X-Title", "deckpilot")
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status().as_u16();
        let retry_after = retry_after(response.headers());
        let text = response.text().await.map_err(transport_error)?;

        if !(200..300).contains(&status) {
            return Err(status_error(status, text, retry_after));
        }

        let parsed: WireResponse = serde_json::from_str(&text)
            .map_err(|e| LlmError::parse_error(format!("{}: {}", e, text)))?;
        parsed.into_chat_response(body.model)
    }

    /// Retry transient failures with backoff, inside the configured
    /// wall-clock budget.
    async fn send(&self, body: &WireRequest<'_>) -> Result<ChatResponse, LlmError> {
        let deadline = Instant::now() + self.retry.max_retry_duration;
        let mut retries = 0;

        loop {
            let error = match self.send_once(body).await {
                Ok(response) => {
                    if retries > 0 {
                        tracing::info!("OpenRouter request succeeded after {} retries", retries);
                    }
                    return Ok(response);
                }
                Err(error) => error,
            };

            if !error.is_transient() {
                tracing::error!("OpenRouter request failed permanently: {}", error);
                return Err(error);
            }
            if retries >= self.retry.max_retries || !self.retry.should_retry(&error) {
                tracing::error!("OpenRouter request failed after {} retries: {}", retries, error);
                return Err(error);
            }

            let delay = error
                .suggested_delay(retries)
                .min(deadline.saturating_duration_since(Instant::now()));
            if delay.is_zero() {
                tracing::warn!("OpenRouter retry budget exhausted: {}", error);
                return Err(error);
            }

            retries += 1;
            tracing::warn!(
                "OpenRouter attempt {} failed ({}), retry {}/{} in {:?}",
                retries,
                error.kind,
                retries,
                self.retry.max_retries,
                delay
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl LlmClient for OpenRouterClient {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, LlmError> {
        let body = WireRequest {
            model: &request.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            response_format: request.json_mode.then_some(ResponseFormat::JsonObject),
        };
        tracing::debug!(
            "OpenRouter request: model={}, {} messages",
            request.model,
            request.messages.len()
        );
        self.send(&body).await
    }
}

fn transport_error(e: reqwest::Error) -> LlmError {
    let what = if e.is_timeout() {
        "timed out"
    } else if e.is_connect() {
        "connection failed"
    } else {
        "request failed"
    };
    LlmError::network_error(format!("{}: {}", what, e))
}

fn status_error(status: u16, body: String, retry_after: Option<Duration>) -> LlmError {
    match classify_http_status(status) {
        LlmErrorKind::RateLimited => LlmError::rate_limited(body, retry_after),
        LlmErrorKind::ClientError => LlmError::client_error(status, body),
        _ => LlmError::server_error(status, body),
    }
}

/// Retry-After in delta-seconds form. HTTP dates are ignored.
fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseFormat {
    JsonObject,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: Option<String>,
}

impl WireResponse {
    fn into_chat_response(self, requested_model: &str) -> Result<ChatResponse, LlmError> {
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::parse_error("response has no choices".to_string()))?;

        if choice.finish_reason.as_deref() == Some("length") {
            tracing::warn!("Completion from {} was truncated", requested_model);
        }

        Ok(ChatResponse {
            content: choice.message.content.filter(|c| !c.trim().is_empty()),
            finish_reason: choice.finish_reason,
            usage: self.usage,
            model: self.model.unwrap_or_else(|| requested_model.to_string()),
        })
    }
}
