//! Remote summarizer abstraction and the Groq chat-completions adapter.
//!
//! Failures are classified here, at the edge, into a small enumeration so the query engine never
//! inspects provider wording: transient instability, rate limiting (split by whether request
//! frequency or token volume ran out), and rejection of the request itself. Authentication
//! problems and undecodable responses are reported separately because no retry policy fixes them.

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

/// Which dimension of a rate limit was exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitKind {
    /// Too many requests in the current window.
    Requests,
    /// Too many tokens in the current window.
    Tokens,
}

/// Errors surfaced by a remote summarizer.
#[derive(Debug, Error)]
pub enum SummarizationClientError {
    /// Service reported internal instability; the same request may succeed later.
    #[error("Summarization provider temporarily unavailable: {0}")]
    Transient(String),
    /// Service throttled the caller.
    #[error("Summarization provider rate limited ({limit:?}): {message}")]
    RateLimited {
        /// Exhausted dimension.
        limit: RateLimitKind,
        /// Wait suggested by the service, when it sent one.
        retry_after: Option<Duration>,
        /// Message reported by the service.
        message: String,
    },
    /// Request was rejected as malformed or too large.
    #[error("Summarization request rejected: {0}")]
    Rejected(String),
    /// Credential was missing or refused.
    #[error("Summarization provider refused credentials: {0}")]
    Unauthorized(String),
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
    /// Provider client could not be constructed or the request could not be built.
    #[error("Summarization provider unavailable: {0}")]
    ProviderUnavailable(String),
}

/// Request payload passed to the summarization provider.
#[derive(Debug, Clone)]
pub struct SummarizationRequest {
    /// Fully qualified model identifier understood by the provider.
    pub model: String,
    /// Instruction sent as the system message.
    pub instruction: String,
    /// Text to summarize.
    pub text: String,
}

/// Interface implemented by abstractive summarization providers.
#[async_trait]
pub trait SummarizationClient: Send + Sync {
    /// Generate a summary of `request.text` following `request.instruction`.
    async fn generate_summary(
        &self,
        request: SummarizationRequest,
    ) -> Result<String, SummarizationClientError>;
}

/// Client for Groq's OpenAI-compatible chat completions endpoint.
pub struct GroqClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl GroqClient {
    /// Build a client for `base_url` (e.g. `https://api.groq.com/openai`).
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, SummarizationClientError> {
        let http = Client::builder()
            .user_agent(concat!("docsum/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|error| {
                SummarizationClientError::ProviderUnavailable(format!(
                    "failed to construct HTTP client: {error}"
                ))
            })?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }

    /// Build a client from the loaded configuration.
    pub fn from_config(config: &crate::config::Config) -> Result<Self, SummarizationClientError> {
        Self::new(
            config.base_url.clone(),
            config.api_key.clone(),
            config.request_timeout,
        )
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1/chat/completions",
            self.base_url.trim_end_matches('/')
        )
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(rename = "type", default)]
    kind: Option<String>,
}

#[async_trait]
impl SummarizationClient for GroqClient {
    async fn generate_summary(
        &self,
        request: SummarizationRequest,
    ) -> Result<String, SummarizationClientError> {
        let payload = json!({
            "model": request.model,
            "messages": [
                { "role": "system", "content": request.instruction },
                { "role": "user", "content": request.text },
            ],
        });

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                if error.is_builder() {
                    SummarizationClientError::ProviderUnavailable(error.to_string())
                } else {
                    SummarizationClientError::Transient(format!(
                        "failed to reach {}: {error}",
                        self.base_url
                    ))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &headers, &body));
        }

        let body: ChatCompletion = response.json().await.map_err(|error| {
            SummarizationClientError::InvalidResponse(format!(
                "failed to decode chat completion: {error}"
            ))
        })?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| {
                SummarizationClientError::InvalidResponse(
                    "missing choices[0].message.content".into(),
                )
            })
    }
}

/// Map an unsuccessful HTTP response onto the failure taxonomy.
pub(crate) fn classify_failure(
    status: StatusCode,
    headers: &HeaderMap,
    body: &str,
) -> SummarizationClientError {
    let parsed = serde_json::from_str::<ErrorEnvelope>(body).ok();
    let message = parsed
        .as_ref()
        .map(|envelope| envelope.error.message.clone())
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| format!("{status}: {body}"));

    match status {
        StatusCode::TOO_MANY_REQUESTS => SummarizationClientError::RateLimited {
            limit: rate_limit_kind(headers, parsed.as_ref()),
            retry_after: retry_after(headers),
            message,
        },
        StatusCode::BAD_REQUEST | StatusCode::PAYLOAD_TOO_LARGE | StatusCode::UNPROCESSABLE_ENTITY => {
            SummarizationClientError::Rejected(message)
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            SummarizationClientError::Unauthorized(message)
        }
        status if status.is_server_error() => SummarizationClientError::Transient(message),
        _ => SummarizationClientError::InvalidResponse(message),
    }
}

fn rate_limit_kind(headers: &HeaderMap, parsed: Option<&ErrorEnvelope>) -> RateLimitKind {
    let exhausted = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.trim() == "0")
            .unwrap_or(false)
    };

    if exhausted("x-ratelimit-remaining-tokens") {
        return RateLimitKind::Tokens;
    }
    if exhausted("x-ratelimit-remaining-requests") {
        return RateLimitKind::Requests;
    }
    match parsed.and_then(|envelope| envelope.error.kind.as_deref()) {
        Some("tokens") => RateLimitKind::Tokens,
        _ => RateLimitKind::Requests,
    }
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|seconds| seconds.is_finite() && *seconds >= 0.0)
        .map(|seconds| Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX))
}
