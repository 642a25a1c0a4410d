//! OpenAI-compatible adapter for streamed chat completions.
//!
//! Talks to any server exposing the `/models` and `/chat/completions`
//! endpoints (OpenRouter, LM Studio, vLLM, the hosted APIs). Responses are
//! consumed as server-sent events and surfaced as a lazy fragment stream.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use super::error::{ErrorContext, ProviderError};
use super::types::{ChatRequest, FragmentStream, Message, Role};

// =============================================================================
// TRAIT
// =============================================================================

/// Trait for streamed chat completion backends.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// List model identifiers known to the backend.
    async fn list_models(&self) -> Result<Vec<String>, ProviderError>;

    /// Open a streamed chat completion. Fails before the first fragment if
    /// the backend rejects the request; failures after that surface as an
    /// `Err` item in the returned stream.
    async fn stream_chat(&self, req: &ChatRequest) -> Result<FragmentStream, ProviderError>;
}

// =============================================================================
// ADAPTER
// =============================================================================

/// Maximum allowed accumulated response length (1MB).
const MAX_RESPONSE_LEN: usize = 1_024 * 1_024;

/// Maximum allowed input characters (~125k tokens).
const MAX_INPUT_CHARS: usize = 500_000;

/// OpenAI-compatible API adapter for streamed chat completions.
#[derive(Debug, Clone)]
pub struct OpenAiAdapter {
    client: reqwest::Client,
    base_url: String,
}

impl OpenAiAdapter {
    /// Create against a base URL with an optional API key (local servers
    /// typically run without one).
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<&str>,
    ) -> Result<Self, ProviderError> {
        Self::with_config(base_url, api_key, Duration::from_secs(120))
    }

    /// Create from environment variables.
    pub fn from_env() -> Result<Self, ProviderError> {
        let base_url = std::env::var("CHORUS_BASE_URL")
            .map_err(|_| ProviderError::config("CHORUS_BASE_URL not set"))?;

        let api_key = std::env::var("CHORUS_API_KEY").ok();

        let timeout = std::env::var("CHORUS_TIMEOUT_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(120));

        Self::with_config(base_url, api_key.as_deref(), timeout)
    }

    /// Create with custom configuration.
    pub fn with_config(
        base_url: impl Into<String>,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let base_url = base_url.into();

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(key) = api_key {
            let auth_value = HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|_| ProviderError::config("Invalid API key format"))?;
            headers.insert(AUTHORIZATION, auth_value);
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .gzip(true)
            .build()
            .map_err(|e| ProviderError::config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client, base_url })
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn models_url(&self) -> String {
        format!("{}/models", self.base_url.trim_end_matches('/'))
    }

    /// Extract request ID from response headers.
    fn extract_request_id(headers: &reqwest::header::HeaderMap) -> Option<String> {
        headers
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
    }
}

// =============================================================================
// API TYPES
// =============================================================================

#[derive(Serialize)]
struct ChatApiRequest<'a> {
    model: &'a str,
    messages: &'a [ApiMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Serialize)]
struct ApiMessage {
    role: String,
    content: String,
}

impl From<&Message> for ApiMessage {
    fn from(m: &Message) -> Self {
        Self {
            role: match m.role {
                Role::System => "system".to_string(),
                Role::User => "user".to_string(),
                Role::Assistant => "assistant".to_string(),
            },
            content: m.content.clone(),
        }
    }
}

#[derive(Deserialize)]
struct ModelsResponse {
    data: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDelta>,
}

#[derive(Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct ApiError {
    message: Option<String>,
    code: Option<serde_json::Value>,
}

impl ApiError {
    fn code_str(&self) -> Option<String> {
        match &self.code {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(serde_json::Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }
}

// =============================================================================
// SSE PARSING
// =============================================================================

/// One parsed server-sent event line.
enum SseLine {
    /// No payload (blank line, comment, or non-data field).
    Skip,
    /// Terminal `[DONE]` marker.
    Done,
    /// A data payload carrying a JSON chunk.
    Data(String),
}

fn parse_sse_line(line: &str) -> SseLine {
    let line = line.trim_end_matches('\r');
    if line.is_empty() || line.starts_with(':') {
        return SseLine::Skip;
    }
    let Some(payload) = line
        .strip_prefix("data: ")
        .or_else(|| line.strip_prefix("data:"))
    else {
        return SseLine::Skip;
    };
    let payload = payload.trim();
    if payload == "[DONE]" {
        SseLine::Done
    } else {
        SseLine::Data(payload.to_string())
    }
}

/// Extract the delta text from one SSE data payload.
///
/// Returns `Ok(None)` for chunks without content (role announcements,
/// finish-reason-only chunks).
fn delta_from_chunk(payload: &str) -> Result<Option<String>, ProviderError> {
    let chunk: StreamChunk = serde_json::from_str(payload)
        .map_err(|e| ProviderError::stream(format!("invalid chunk JSON: {e}")))?;

    if let Some(error) = chunk.error {
        return Err(ProviderError::stream(
            error.message.unwrap_or_else(|| "unknown backend error".to_string()),
        ));
    }

    let content = chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta)
        .and_then(|d| d.content)
        .filter(|s| !s.is_empty());

    Ok(content)
}

/// Map a non-success HTTP response to a ProviderError.
fn classify_http_error(status: u16, body: &str, request_id: Option<String>) -> ProviderError {
    let mut ctx = ErrorContext::new().with_status(status);
    if let Some(id) = request_id {
        ctx = ctx.with_request_id(id);
    }

    let (message, code) = match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => match parsed.error {
            Some(err) => (err.message.clone().unwrap_or_default(), err.code_str()),
            None => (format!("HTTP {status}"), None),
        },
        Err(_) => (format!("HTTP {status}"), None),
    };
    if let Some(code) = &code {
        ctx = ctx.with_code(code.clone());
    }

    let lower = message.to_lowercase();
    let model_missing = code.as_deref() == Some("model_not_found")
        || lower.contains("model not found")
        || lower.contains("does not exist")
        || lower.contains("unsupported");

    match status {
        404 => ProviderError::incompatible_with_context(message, ctx),
        400 if model_missing => ProviderError::incompatible_with_context(message, ctx),
        400..=403 | 405..=428 => ProviderError::invalid_request_with_context(message, ctx),
        429 => ProviderError::rate_limited(Duration::from_secs(60), ctx),
        _ => ProviderError::provider_with_context("openai-compatible", message, status >= 500, ctx),
    }
}

// =============================================================================
// CHAT PROVIDER IMPL
// =============================================================================

#[async_trait]
impl ChatProvider for OpenAiAdapter {
    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        let response = self.client.get(self.models_url()).send().await?;
        let status = response.status();
        let request_id = Self::extract_request_id(response.headers());

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_http_error(status.as_u16(), &body, request_id));
        }

        let parsed: ModelsResponse = response.json().await.map_err(|e| {
            ProviderError::provider("openai-compatible", format!("Invalid JSON: {e}"), false)
        })?;

        Ok(parsed.data.into_iter().map(|m| m.id).collect())
    }

    async fn stream_chat(&self, req: &ChatRequest) -> Result<FragmentStream, ProviderError> {
        let total_chars: usize = req.messages.iter().map(|m| m.content.len()).sum();
        if total_chars > MAX_INPUT_CHARS {
            return Err(ProviderError::invalid_request(format!(
                "Input too large: {total_chars} chars (max {MAX_INPUT_CHARS})"
            )));
        }

        let messages: Vec<ApiMessage> = req.messages.iter().map(ApiMessage::from).collect();

        let api_req = ChatApiRequest {
            model: &req.model,
            messages: &messages,
            temperature: req.temperature,
            max_tokens: req.max_tokens,
            stream: true,
        };

        let mut response = self
            .client
            .post(self.chat_url())
            .json(&api_req)
            .send()
            .await?;

        let status = response.status();
        let request_id = Self::extract_request_id(response.headers());

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_http_error(status.as_u16(), &body, request_id));
        }

        let stream = async_stream::try_stream! {
            let mut buf: Vec<u8> = Vec::new();
            let mut accumulated = 0usize;

            'read: loop {
                let chunk = response
                    .chunk()
                    .await
                    .map_err(|e| ProviderError::stream(format!("reading response: {e}")))?;
                let Some(chunk) = chunk else { break 'read };
                buf.extend_from_slice(&chunk);

                // SSE frames are newline-delimited; a full line is valid UTF-8
                // even when the transport chunk split a multibyte character.
                while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                    let line: Vec<u8> = buf.drain(..=pos).collect();
                    let line = String::from_utf8_lossy(&line[..line.len() - 1]).to_string();
                    match parse_sse_line(&line) {
                        SseLine::Skip => {}
                        SseLine::Done => break 'read,
                        SseLine::Data(payload) => {
                            if let Some(delta) = delta_from_chunk(&payload)? {
                                accumulated += delta.len();
                                if accumulated > MAX_RESPONSE_LEN {
                                    Err::<(), ProviderError>(ProviderError::stream(format!(
                                        "Response too large: {accumulated} bytes"
                                    )))?;
                                }
                                yield delta;
                            }
                        }
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}
