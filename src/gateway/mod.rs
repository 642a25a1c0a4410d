//! Model gateway: the host capability for listing backends and opening
//! streamed chat completions.

pub mod error;
pub mod openai;
pub mod types;
pub mod usage;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::sleep;

use openai::{ChatProvider, OpenAiAdapter};
use usage::{ProviderCallRecord, UsageSink as UsageSinkTrait};

pub use error::{ErrorContext, ProviderError};
pub use types::*;
pub use usage::{NoopUsageSink, StderrUsageSink, UsageSink};

/// The model-access capability the orchestration core runs against.
///
/// `list_models` resolves identifiers to live backends; `stream_chat` opens
/// one streamed completion. Errors are always per-call.
#[async_trait::async_trait]
pub trait ChatGateway: Send + Sync {
    /// List backend model identifiers, optionally filtered.
    ///
    /// With a filter, an exact identifier match wins; otherwise any model
    /// whose lowercased identifier contains the lowercased filter matches.
    async fn list_models(&self, filter: Option<&str>) -> Result<Vec<String>, ProviderError>;

    /// Open a streamed chat completion against one backend model.
    async fn stream_chat(&self, req: ChatRequest) -> Result<FragmentStream, ProviderError>;
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub max_retries: u32,
    pub retry_base_delay: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            retry_base_delay: Duration::from_secs(1),
        }
    }
}

/// Gateway over an OpenAI-compatible adapter with retry and diagnostics.
///
/// Retries apply only to opening a stream (nothing has been forwarded yet);
/// a failure mid-stream is surfaced to that target and never retried.
pub struct ProviderGateway<U: UsageSinkTrait> {
    adapter: OpenAiAdapter,
    usage_sink: Arc<U>,
    config: GatewayConfig,
}

#[async_trait::async_trait]
impl<U: UsageSinkTrait> ChatGateway for ProviderGateway<U> {
    async fn list_models(&self, filter: Option<&str>) -> Result<Vec<String>, ProviderError> {
        ProviderGateway::list_models(self, filter).await
    }

    async fn stream_chat(&self, req: ChatRequest) -> Result<FragmentStream, ProviderError> {
        ProviderGateway::stream_chat(self, req).await
    }
}

impl<U: UsageSinkTrait> ProviderGateway<U> {
    pub fn from_env(usage_sink: Arc<U>) -> Result<Self, ProviderError> {
        let adapter = OpenAiAdapter::from_env()?;
        Ok(Self {
            adapter,
            usage_sink,
            config: GatewayConfig::default(),
        })
    }

    pub fn with_config(adapter: OpenAiAdapter, usage_sink: Arc<U>, config: GatewayConfig) -> Self {
        Self {
            adapter,
            usage_sink,
            config,
        }
    }

    pub async fn list_models(&self, filter: Option<&str>) -> Result<Vec<String>, ProviderError> {
        let models = self.adapter.list_models().await?;

        let Some(filter) = filter else {
            return Ok(models);
        };

        if models.iter().any(|m| m == filter) {
            return Ok(vec![filter.to_string()]);
        }

        let needle = filter.to_lowercase();
        Ok(models
            .into_iter()
            .filter(|m| m.to_lowercase().contains(&needle))
            .collect())
    }

    pub async fn stream_chat(&self, req: ChatRequest) -> Result<FragmentStream, ProviderError> {
        let start = Instant::now();
        let mut last_error: Option<ProviderError> = None;

        for attempt in 0..=self.config.max_retries {
            match self.adapter.stream_chat(&req).await {
                Ok(stream) => {
                    self.record(&req, start, None).await;
                    return Ok(stream);
                }
                Err(err) => {
                    self.record(&req, start, Some(err.code())).await;

                    if !err.is_retryable() || attempt == self.config.max_retries {
                        return Err(err);
                    }

                    let delay = backoff_delay(self.config.retry_base_delay, attempt);
                    last_error = Some(err);
                    sleep(delay).await;
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            ProviderError::provider("openai-compatible", "unknown error", false)
        }))
    }

    async fn record(&self, req: &ChatRequest, start: Instant, error_code: Option<&str>) {
        let record = ProviderCallRecord::new(
            "openai-compatible",
            "chat/completions",
            req.model.clone(),
            req.attribution.caller,
        )
        .turn(req.attribution.turn_id)
        .latency(start.elapsed().as_millis() as i32);

        let record = match error_code {
            Some(code) => record.error(code.to_string()),
            None => record,
        };

        self.usage_sink.record(record).await;
    }
}

fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let multiplier = 2u64.pow(attempt.min(5));
    base * multiplier as u32
}
