//! Per-call diagnostics via the UsageSink trait.
//!
//! The gateway logs all calls through a UsageSink. This decouples the gateway
//! from any specific diagnostic channel:
//! - Hosts embed their own sink (panel diagnostics, telemetry)
//! - CLI tools use NoopUsageSink or StderrUsageSink
//! - Tests use NoopUsageSink

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Status of a backend call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus {
    Success,
    Error,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Success => "success",
            CallStatus::Error => "error",
        }
    }
}

/// Record of a backend API call for logging.
#[derive(Debug, Clone)]
pub struct ProviderCallRecord {
    /// Backend name: "openai-compatible", etc.
    pub provider: &'static str,
    /// Endpoint: "chat/completions", "models".
    pub endpoint: &'static str,
    /// Model used.
    pub model: String,
    /// Turn this call belonged to (if any).
    pub turn_id: Option<Uuid>,
    /// Time until the call was accepted (for streams: time to open).
    pub latency_ms: i32,
    /// Call status.
    pub status: CallStatus,
    /// Error code if status is Error.
    pub error_code: Option<String>,
    /// Which code path made this call.
    pub caller: &'static str,
    /// When the call was made.
    pub timestamp: DateTime<Utc>,
}

impl ProviderCallRecord {
    /// Create a new record with required fields, defaulting others.
    pub fn new(
        provider: &'static str,
        endpoint: &'static str,
        model: impl Into<String>,
        caller: &'static str,
    ) -> Self {
        Self {
            provider,
            endpoint,
            model: model.into(),
            turn_id: None,
            latency_ms: 0,
            status: CallStatus::Success,
            error_code: None,
            caller,
            timestamp: Utc::now(),
        }
    }

    pub fn turn(mut self, turn_id: Option<Uuid>) -> Self {
        self.turn_id = turn_id;
        self
    }

    pub fn latency(mut self, ms: i32) -> Self {
        self.latency_ms = ms;
        self
    }

    pub fn error(mut self, code: impl Into<String>) -> Self {
        self.status = CallStatus::Error;
        self.error_code = Some(code.into());
        self
    }
}

/// Trait for recording backend call diagnostics.
#[async_trait]
pub trait UsageSink: Send + Sync {
    /// Record a backend call. This should be fire-and-forget:
    /// failures should be logged but not propagated.
    async fn record(&self, record: ProviderCallRecord);
}

/// No-op usage sink that discards all records.
/// Useful for CLI tools and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopUsageSink;

#[async_trait]
impl UsageSink for NoopUsageSink {
    async fn record(&self, _record: ProviderCallRecord) {
        // Discard
    }
}

/// Usage sink that writes to stderr as JSON lines.
/// Useful for CLI tools that want to capture diagnostics.
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrUsageSink;

#[async_trait]
impl UsageSink for StderrUsageSink {
    async fn record(&self, record: ProviderCallRecord) {
        eprintln!(
            r#"{{"provider":"{}","endpoint":"{}","model":"{}","latency_ms":{},"status":"{}","error_code":{},"caller":"{}"}}"#,
            record.provider,
            record.endpoint,
            record.model,
            record.latency_ms,
            record.status.as_str(),
            record
                .error_code
                .as_deref()
                .map(|c| format!("\"{c}\""))
                .unwrap_or_else(|| "null".to_string()),
            record.caller,
        );
    }
}
