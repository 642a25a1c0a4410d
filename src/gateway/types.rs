//! Core types for the model gateway.

use std::pin::Pin;

use futures::Stream;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::ProviderError;

// =============================================================================
// ATTRIBUTION
// =============================================================================

/// Attribution for diagnostics and debugging.
///
/// Every request through the gateway carries attribution so we know:
/// - Which turn it belongs to (turn_id)
/// - Which code path triggered it (caller)
#[derive(Debug, Clone, Copy, Default)]
pub struct Attribution {
    /// Turn this request is part of (if known).
    pub turn_id: Option<Uuid>,
    /// Which code path made this call, for debugging.
    /// Use a static string like "dispatch::chat" or "dispatch::enhance".
    pub caller: &'static str,
}

impl Attribution {
    pub fn new(caller: &'static str) -> Self {
        Self {
            caller,
            ..Default::default()
        }
    }

    pub fn with_turn(mut self, turn_id: Uuid) -> Self {
        self.turn_id = Some(turn_id);
        self
    }
}

// =============================================================================
// CHAT TYPES
// =============================================================================

/// Chat message role.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Request for a streamed chat completion.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Backend model identifier, e.g. "anthropic/claude-3.5-sonnet".
    pub model: String,
    /// Messages in the conversation.
    pub messages: Vec<Message>,
    /// Sampling temperature (0.0 - 2.0).
    pub temperature: f32,
    /// Maximum tokens to generate.
    pub max_tokens: Option<u32>,
    /// Attribution for diagnostics.
    pub attribution: Attribution,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>, attribution: Attribution) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: 0.7,
            max_tokens: None,
            attribution,
        }
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.temperature = t;
        self
    }

    pub fn max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }
}

// =============================================================================
// STREAMING
// =============================================================================

/// A finite, non-restartable sequence of response text fragments.
///
/// Terminates on stream end or with a single `Err` item; consumers accumulate
/// and forward after each item. Fragment order within one stream is the
/// backend's arrival order and is never reordered.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send>>;
