//! Per-target presentation state.
//!
//! The sink tracks one display slot per target name: pending placeholder,
//! streaming accumulation, final text or error. Rendering markup is delegated
//! to the injected [`TextFormatter`]; the sink only stores the renderable
//! form alongside the raw text.
//!
//! Slots are keyed by display name. Two resolved models that happen to share
//! a display name collide here: the later update overwrites the earlier one.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Converts result Markdown into host display markup. Pure from the core's
/// point of view; invoked once per sink update before storing.
pub trait TextFormatter: Send + Sync {
    fn render(&self, markdown: &str) -> String;
}

/// Identity formatter for terminals and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainFormatter;

impl TextFormatter for PlainFormatter {
    fn render(&self, markdown: &str) -> String {
        markdown.to_string()
    }
}

/// Shown in a slot between registration and the first fragment.
pub const WAITING_PLACEHOLDER: &str = "_Waiting for response..._";

/// Lifecycle of one display slot within a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetPhase {
    Waiting,
    Streaming,
    Complete,
    Failed,
}

/// State of one display slot.
#[derive(Debug, Clone)]
pub struct TargetState {
    pub name: String,
    pub visible: bool,
    pub text: String,
    pub rendered: String,
    pub phase: TargetPhase,
}

/// The per-target presentation surface.
///
/// Updates for the same target arrive in stream order; updates across
/// targets interleave without constraint.
pub trait ResultSink: Send + Sync {
    /// Announce a target for this turn, putting its slot into the waiting
    /// state. Idempotent for the name list: re-registering a known name does
    /// not add it twice, but does reset its displayed state.
    fn register_target(&self, name: &str);

    /// Set the user's message for the turn (one per turn, global).
    fn set_user_message(&self, text: &str);

    /// Replace a target's accumulated text with a longer accumulation.
    fn update_target(&self, name: &str, text: &str);

    /// Settle a target with its final text, or an error string replacing any
    /// partial output.
    fn complete_target(&self, name: &str, text: &str, is_error: bool);

    /// Show or hide one target without touching its text or its siblings.
    fn set_visibility(&self, name: &str, visible: bool);

    /// Reset every slot's text to the waiting placeholder, keeping the set of
    /// registered names and their visibility.
    fn clear(&self);

    /// Drop all names and text, e.g. before a turn with a different target
    /// set.
    fn reset_targets(&self);
}

/// Inbound events from the host UI surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelCommand {
    Clear,
    OpenModelSelection,
    ToggleVisibility { name: String, visible: bool },
}

#[derive(Default)]
struct PanelInner {
    order: Vec<String>,
    targets: HashMap<String, TargetState>,
    user_message: String,
}

/// In-memory [`ResultSink`] holding the chat-comparison panel state.
pub struct PanelSink<F: TextFormatter> {
    inner: Mutex<PanelInner>,
    formatter: F,
}

impl<F: TextFormatter> PanelSink<F> {
    pub fn new(formatter: F) -> Self {
        Self {
            inner: Mutex::new(PanelInner::default()),
            formatter,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PanelInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// All slots in registration order.
    pub fn snapshot(&self) -> Vec<TargetState> {
        let inner = self.lock();
        inner
            .order
            .iter()
            .filter_map(|name| inner.targets.get(name).cloned())
            .collect()
    }

    /// One slot by name.
    pub fn target(&self, name: &str) -> Option<TargetState> {
        self.lock().targets.get(name).cloned()
    }

    pub fn user_message(&self) -> String {
        self.lock().user_message.clone()
    }

    fn waiting_state(&self, name: &str, visible: bool) -> TargetState {
        TargetState {
            name: name.to_string(),
            visible,
            text: WAITING_PLACEHOLDER.to_string(),
            rendered: self.formatter.render(WAITING_PLACEHOLDER),
            phase: TargetPhase::Waiting,
        }
    }
}

impl<F: TextFormatter> ResultSink for PanelSink<F> {
    fn register_target(&self, name: &str) {
        let fresh = self.waiting_state(name, true);
        let mut inner = self.lock();
        match inner.targets.get_mut(name) {
            Some(state) => {
                // Known name: keep visibility, reset the displayed state.
                let visible = state.visible;
                *state = fresh;
                state.visible = visible;
            }
            None => {
                inner.order.push(name.to_string());
                inner.targets.insert(name.to_string(), fresh);
            }
        }
    }

    fn set_user_message(&self, text: &str) {
        self.lock().user_message = text.to_string();
    }

    fn update_target(&self, name: &str, text: &str) {
        let rendered = self.formatter.render(text);
        let mut inner = self.lock();
        if let Some(state) = inner.targets.get_mut(name) {
            state.text = text.to_string();
            state.rendered = rendered;
            state.phase = TargetPhase::Streaming;
        }
    }

    fn complete_target(&self, name: &str, text: &str, is_error: bool) {
        let rendered = self.formatter.render(text);
        let mut inner = self.lock();
        if let Some(state) = inner.targets.get_mut(name) {
            state.text = text.to_string();
            state.rendered = rendered;
            state.phase = if is_error {
                TargetPhase::Failed
            } else {
                TargetPhase::Complete
            };
        }
    }

    fn set_visibility(&self, name: &str, visible: bool) {
        let mut inner = self.lock();
        if let Some(state) = inner.targets.get_mut(name) {
            state.visible = visible;
        }
    }

    fn clear(&self) {
        let placeholder_rendered = self.formatter.render(WAITING_PLACEHOLDER);
        let mut inner = self.lock();
        for state in inner.targets.values_mut() {
            state.text = WAITING_PLACEHOLDER.to_string();
            state.rendered = placeholder_rendered.clone();
            state.phase = TargetPhase::Waiting;
        }
    }

    fn reset_targets(&self) {
        let mut inner = self.lock();
        inner.order.clear();
        inner.targets.clear();
        inner.user_message.clear();
    }
}
