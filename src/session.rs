//! Turn driver: one user query in, per-target streamed results out.
//!
//! A session owns explicit instances of everything a turn needs (gateway,
//! sink, selection store, turn context, catalog), created once at process
//! start and injected here rather than reached through globals.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::catalog::{default_catalog, resolve_selection, ModelDescriptor};
use crate::context::TurnContextStore;
use crate::dispatch::{dispatch_chat, dispatch_enhancement, EnhancementOutcome, TargetOutcome};
use crate::gateway::{Attribution, ChatGateway};
use crate::prompts::{compose_chat_message, EditorContext};
use crate::resolver::{materialize, MAX_CHAT_TARGETS};
use crate::selection::{SelectionStore, SelectionStoreError};
use crate::sink::{PanelCommand, ResultSink};

/// Default backend for the two rewrite variants.
pub const DEFAULT_ENHANCE_MODEL: &str = "openai/gpt-4o-mini";

/// Turn-level failures. Per-target failures never show up here; only the
/// total absence of targets is escalated, and it is fatal for that turn only.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error(
        "No language models are available. Check the backend connection and the model selection."
    )]
    NoTargetsAvailable,
    #[error("selection store error: {0}")]
    Selection(#[from] SelectionStoreError),
}

/// What a completed chat turn hands back to the turn trigger.
#[derive(Debug, Clone)]
pub struct TurnSummary {
    /// Short status string for the host's sync return path.
    pub status: String,
    /// Per-target settlements, in resolution order.
    pub outcomes: Vec<TargetOutcome>,
}

/// Reaction to an inbound host event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The event was absorbed by the core.
    Handled,
    /// The host should open its model selection surface.
    OpenModelSelection,
}

pub struct ChatPanelSession {
    gateway: Arc<dyn ChatGateway>,
    sink: Arc<dyn ResultSink>,
    selection: SelectionStore,
    context: TurnContextStore,
    catalog: Vec<ModelDescriptor>,
    enhance_model: String,
}

impl ChatPanelSession {
    pub fn new(
        gateway: Arc<dyn ChatGateway>,
        sink: Arc<dyn ResultSink>,
        selection: SelectionStore,
    ) -> Self {
        Self {
            gateway,
            sink,
            selection,
            context: TurnContextStore::new(),
            catalog: default_catalog().to_vec(),
            enhance_model: DEFAULT_ENHANCE_MODEL.to_string(),
        }
    }

    pub fn with_catalog(mut self, catalog: Vec<ModelDescriptor>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_enhance_model(mut self, model: impl Into<String>) -> Self {
        self.enhance_model = model.into();
        self
    }

    /// Run one chat comparison turn.
    ///
    /// Resolves the persisted selection, fans the composed message out to at
    /// most [`MAX_CHAT_TARGETS`] targets, and waits for all of them to
    /// settle. The first target in resolution order that settled successfully
    /// seeds the next turn's context; completion order does not matter.
    pub async fn run_chat_turn(
        &self,
        user_text: &str,
        cancel_flag: Option<&AtomicBool>,
    ) -> Result<TurnSummary, TurnError> {
        let attribution = Attribution::new("session::chat").with_turn(Uuid::new_v4());

        let persisted = self.selection.load();
        let descriptors = resolve_selection(&persisted, &self.catalog);

        let mut targets = materialize(self.gateway.as_ref(), &descriptors).await;
        targets.truncate(MAX_CHAT_TARGETS);
        if targets.is_empty() {
            tracing::warn!("Turn aborted: no targets after fallback");
            return Err(TurnError::NoTargetsAvailable);
        }

        self.sink.reset_targets();
        self.sink.set_user_message(user_text);

        let message = compose_chat_message(user_text, Some(&self.context.get()));

        let outcomes = dispatch_chat(
            self.gateway.as_ref(),
            &targets,
            &message,
            self.sink.as_ref(),
            attribution,
            cancel_flag,
        )
        .await;

        if let Some(winner) = outcomes.iter().find(|o| !o.is_error) {
            self.context.set(user_text, &winner.text);
        }

        Ok(TurnSummary {
            status: format!("Queried {} model(s)", outcomes.len()),
            outcomes,
        })
    }

    /// Run one prompt-enhancement turn: both rewrite variants against the
    /// default enhancement model, concurrently.
    pub async fn run_enhancement(
        &self,
        original_prompt: &str,
        editor_context: Option<&EditorContext>,
        cancel_flag: Option<&AtomicBool>,
    ) -> Result<EnhancementOutcome, TurnError> {
        let attribution = Attribution::new("session::enhance").with_turn(Uuid::new_v4());

        let descriptor = self
            .catalog
            .iter()
            .find(|d| d.id == self.enhance_model)
            .cloned()
            .unwrap_or_else(|| ModelDescriptor::synthesized(&self.enhance_model));

        let targets = materialize(self.gateway.as_ref(), &[descriptor]).await;
        let Some(target) = targets.into_iter().next() else {
            tracing::warn!(model = %self.enhance_model, "Enhancement aborted: no target");
            return Err(TurnError::NoTargetsAvailable);
        };

        self.sink.reset_targets();
        self.sink.set_user_message(original_prompt);

        Ok(dispatch_enhancement(
            self.gateway.as_ref(),
            &target,
            original_prompt,
            editor_context,
            self.sink.as_ref(),
            attribution,
            cancel_flag,
        )
        .await)
    }

    /// React to one of the three inbound host events.
    pub fn handle_command(&self, command: PanelCommand) -> CommandOutcome {
        match command {
            PanelCommand::Clear => {
                self.sink.clear();
                CommandOutcome::Handled
            }
            PanelCommand::ToggleVisibility { name, visible } => {
                self.sink.set_visibility(&name, visible);
                CommandOutcome::Handled
            }
            PanelCommand::OpenModelSelection => CommandOutcome::OpenModelSelection,
        }
    }

    /// Persist a new model selection picked by the host.
    pub fn save_selection(&self, ids: &[String]) -> Result<(), TurnError> {
        self.selection.save(ids)?;
        Ok(())
    }

    /// The current persisted selection.
    pub fn current_selection(&self) -> Vec<String> {
        self.selection.load()
    }
}

/// Render both rewrites into the comparison document shown to the user.
pub fn render_comparison_document(outcome: &EnhancementOutcome) -> String {
    let mut doc = String::new();
    doc.push_str("# Prompt Enhancement Comparison\n\n");

    if let Some(ctx) = &outcome.context {
        doc.push_str(&format!(
            "Source: `{}` ({})\n\n",
            if ctx.file_name.is_empty() {
                "untitled"
            } else {
                &ctx.file_name
            },
            if ctx.language.is_empty() {
                "plaintext"
            } else {
                &ctx.language
            },
        ));
    }

    doc.push_str("## Original Prompt\n\n");
    doc.push_str(&outcome.original);
    doc.push_str("\n\n## Lite Rewrite\n\n");
    doc.push_str(&outcome.lite_result);
    doc.push_str("\n\n## Pro Rewrite\n\n");
    doc.push_str(&outcome.pro_result);
    doc.push('\n');
    doc
}
