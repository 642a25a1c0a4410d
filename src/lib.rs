#![forbid(unsafe_code)]

//! # chorus-harness
//!
//! Ask several language models the same question, side by side.
//!
//! One user query fans out to N independent chat backends; each backend's
//! streamed fragments land in its own display slot as they arrive, so a slow
//! or failing model never blocks its neighbors. A second mode runs a prompt
//! through two competing rewrite templates ("lite" and "pro") in parallel
//! and assembles the results into a comparison document.
//!
//! The interesting part is the dispatch layer: a join-all over per-target
//! futures where every failure is converted into a value before joining, a
//! shared per-turn cancel flag, and strictly monotonic per-target fragment
//! accumulation with no cross-target ordering guarantee.

pub mod catalog;
pub mod context;
pub mod dispatch;
pub mod gateway;
pub mod prompts;
pub mod resolver;
pub mod selection;
pub mod session;
pub mod sink;

pub use catalog::{default_catalog, resolve_selection, ModelDescriptor};
pub use context::{TurnContext, TurnContextStore};
pub use dispatch::{
    dispatch_chat, dispatch_enhancement, error_display_text, EnhancementOutcome, TargetOutcome,
};
pub use gateway::{Attribution, ChatGateway, ProviderError, ProviderGateway};
pub use prompts::{
    compose_chat_message, compose_enhancement, EditorContext, EnhancementVariant,
};
pub use resolver::{materialize, ResolvedTarget, MAX_CHAT_TARGETS};
pub use selection::{SelectionStore, SelectionStoreError};
pub use session::{
    render_comparison_document, ChatPanelSession, CommandOutcome, TurnError, TurnSummary,
    DEFAULT_ENHANCE_MODEL,
};
pub use sink::{PanelCommand, PanelSink, PlainFormatter, ResultSink, TextFormatter};
