//! Prompt construction for chat turns and rewrite comparisons.
//!
//! Domain logic for rendering the outbound messages. Backend-agnostic.

use crate::context::TurnContext;

// =============================================================================
// Chat message composition
// =============================================================================

/// Fixed role preamble sent ahead of every chat question.
const CHAT_PREAMBLE: &str = "You are one of several assistants answering the same question \
side by side. Answer directly and concisely, in Markdown.";

/// Build the message for a chat turn.
///
/// When the previous turn left a non-empty question or answer, a labeled
/// history block is folded in; otherwise only the preamble and the current
/// question are sent. Every target in the turn receives this exact string.
pub fn compose_chat_message(user_text: &str, context: Option<&TurnContext>) -> String {
    let history = context.filter(|c| !c.is_empty());

    match history {
        Some(ctx) => format!(
            "{CHAT_PREAMBLE}\n\n\
             For context, here is the previous exchange in this conversation.\n\n\
             Previous question:\n{}\n\n\
             Previous response:\n{}\n\n\
             Current question:\n{}",
            ctx.last_question, ctx.last_answer, user_text
        ),
        None => format!("{CHAT_PREAMBLE}\n\nCurrent question:\n{}", user_text),
    }
}

// =============================================================================
// Enhancement composition
// =============================================================================

/// The two competing rewrite styles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnhancementVariant {
    Lite,
    Pro,
}

impl EnhancementVariant {
    /// The name keying this variant's display slot.
    pub fn as_str(&self) -> &'static str {
        match self {
            EnhancementVariant::Lite => "lite",
            EnhancementVariant::Pro => "pro",
        }
    }
}

/// Source-document context captured from the host editor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditorContext {
    pub text: String,
    pub language: String,
    pub file_name: String,
}

impl EditorContext {
    /// Context whose text is blank after trimming selects the context-less
    /// template shapes.
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Embedded source text is capped at this many characters.
pub const EDITOR_CONTEXT_MAX_CHARS: usize = 2000;

/// Appended when the source text was cut at the cap.
pub const TRUNCATION_MARKER: &str = "\n...(truncated)";

const LITE_TEMPLATE: &str = "\
Rewrite the following prompt to be clearer and more specific. Keep the \
author's intent and scope; fix ambiguity and wording only. Return just the \
rewritten prompt.

Prompt:
{original_prompt}";

const PRO_TEMPLATE: &str = "\
Rewrite the following prompt into a high-quality prompt for a language model. \
Restructure it where helpful: state the task, the constraints, the expected \
output format, and any relevant assumptions. Return just the rewritten prompt.

Prompt:
{original_prompt}";

const LITE_CONTEXT_TEMPLATE: &str = "\
Rewrite the following prompt to be clearer and more specific, using the \
source document below for terminology and intent. Keep the author's intent \
and scope; fix ambiguity and wording only. Return just the rewritten prompt.

Prompt:
{original_prompt}

Source ({language}, {file_name}):
{source_text}";

const PRO_CONTEXT_TEMPLATE: &str = "\
Rewrite the following prompt into a high-quality prompt for a language model, \
grounded in the source document below. Restructure it where helpful: state \
the task, the constraints, the expected output format, and any relevant \
assumptions drawn from the source. Return just the rewritten prompt.

Prompt:
{original_prompt}

Source ({language}, {file_name}):
{source_text}";

/// Cap the embedded source text, marking the cut when one happened.
fn truncate_context_text(text: &str) -> String {
    let mut out: String = text.chars().take(EDITOR_CONTEXT_MAX_CHARS).collect();
    if text.chars().count() > EDITOR_CONTEXT_MAX_CHARS {
        out.push_str(TRUNCATION_MARKER);
    }
    out
}

/// Build the rewrite instruction for one variant.
///
/// Selects one of four fixed template shapes from (variant) x (editor context
/// present and non-blank). The original prompt is embedded verbatim.
pub fn compose_enhancement(
    original_prompt: &str,
    variant: EnhancementVariant,
    editor_context: Option<&EditorContext>,
) -> String {
    let context = editor_context.filter(|c| !c.is_blank());

    match (variant, context) {
        (EnhancementVariant::Lite, None) => {
            LITE_TEMPLATE.replace("{original_prompt}", original_prompt)
        }
        (EnhancementVariant::Pro, None) => {
            PRO_TEMPLATE.replace("{original_prompt}", original_prompt)
        }
        (EnhancementVariant::Lite, Some(ctx)) => render_context_template(
            LITE_CONTEXT_TEMPLATE,
            original_prompt,
            ctx,
        ),
        (EnhancementVariant::Pro, Some(ctx)) => render_context_template(
            PRO_CONTEXT_TEMPLATE,
            original_prompt,
            ctx,
        ),
    }
}

fn render_context_template(template: &str, original_prompt: &str, ctx: &EditorContext) -> String {
    template
        .replace("{original_prompt}", original_prompt)
        .replace("{language}", language_or_plain(&ctx.language))
        .replace("{file_name}", file_name_or_untitled(&ctx.file_name))
        .replace("{source_text}", &truncate_context_text(&ctx.text))
}

fn language_or_plain(language: &str) -> &str {
    if language.trim().is_empty() {
        "plaintext"
    } else {
        language
    }
}

fn file_name_or_untitled(file_name: &str) -> &str {
    if file_name.trim().is_empty() {
        "untitled"
    } else {
        file_name
    }
}
