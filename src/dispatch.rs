//! Concurrent fan-out of one message to N independent targets.
//!
//! Each target runs as its own future: register with the sink, open the
//! stream, forward the running accumulation on every fragment, settle with
//! final text or a synthesized error string. The dispatch is a join-all over
//! those futures, with every failure converted to a value before joining, so
//! one target's error or latency never touches a sibling, and the dispatch
//! itself cannot fail.

use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use futures::future::join_all;
use futures::StreamExt;

use crate::gateway::{Attribution, ChatGateway, ChatRequest, Message, ProviderError};
use crate::prompts::{compose_enhancement, EditorContext, EnhancementVariant};
use crate::resolver::ResolvedTarget;
use crate::sink::ResultSink;

/// How one target's task settled.
#[derive(Debug, Clone)]
pub struct TargetOutcome {
    /// Display name keying the sink slot.
    pub name: String,
    /// Final text, or the synthesized error string when `is_error` is set.
    pub text: String,
    pub is_error: bool,
}

/// Both rewrite results, assembled once the two variants settle.
#[derive(Debug, Clone)]
pub struct EnhancementOutcome {
    pub original: String,
    pub lite_result: String,
    pub pro_result: String,
    pub context: Option<EditorContext>,
}

/// Human-readable per-target error text, rendered into the failing slot in
/// place of any partial output.
///
/// Every string here carries the `"Error:"` substring, which also excludes
/// the answer from the next turn's context.
pub fn error_display_text(err: &ProviderError) -> String {
    match err {
        ProviderError::ModelUnavailable { model } => {
            format!("Error: No backend is available for model {model}.")
        }
        ProviderError::Incompatible { message, .. } => {
            format!("Error: The model does not support this request. {message}")
        }
        ProviderError::InvalidRequest { message, .. } => {
            format!("Error: The model backend rejected the request. {message}")
        }
        ProviderError::Stream { message } => {
            format!("Error: The response stream failed. {message}")
        }
        ProviderError::Cancelled => "Error: The request was cancelled.".to_string(),
        other => format!("Error: {other}"),
    }
}

fn is_cancelled(flag: Option<&AtomicBool>) -> bool {
    flag.map(|f| f.load(AtomicOrdering::Relaxed)).unwrap_or(false)
}

/// Fan the composed chat message out to every resolved target concurrently.
///
/// Completes only when every target settled (join-all, not a race). Outcomes
/// come back in target order regardless of completion order.
pub async fn dispatch_chat(
    gateway: &dyn ChatGateway,
    targets: &[ResolvedTarget],
    message: &str,
    sink: &dyn ResultSink,
    attribution: Attribution,
    cancel_flag: Option<&AtomicBool>,
) -> Vec<TargetOutcome> {
    join_all(targets.iter().map(|target| {
        stream_target(
            gateway,
            &target.model_id,
            target.display_name(),
            message,
            sink,
            attribution,
            cancel_flag,
        )
    }))
    .await
}

/// Run both rewrite variants against one model concurrently.
///
/// Identical shape to chat dispatch with exactly two fixed targets, but the
/// final strings are also returned as a pair for the comparison document.
pub async fn dispatch_enhancement(
    gateway: &dyn ChatGateway,
    target: &ResolvedTarget,
    original_prompt: &str,
    editor_context: Option<&EditorContext>,
    sink: &dyn ResultSink,
    attribution: Attribution,
    cancel_flag: Option<&AtomicBool>,
) -> EnhancementOutcome {
    let lite_message =
        compose_enhancement(original_prompt, EnhancementVariant::Lite, editor_context);
    let pro_message = compose_enhancement(original_prompt, EnhancementVariant::Pro, editor_context);

    let (lite, pro) = futures::join!(
        stream_target(
            gateway,
            &target.model_id,
            EnhancementVariant::Lite.as_str(),
            &lite_message,
            sink,
            attribution,
            cancel_flag,
        ),
        stream_target(
            gateway,
            &target.model_id,
            EnhancementVariant::Pro.as_str(),
            &pro_message,
            sink,
            attribution,
            cancel_flag,
        ),
    );

    EnhancementOutcome {
        original: original_prompt.to_string(),
        lite_result: lite.text,
        pro_result: pro.text,
        context: editor_context.cloned(),
    }
}

/// Drive one target from registration to settlement. Never returns an error:
/// failures become the outcome's error text.
async fn stream_target(
    gateway: &dyn ChatGateway,
    model_id: &str,
    name: &str,
    message: &str,
    sink: &dyn ResultSink,
    attribution: Attribution,
    cancel_flag: Option<&AtomicBool>,
) -> TargetOutcome {
    sink.register_target(name);

    if is_cancelled(cancel_flag) {
        return settle_error(sink, name, model_id, &ProviderError::Cancelled);
    }

    let request = ChatRequest::new(model_id, vec![Message::user(message)], attribution);

    let mut stream = match gateway.stream_chat(request).await {
        Ok(stream) => stream,
        Err(e) => return settle_error(sink, name, model_id, &e),
    };

    let mut accumulated = String::new();

    while let Some(item) = stream.next().await {
        match item {
            Ok(fragment) => {
                if is_cancelled(cancel_flag) {
                    return settle_error(sink, name, model_id, &ProviderError::Cancelled);
                }
                accumulated.push_str(&fragment);
                sink.update_target(name, &accumulated);
            }
            // Partial output is discarded in favor of the error text.
            Err(e) => return settle_error(sink, name, model_id, &e),
        }
    }

    tracing::debug!(model = %model_id, target = %name, chars = accumulated.len(), "Target stream complete");
    sink.complete_target(name, &accumulated, false);
    TargetOutcome {
        name: name.to_string(),
        text: accumulated,
        is_error: false,
    }
}

fn settle_error(
    sink: &dyn ResultSink,
    name: &str,
    model_id: &str,
    err: &ProviderError,
) -> TargetOutcome {
    tracing::warn!(model = %model_id, target = %name, code = err.code(), error = %err, "Target failed");
    let text = error_display_text(err);
    sink.complete_target(name, &text, true);
    TargetOutcome {
        name: name.to_string(),
        text,
        is_error: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_texts_all_carry_the_error_prefix() {
        let errs = [
            ProviderError::model_unavailable("x/y"),
            ProviderError::incompatible("no tools"),
            ProviderError::invalid_request("bad payload"),
            ProviderError::stream("connection reset"),
            ProviderError::Cancelled,
            ProviderError::provider("openai-compatible", "boom", false),
            ProviderError::config("missing key"),
        ];
        for err in &errs {
            let text = error_display_text(err);
            assert!(
                crate::context::is_error_answer(&text),
                "not flagged as error: {text}"
            );
        }
    }

    #[test]
    fn error_display_distinguishes_compat_from_format_errors() {
        let compat = error_display_text(&ProviderError::incompatible("m"));
        let format = error_display_text(&ProviderError::invalid_request("m"));
        assert_ne!(compat, format);
    }
}
