//! Cross-turn conversational context.

use std::sync::{Mutex, PoisonError};

/// The last question/answer pair, read at compose time for the next turn.
///
/// Empty strings mean absent. Exactly one store per process, created at
/// startup and injected where needed; overwritten after each turn that
/// produced at least one non-error answer, never cleared explicitly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnContext {
    pub last_question: String,
    pub last_answer: String,
}

impl TurnContext {
    pub fn is_empty(&self) -> bool {
        self.last_question.is_empty() && self.last_answer.is_empty()
    }
}

/// An answer carrying this case-insensitive substring is never stored as
/// context: synthesized per-target error strings all contain it.
pub fn is_error_answer(text: &str) -> bool {
    text.to_lowercase().contains("error:")
}

#[derive(Debug, Default)]
pub struct TurnContextStore {
    inner: Mutex<TurnContext>,
}

impl TurnContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> TurnContext {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Record the turn's question/answer pair. Returns false (and leaves the
    /// stored context untouched) when the answer text is an error.
    pub fn set(&self, question: &str, answer: &str) -> bool {
        if is_error_answer(answer) {
            return false;
        }
        let mut ctx = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        ctx.last_question = question.to_string();
        ctx.last_answer = answer.to_string();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_round_trips() {
        let store = TurnContextStore::new();
        assert!(store.get().is_empty());

        assert!(store.set("q", "a"));
        let ctx = store.get();
        assert_eq!(ctx.last_question, "q");
        assert_eq!(ctx.last_answer, "a");
    }

    #[test]
    fn error_answers_are_rejected_case_insensitively() {
        let store = TurnContextStore::new();
        store.set("q1", "good answer");

        assert!(!store.set("q2", "Error: backend exploded"));
        assert!(!store.set("q2", "the call ended with ERROR: timeout"));

        // The previous context survives a rejected write.
        assert_eq!(store.get().last_question, "q1");
    }

    #[test]
    fn successive_writes_overwrite() {
        let store = TurnContextStore::new();
        store.set("q1", "a1");
        store.set("q2", "a2");
        let ctx = store.get();
        assert_eq!(ctx.last_question, "q2");
        assert_eq!(ctx.last_answer, "a2");
    }
}
