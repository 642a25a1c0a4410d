//! Model catalog and selection resolution.
//!
//! The catalog is the static set of backends we know how to name; a persisted
//! user selection is resolved against it per turn. Identifiers the catalog
//! has never heard of are synthesized on the fly so a user-typed model id
//! still gets a display slot.

use once_cell::sync::Lazy;

/// A known or synthesized backend model.
///
/// Immutable once constructed. `match_patterns` are lowercased substrings
/// used to fuzzy-identify a backend when only an identifier is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDescriptor {
    pub id: String,
    pub display_name: String,
    pub match_patterns: Vec<String>,
}

impl ModelDescriptor {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        match_patterns: &[&str],
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            match_patterns: match_patterns.iter().map(|p| p.to_lowercase()).collect(),
        }
    }

    /// Build a descriptor for an identifier not present in the catalog.
    ///
    /// Display name falls back to the tail segment of the identifier, after
    /// the last `/`; the sole match pattern is the lowercased identifier.
    pub fn synthesized(id: &str) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name_from_id(id).to_string(),
            match_patterns: vec![id.to_lowercase()],
        }
    }
}

/// Tail segment of a model identifier: everything after the last `/`,
/// or the whole identifier when it has none.
pub fn display_name_from_id(id: &str) -> &str {
    id.rsplit('/').next().unwrap_or(id)
}

static DEFAULT_CATALOG: Lazy<Vec<ModelDescriptor>> = Lazy::new(|| {
    vec![
        ModelDescriptor::new("openai/gpt-4o", "GPT-4o", &["gpt-4o"]),
        ModelDescriptor::new("openai/gpt-4o-mini", "GPT-4o mini", &["gpt-4o-mini", "4o-mini"]),
        ModelDescriptor::new(
            "anthropic/claude-3.5-sonnet",
            "Claude 3.5 Sonnet",
            &["claude", "sonnet"],
        ),
        ModelDescriptor::new("google/gemini-1.5-pro", "Gemini 1.5 Pro", &["gemini"]),
        ModelDescriptor::new(
            "meta-llama/llama-3.1-70b-instruct",
            "Llama 3.1 70B",
            &["llama"],
        ),
    ]
});

/// The static default catalog, in default query order.
pub fn default_catalog() -> &'static [ModelDescriptor] {
    &DEFAULT_CATALOG
}

/// Resolve a persisted selection against a catalog.
///
/// An empty selection returns the catalog unchanged. Otherwise the result has
/// exactly the selection's length and order (no dedup): catalog entries where
/// identifiers match, synthesized descriptors everywhere else.
pub fn resolve_selection(
    persisted: &[String],
    catalog: &[ModelDescriptor],
) -> Vec<ModelDescriptor> {
    if persisted.is_empty() {
        return catalog.to_vec();
    }

    persisted
        .iter()
        .map(|id| {
            catalog
                .iter()
                .find(|d| &d.id == id)
                .cloned()
                .unwrap_or_else(|| ModelDescriptor::synthesized(id))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_selection_returns_default_catalog_in_order() {
        let resolved = resolve_selection(&[], default_catalog());
        assert_eq!(resolved.len(), default_catalog().len());
        for (got, want) in resolved.iter().zip(default_catalog()) {
            assert_eq!(got, want);
        }
    }

    #[test]
    fn selection_preserves_length_and_order_with_unknown_ids() {
        let persisted = vec![
            "mystery/model-x".to_string(),
            "openai/gpt-4o".to_string(),
            "mystery/model-x".to_string(),
        ];
        let resolved = resolve_selection(&persisted, default_catalog());

        assert_eq!(resolved.len(), 3);
        assert_eq!(resolved[0].id, "mystery/model-x");
        assert_eq!(resolved[0].display_name, "model-x");
        assert_eq!(resolved[1].display_name, "GPT-4o");
        // No dedup: the duplicate stays.
        assert_eq!(resolved[2].id, "mystery/model-x");
    }

    #[test]
    fn synthesized_descriptor_uses_tail_segment_and_lowercased_pattern() {
        let d = ModelDescriptor::synthesized("Vendor/Family/Custom-7B");
        assert_eq!(d.display_name, "Custom-7B");
        assert_eq!(d.match_patterns, vec!["vendor/family/custom-7b".to_string()]);

        let d = ModelDescriptor::synthesized("plain-model");
        assert_eq!(d.display_name, "plain-model");
    }
}
