//! Target materialization: turning descriptors into live backends.

use crate::catalog::ModelDescriptor;
use crate::gateway::{ChatGateway, ProviderError};

/// Chat comparison never dispatches to more than this many targets.
pub const MAX_CHAT_TARGETS: usize = 6;

/// A descriptor paired with the verified backend identifier to invoke.
///
/// Built fresh per turn; never persisted. Set order is the order models were
/// requested in, independent of backend response latency.
#[derive(Debug, Clone)]
pub struct ResolvedTarget {
    pub descriptor: ModelDescriptor,
    pub model_id: String,
}

impl ResolvedTarget {
    /// The name keying this target's display slot.
    pub fn display_name(&self) -> &str {
        &self.descriptor.display_name
    }
}

/// Obtain live handles for the given descriptors, preserving order.
///
/// A descriptor whose lookup fails or comes back empty is dropped silently
/// (logged, not surfaced). If nothing materializes, falls back to any
/// available backends in host-returned order. An empty result after the
/// fallback is the caller's terminal no-target condition.
pub async fn materialize(
    gateway: &dyn ChatGateway,
    descriptors: &[ModelDescriptor],
) -> Vec<ResolvedTarget> {
    let mut targets = Vec::with_capacity(descriptors.len());

    for descriptor in descriptors {
        match probe(gateway, descriptor).await {
            Ok(Some(model_id)) => targets.push(ResolvedTarget {
                descriptor: descriptor.clone(),
                model_id,
            }),
            Ok(None) => {
                tracing::warn!(model = %descriptor.id, "No backend for model, dropping target");
            }
            Err(e) => {
                tracing::warn!(model = %descriptor.id, error = %e, "Model lookup failed, dropping target");
            }
        }
    }

    if !targets.is_empty() {
        return targets;
    }

    match gateway.list_models(None).await {
        Ok(ids) => ids
            .into_iter()
            .map(|id| ResolvedTarget {
                descriptor: ModelDescriptor::synthesized(&id),
                model_id: id,
            })
            .collect(),
        Err(e) => {
            tracing::warn!(error = %e, "Fallback model listing failed");
            Vec::new()
        }
    }
}

/// Look one descriptor up: exact identifier first, then each match pattern.
async fn probe(
    gateway: &dyn ChatGateway,
    descriptor: &ModelDescriptor,
) -> Result<Option<String>, ProviderError> {
    let ids = gateway.list_models(Some(descriptor.id.as_str())).await?;
    if let Some(id) = ids.into_iter().next() {
        return Ok(Some(id));
    }

    for pattern in &descriptor.match_patterns {
        let ids = gateway.list_models(Some(pattern.as_str())).await?;
        if let Some(id) = ids.into_iter().next() {
            return Ok(Some(id));
        }
    }

    Ok(None)
}
