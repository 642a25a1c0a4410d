//! Persisted model selection.
//!
//! A flat, order-preserving JSON array of identifier strings at a
//! host-provided path. Order matters: it seeds the resolved target order.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SelectionStoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct SelectionStore {
    path: PathBuf,
}

impl SelectionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted selection. A missing file is an empty selection;
    /// an unreadable or malformed file is logged and treated the same, so a
    /// damaged settings file never blocks a turn.
    pub fn load(&self) -> Vec<String> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to read selection file");
                return Vec::new();
            }
        };

        match serde_json::from_str::<Vec<String>>(&raw) {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Malformed selection file");
                Vec::new()
            }
        }
    }

    /// Persist the selection, creating parent directories as needed.
    pub fn save(&self, ids: &[String]) -> Result<(), SelectionStoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let raw = serde_json::to_string_pretty(ids)?;
        fs::write(&self.path, raw)?;
        Ok(())
    }
}
