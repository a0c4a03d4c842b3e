//! Whether file changes need a human decision.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::debug;

pub trait ConfirmPolicy: Send + Sync {
    fn confirmation_required(&self) -> bool;
}

/// Fixed answer, e.g. from configuration.
#[derive(Debug, Clone, Copy)]
pub struct StaticPolicy(pub bool);

impl ConfirmPolicy for StaticPolicy {
    fn confirmation_required(&self) -> bool {
        self.0
    }
}

/// Reads `confirmFileChanges` from a JSON settings file on every call.
/// Any failure to read it means "not required".
#[derive(Debug, Clone)]
pub struct SettingsFilePolicy {
    path: PathBuf,
}

impl SettingsFilePolicy {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read(&self) -> Result<bool> {
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read settings {}", self.path.display()))?;
        let value: Value = serde_json::from_str(&raw).context("Settings file is not valid JSON")?;
        Ok(value
            .get("confirmFileChanges")
            .and_then(Value::as_bool)
            .unwrap_or(false))
    }
}

impl ConfirmPolicy for SettingsFilePolicy {
    fn confirmation_required(&self) -> bool {
        self.read().unwrap_or_else(|e| {
            debug!(error = %e, "confirmation policy unavailable, not confirming");
            false
        })
    }
}
