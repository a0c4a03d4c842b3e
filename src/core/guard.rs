//! Optimistic concurrency check run right before a commit.
//!
//! No lock protects a target while a human is deciding, so every target
//! is captured again after confirmation and compared with the snapshot
//! the change was computed from.

use std::path::Path;

use tracing::warn;

use crate::core::error::MutationError;
use crate::core::patch::PlannedChange;
use crate::core::snapshot::FileSnapshot;

#[derive(Debug, Clone, Copy)]
pub struct StalenessGuard<'a> {
    tool: &'a str,
}

impl<'a> StalenessGuard<'a> {
    pub fn new(tool: &'a str) -> Self {
        Self { tool }
    }

    /// Fail with `StaleFileAborted` unless `path` is still in the state
    /// recorded by `before`. An absent `before` requires the path to still
    /// be absent.
    pub fn verify(&self, label: &str, path: &Path, before: &FileSnapshot) -> Result<(), MutationError> {
        // Directories (and links to them) compare by manifest.
        let now = FileSnapshot::capture_tree(path)?;
        if now.same_state(before) {
            return Ok(());
        }
        warn!(
            tool = self.tool,
            path = label,
            expected = before.hash(),
            found = now.hash(),
            "target changed during confirmation"
        );
        Err(MutationError::StaleFileAborted {
            tool: self.tool.to_string(),
            path: label.to_string(),
        })
    }

    /// Check every planned change before any of them is written.
    pub fn verify_all(&self, changes: &[PlannedChange]) -> Result<(), MutationError> {
        changes
            .iter()
            .try_for_each(|c| self.verify(&c.label, &c.path, &c.before))
    }
}
