//! Audit trail of committed file changes (`file-changes.jsonl`).
//!
//! Recording is best effort: a failed append is logged and swallowed so
//! it never turns a successful mutation into a failed one.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

use crate::core::confirm::log::timestamp;
use crate::core::diff::unified_diff;
use crate::core::snapshot::FileSnapshot;
use crate::infra::io::append_jsonl;

/// How a tool changed its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeMode {
    Create,
    Edit,
    Append,
    Overwrite,
    Delete,
    Patch,
}

impl ChangeMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeMode::Create => "create",
            ChangeMode::Edit => "edit",
            ChangeMode::Append => "append",
            ChangeMode::Overwrite => "overwrite",
            ChangeMode::Delete => "delete",
            ChangeMode::Patch => "patch",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Created,
    Modified,
    Deleted,
}

impl ChangeType {
    /// `None` when nothing observable changed.
    pub fn between(before: &FileSnapshot, after: &FileSnapshot) -> Option<Self> {
        match (before.exists, after.exists) {
            (false, false) => None,
            (false, true) => Some(ChangeType::Created),
            (true, false) => Some(ChangeType::Deleted),
            (true, true) if before.same_state(after) => None,
            (true, true) => Some(ChangeType::Modified),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    pub ts: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub absolute_path: Option<PathBuf>,
    pub workspace_root: PathBuf,
    pub change_type: ChangeType,
    pub tool: String,
    pub mode: ChangeMode,
    pub server: String,
    pub diff: String,
}

/// One committed target.
#[derive(Debug, Clone, Copy)]
pub struct FileChange<'a> {
    pub label: &'a str,
    pub path: &'a Path,
    pub before: &'a FileSnapshot,
    pub after: &'a FileSnapshot,
}

#[derive(Debug, Clone)]
pub struct ChangeRecorder {
    log_path: PathBuf,
    workspace_root: PathBuf,
    server_name: String,
    run_id: Option<String>,
}

impl ChangeRecorder {
    pub fn new(log_path: impl Into<PathBuf>, workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            log_path: log_path.into(),
            workspace_root: workspace_root.into(),
            server_name: "code_writer".to_string(),
            run_id: None,
        }
    }

    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = name.into();
        self
    }

    pub fn with_run_id(mut self, run_id: Option<String>) -> Self {
        self.run_id = run_id.filter(|r| !r.trim().is_empty());
        self
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Build the record for `change`, or `None` if nothing changed.
    pub fn entry(&self, change: &FileChange<'_>, tool: &str, mode: ChangeMode) -> Option<ChangeRecord> {
        let change_type = ChangeType::between(change.before, change.after)?;
        Some(ChangeRecord {
            ts: timestamp(),
            run_id: self.run_id.clone(),
            path: change.label.to_string(),
            absolute_path: Some(change.path.to_path_buf()),
            workspace_root: self.workspace_root.clone(),
            change_type,
            tool: tool.to_string(),
            mode,
            server: self.server_name.clone(),
            diff: unified_diff(change.label, &change.before.content, &change.after.content),
        })
    }

    /// Append a record for `change`. Returns whether a record was due.
    pub fn record(&self, change: &FileChange<'_>, tool: &str, mode: ChangeMode) -> bool {
        let Some(entry) = self.entry(change, tool, mode) else {
            debug!(path = change.label, "no observable change, not recorded");
            return false;
        };
        self.append(&entry);
        true
    }

    /// Fallback for a patch that yielded no per-file record.
    pub fn record_patch(&self, patch_text: &str) {
        self.append(&ChangeRecord {
            ts: timestamp(),
            run_id: self.run_id.clone(),
            path: "patch".to_string(),
            absolute_path: None,
            workspace_root: self.workspace_root.clone(),
            change_type: ChangeType::Modified,
            tool: "apply_patch".to_string(),
            mode: ChangeMode::Patch,
            server: self.server_name.clone(),
            diff: patch_text.to_string(),
        });
    }

    fn append(&self, entry: &ChangeRecord) {
        if let Err(e) = append_jsonl(&self.log_path, entry) {
            warn!(path = %entry.path, error = %e, "failed to record file change");
        }
    }
}
