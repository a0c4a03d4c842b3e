//! Error taxonomy for file mutations.
//!
//! Every variant except the fatal I/O ones is recoverable at the tool
//! boundary: the caller gets a structured failure instead of a crash.

use serde::{Deserialize, Serialize};

/// Which matching strategy produced an edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Exact,
    Flexible,
    Regex,
    Create,
}

impl Strategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::Exact => "exact",
            Strategy::Flexible => "flexible",
            Strategy::Regex => "regex",
            Strategy::Create => "create",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MutationError {
    #[error(
        "Failed to edit {path}: could not find old_string.\n\
         Tips:\n\
         - Re-read the file and copy the exact snippet (including whitespace)\n\
         - Include more surrounding context in old_string\n\
         - If the change is large, prefer apply_patch or write_file"
    )]
    NoMatchFound { path: String },

    #[error(
        "Failed to edit {path}: expected {expected} occurrence(s) but found {found} ({strategy} match).\n\
         Tips:\n\
         - Make old_string more specific\n\
         - Or set expected_replacements to {found} if that is intended"
    )]
    ReplacementCountMismatch {
        path: String,
        expected: usize,
        found: usize,
        strategy: Strategy,
    },

    #[error("No changes to apply: old_string and new_string are identical.")]
    NoChange,

    #[error("Target appears to be a binary file: {path}")]
    BinaryFileRejected { path: String },

    #[error("Invalid patch format: {reason}")]
    InvalidPatchFormat { reason: String },

    #[error("Patch is empty")]
    EmptyPatch,

    #[error("Patch application failed: {message}\n{troubleshooting}")]
    PatchApplicationFailed {
        message: String,
        troubleshooting: String,
    },

    #[error("Aborted {tool} for {path}: file changed during confirmation, re-read and retry.")]
    StaleFileAborted { tool: String, path: String },

    #[error(
        "Refusing to create file that already exists: {path}. \
         Provide old_string to edit, or use write_file to overwrite."
    )]
    FileAlreadyExists { path: String },

    #[error("File not found: {path}. To create a new file, set old_string=\"\" or use write_file.")]
    FileNotFound { path: String },

    #[error("Target is a directory, not a file: {path}")]
    NotAFile { path: String },

    #[error("Path escapes the workspace root: {path}")]
    OutsideWorkspace { path: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{tool} for {path} was canceled")]
    ConfirmationCanceled {
        tool: String,
        path: String,
        request_id: Option<String>,
        remark: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Fatal(#[from] anyhow::Error),
}

impl MutationError {
    /// Recoverable errors are reported to the caller as a failed tool
    /// result; the rest abort the process.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, MutationError::Io(_) | MutationError::Fatal(_))
    }

    /// Short machine-readable kind, used in JSON failure payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            MutationError::NoMatchFound { .. } => "no_match_found",
            MutationError::ReplacementCountMismatch { .. } => "replacement_count_mismatch",
            MutationError::NoChange => "no_change",
            MutationError::BinaryFileRejected { .. } => "binary_file_rejected",
            MutationError::InvalidPatchFormat { .. } => "invalid_patch_format",
            MutationError::EmptyPatch => "empty_patch",
            MutationError::PatchApplicationFailed { .. } => "patch_application_failed",
            MutationError::StaleFileAborted { .. } => "stale_file_aborted",
            MutationError::FileAlreadyExists { .. } => "file_already_exists",
            MutationError::FileNotFound { .. } => "file_not_found",
            MutationError::NotAFile { .. } => "not_a_file",
            MutationError::OutsideWorkspace { .. } => "outside_workspace",
            MutationError::InvalidArgument(_) => "invalid_argument",
            MutationError::ConfirmationCanceled { .. } => "confirmation_canceled",
            MutationError::Io(_) => "io",
            MutationError::Fatal(_) => "fatal",
        }
    }
}
