//! Mutating file tools: `write_file`, `edit_file`, `delete_path` and
//! `apply_patch`.
//!
//! Each call runs the same pipeline: snapshot the target, compute the new
//! content in memory, ask the confirmation gateway, re-check the target,
//! commit, then record the change. Recoverable failures come back as
//! `MutationError`; a human cancellation is a normal response with
//! `status: "canceled"`.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, instrument};

use crate::core::changes::{ChangeMode, ChangeRecorder, FileChange};
use crate::core::confirm::{ConfirmRequest, ConfirmationGateway, ConfirmationOutcome};
use crate::core::diff::unified_diff;
use crate::core::error::{MutationError, Strategy};
use crate::core::guard::StalenessGuard;
use crate::core::matcher::{self, EditRequest};
use crate::core::patch::plan_patch;
use crate::core::payload::{Chunk, Encoding, Payload};
use crate::core::snapshot::FileSnapshot;
use crate::infra::io::write_atomic;
use crate::infra::workspace::Workspace;

pub const TOOL_NAMES: [&str; 4] = ["write_file", "edit_file", "delete_path", "apply_patch"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Ok,
    Canceled,
}

/// Structured result of a tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolOutcome {
    pub status: ToolStatus,
    pub confirmed: bool,
    pub remark: String,
    pub path: String,
    pub tool: String,
    pub mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occurrences: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<Strategy>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl ToolOutcome {
    fn ok(tool: &str, mode: &str, path: &str, confirmation: &ConfirmationOutcome) -> Self {
        Self {
            status: ToolStatus::Ok,
            confirmed: confirmation.confirmed(),
            remark: confirmation.remark.clone(),
            path: path.to_string(),
            tool: tool.to_string(),
            mode: mode.to_string(),
            occurrences: None,
            strategy: None,
            files: Vec::new(),
            request_id: confirmation.request_id.clone(),
        }
    }
}

/// Human-readable summary plus the structured outcome.
#[derive(Debug, Clone, Serialize)]
pub struct ToolResponse {
    pub text: String,
    pub outcome: ToolOutcome,
}

impl ToolResponse {
    pub fn is_canceled(&self) -> bool {
        self.outcome.status == ToolStatus::Canceled
    }

    pub fn to_json(&self) -> Value {
        json!({ "text": self.text, "result": self.outcome })
    }
}

/// JSON rendering of a recoverable failure.
pub fn failure_json(tool: &str, err: &MutationError) -> Value {
    json!({
        "status": "error",
        "tool": tool,
        "error": err.kind(),
        "message": err.to_string(),
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    #[default]
    Overwrite,
    Append,
}

impl WriteMode {
    pub fn as_str(self) -> &'static str {
        match self {
            WriteMode::Overwrite => "overwrite",
            WriteMode::Append => "append",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WriteArgs {
    pub path: String,
    #[serde(default)]
    pub mode: WriteMode,
    pub contents: Option<String>,
    pub contents_base64: Option<String>,
    #[serde(default)]
    pub encoding: Encoding,
    #[serde(default)]
    pub chunks: Vec<Chunk>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EditArgs {
    pub path: String,
    #[serde(default)]
    pub old_string: String,
    pub new_string: String,
    pub expected_replacements: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeleteArgs {
    pub path: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PatchArgs {
    /// Working-directory hint; defaults to the workspace root.
    #[serde(default, alias = "cwd")]
    pub path: String,
    pub patch: Option<String>,
    pub patch_base64: Option<String>,
    #[serde(default)]
    pub encoding: Encoding,
    #[serde(default)]
    pub chunks: Vec<Chunk>,
}

fn remark_suffix(remark: &str) -> String {
    if remark.is_empty() {
        String::new()
    } else {
        format!("\nUser remark: {remark}")
    }
}

/// Turn a cancellation into a response; pass every other error through.
fn canceled(err: MutationError, mode: &str) -> Result<ToolResponse, MutationError> {
    match err {
        MutationError::ConfirmationCanceled {
            tool,
            path,
            request_id,
            remark,
        } => {
            info!(%tool, %path, "canceled by user");
            Ok(ToolResponse {
                text: format!("Canceled {tool} {path}.{}", remark_suffix(&remark)),
                outcome: ToolOutcome {
                    status: ToolStatus::Canceled,
                    confirmed: false,
                    remark,
                    path,
                    tool,
                    mode: mode.to_string(),
                    occurrences: None,
                    strategy: None,
                    files: Vec::new(),
                    request_id,
                },
            })
        }
        other => Err(other),
    }
}

fn parse_args<T: DeserializeOwned>(tool: &str, arguments: Value) -> Result<T, MutationError> {
    serde_json::from_value(arguments)
        .map_err(|e| MutationError::InvalidArgument(format!("{tool}: {e}")))
}

pub struct FileTools {
    ws: Workspace,
    gateway: ConfirmationGateway,
    recorder: ChangeRecorder,
}

impl FileTools {
    pub fn new(ws: Workspace, gateway: ConfirmationGateway, recorder: ChangeRecorder) -> Self {
        Self {
            ws,
            gateway,
            recorder,
        }
    }

    pub fn workspace(&self) -> &Workspace {
        &self.ws
    }

    pub fn gateway(&self) -> &ConfirmationGateway {
        &self.gateway
    }

    /// Dispatch a tool call by name with JSON arguments.
    pub async fn call(&self, tool: &str, arguments: Value) -> Result<ToolResponse, MutationError> {
        match tool {
            "write_file" => self.write_file(parse_args(tool, arguments)?).await,
            "edit_file" => self.edit_file(parse_args(tool, arguments)?).await,
            "delete_path" => self.delete_path(parse_args(tool, arguments)?).await,
            "apply_patch" => self.apply_patch(parse_args(tool, arguments)?).await,
            other => Err(MutationError::InvalidArgument(format!(
                "unknown tool {other:?}; expected one of {}",
                TOOL_NAMES.join(", ")
            ))),
        }
    }

    async fn gate(
        &self,
        tool: &str,
        mode: &str,
        label: &str,
        diff: String,
        message: Option<String>,
    ) -> Result<ConfirmationOutcome, MutationError> {
        let req = ConfirmRequest {
            title: "File change confirmation".to_string(),
            message: message.unwrap_or_else(|| format!("About to run {tool} ({mode}): {label}")),
            path: label.to_string(),
            source: format!("{}/{tool}", self.gateway.server_name()),
            diff,
            ..Default::default()
        };
        let outcome = self.gateway.confirm(&req).await?;
        if !outcome.is_ok() {
            return Err(MutationError::ConfirmationCanceled {
                tool: tool.to_string(),
                path: label.to_string(),
                request_id: outcome.request_id,
                remark: outcome.remark,
            });
        }
        Ok(outcome)
    }

    #[instrument(skip_all, fields(path = %args.path, mode = args.mode.as_str()))]
    pub async fn write_file(&self, args: WriteArgs) -> Result<ToolResponse, MutationError> {
        const TOOL: &str = "write_file";
        let mode = args.mode.as_str();
        let target = self.ws.resolve(&args.path)?;
        let label = self.ws.label(&target);
        if target.is_dir() {
            return Err(MutationError::NotAFile { path: label });
        }

        let payload = Payload {
            text: args.contents.as_deref(),
            base64: args.contents_base64.as_deref(),
            encoding: args.encoding,
            chunks: &args.chunks,
        }
        .resolve()?;
        if payload.is_empty() {
            return Err(MutationError::InvalidArgument(
                "No content to write; aborted.".into(),
            ));
        }

        let before = FileSnapshot::capture(&target)?;
        let after = match args.mode {
            WriteMode::Append if before.binary => {
                return Err(MutationError::BinaryFileRejected { path: label });
            }
            WriteMode::Append => format!("{}{payload}", before.content),
            WriteMode::Overwrite => payload.clone(),
        };

        let diff = unified_diff(&label, &before.content, &after);
        let confirmation = match self.gate(TOOL, mode, &label, diff, None).await {
            Ok(c) => c,
            Err(e) => return canceled(e, mode),
        };
        StalenessGuard::new(TOOL).verify(&label, &target, &before)?;

        let chars = payload.chars().count();
        info!("Writing ({mode}) {label} ({chars} chars)");
        write_atomic(&target, after.as_bytes())?;

        let after = FileSnapshot::from_content(after);
        let change_mode = match args.mode {
            WriteMode::Append => ChangeMode::Append,
            WriteMode::Overwrite => ChangeMode::Overwrite,
        };
        self.recorder.record(
            &FileChange {
                label: &label,
                path: &target,
                before: &before,
                after: &after,
            },
            TOOL,
            change_mode,
        );

        let summary = match (args.mode, before.exists) {
            (WriteMode::Append, _) => "Appended",
            (WriteMode::Overwrite, true) => "Overwrote",
            (WriteMode::Overwrite, false) => "Created",
        };
        Ok(ToolResponse {
            text: format!(
                "{summary} {label} ({chars} chars).{}",
                remark_suffix(&confirmation.remark)
            ),
            outcome: ToolOutcome::ok(TOOL, mode, &label, &confirmation),
        })
    }

    #[instrument(skip_all, fields(path = %args.path))]
    pub async fn edit_file(&self, args: EditArgs) -> Result<ToolResponse, MutationError> {
        const TOOL: &str = "edit_file";
        let target = self.ws.resolve(&args.path)?;
        let label = self.ws.label(&target);
        if target.is_dir() {
            return Err(MutationError::NotAFile { path: label });
        }

        let before = FileSnapshot::capture(&target)?;
        let result = matcher::resolve(
            &before,
            &EditRequest {
                path: &label,
                old_string: &args.old_string,
                new_string: &args.new_string,
                expected_replacements: args.expected_replacements.unwrap_or(1),
            },
        )?;
        let mode = if result.strategy == Strategy::Create {
            ChangeMode::Create
        } else {
            ChangeMode::Edit
        };

        let diff = unified_diff(&label, &before.content, &result.new_content);
        let confirmation = match self.gate(TOOL, mode.as_str(), &label, diff, None).await {
            Ok(c) => c,
            Err(e) => return canceled(e, mode.as_str()),
        };
        StalenessGuard::new(TOOL).verify(&label, &target, &before)?;

        info!(
            strategy = %result.strategy,
            occurrences = result.occurrences,
            "Editing {label}"
        );
        write_atomic(&target, result.new_content.as_bytes())?;

        let after = FileSnapshot::from_content(result.new_content.clone());
        self.recorder.record(
            &FileChange {
                label: &label,
                path: &target,
                before: &before,
                after: &after,
            },
            TOOL,
            mode,
        );

        let text = match result.strategy {
            Strategy::Create => format!(
                "Created {label} ({} chars).",
                result.new_content.chars().count()
            ),
            strategy => format!(
                "Edited {label}: {} replacement(s) via {strategy} match.",
                result.occurrences
            ),
        };
        Ok(ToolResponse {
            text: format!("{text}{}", remark_suffix(&confirmation.remark)),
            outcome: ToolOutcome {
                occurrences: Some(result.occurrences),
                strategy: Some(result.strategy),
                ..ToolOutcome::ok(TOOL, mode.as_str(), &label, &confirmation)
            },
        })
    }

    /// Delete a file, or a directory recursively.
    #[instrument(skip_all, fields(path = %args.path))]
    pub async fn delete_path(&self, args: DeleteArgs) -> Result<ToolResponse, MutationError> {
        const TOOL: &str = "delete_path";
        let mode = ChangeMode::Delete.as_str();
        let target = self.ws.resolve(&args.path)?;
        let label = self.ws.label(&target);
        if target == self.ws.root() {
            return Err(MutationError::InvalidArgument(
                "Refusing to delete the workspace root".into(),
            ));
        }

        let meta = match fs::symlink_metadata(&target) {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(MutationError::FileNotFound { path: label });
            }
            Err(e) => return Err(e.into()),
        };

        // A link to a directory is fingerprinted through the link but only
        // the link itself is removed.
        let (before, diff) = if target.is_dir() {
            let tree = FileSnapshot::capture_tree(&target)?;
            let entries = tree.content.lines().count();
            let diff = format!(
                "Delete directory {label}/ ({entries} entries)\n{}",
                tree.content
            );
            (tree, diff)
        } else {
            let snap = FileSnapshot::capture(&target)?;
            let diff = unified_diff(&label, &snap.content, "");
            (snap, diff)
        };

        let confirmation = match self.gate(TOOL, mode, &label, diff, None).await {
            Ok(c) => c,
            Err(e) => return canceled(e, mode),
        };
        StalenessGuard::new(TOOL).verify(&label, &target, &before)?;

        info!("Deleting {label}");
        remove_path(&target, &meta)
            .with_context(|| format!("Failed to delete {}", target.display()))?;

        self.recorder.record(
            &FileChange {
                label: &label,
                path: &target,
                before: &before,
                after: &FileSnapshot::absent(),
            },
            TOOL,
            ChangeMode::Delete,
        );

        Ok(ToolResponse {
            text: format!("Deleted {label}.{}", remark_suffix(&confirmation.remark)),
            outcome: ToolOutcome::ok(TOOL, mode, &label, &confirmation),
        })
    }

    #[instrument(skip_all, fields(dir = %args.path))]
    pub async fn apply_patch(&self, args: PatchArgs) -> Result<ToolResponse, MutationError> {
        const TOOL: &str = "apply_patch";
        let mode = ChangeMode::Patch.as_str();
        let text = Payload {
            text: args.patch.as_deref(),
            base64: args.patch_base64.as_deref(),
            encoding: args.encoding,
            chunks: &args.chunks,
        }
        .resolve_patch()?;
        if text.trim().is_empty() {
            return Err(MutationError::EmptyPatch);
        }

        let plan = plan_patch(&self.ws, &args.path, &text)?;
        let dir = plan.rel_apply_dir.clone();
        let files: Vec<String> = plan.changes.iter().map(|c| c.label.clone()).collect();
        info!(files = files.len(), "Applying patch in {dir}/");

        if plan.changes.is_empty() {
            return Ok(ToolResponse {
                text: format!("Patch in {dir}/ applied cleanly; no file content changed."),
                outcome: ToolOutcome::ok(TOOL, mode, &dir, &ConfirmationOutcome::not_required()),
            });
        }

        let diff: String = plan
            .changes
            .iter()
            .map(|c| unified_diff(&c.label, &c.before.content, c.after.as_deref().unwrap_or("")))
            .collect();
        let message = format!("About to run {TOOL} ({mode}) in {dir}/: {}", files.join(", "));
        let confirmation = match self.gate(TOOL, mode, &dir, diff, Some(message)).await {
            Ok(c) => c,
            Err(e) => return canceled(e, mode),
        };
        StalenessGuard::new(TOOL).verify_all(&plan.changes)?;

        for change in &plan.changes {
            match &change.after {
                Some(content) => write_atomic(&change.path, content.as_bytes())?,
                None if change.before.exists => fs::remove_file(&change.path)
                    .with_context(|| format!("Failed to delete {}", change.path.display()))?,
                None => {}
            }
        }

        let mut recorded = false;
        for change in &plan.changes {
            let after = change
                .after
                .as_ref()
                .map_or_else(FileSnapshot::absent, |c| FileSnapshot::from_content(c.clone()));
            recorded |= self.recorder.record(
                &FileChange {
                    label: &change.label,
                    path: &change.path,
                    before: &change.before,
                    after: &after,
                },
                TOOL,
                ChangeMode::Patch,
            );
        }
        if !recorded {
            self.recorder.record_patch(&plan.normalized_patch);
        }

        Ok(ToolResponse {
            text: format!(
                "Applied patch in {dir}/.\nFiles: {}{}",
                files.join(", "),
                remark_suffix(&confirmation.remark)
            ),
            outcome: ToolOutcome {
                files,
                ..ToolOutcome::ok(TOOL, mode, &dir, &confirmation)
            },
        })
    }
}

/// Remove a file, a directory tree, or a symlink without touching what it
/// points to. `meta` must come from `symlink_metadata`.
fn remove_path(path: &Path, meta: &fs::Metadata) -> std::io::Result<()> {
    if meta.is_dir() {
        fs::remove_dir_all(path)
    } else if cfg!(windows) && meta.file_type().is_symlink() && path.is_dir() {
        fs::remove_dir(path)
    } else {
        fs::remove_file(path)
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::core::confirm::terminal::scripted::ScriptedTerminal;
    use crate::core::confirm::{PromptBackend, PromptLog, StaticPolicy, Terminal};
    use crate::infra::io::read_jsonl;

    struct Fixture {
        tmp: TempDir,
        tools: FileTools,
    }

    impl Fixture {
        fn path(&self, rel: &str) -> PathBuf {
            self.tmp.path().join(rel)
        }

        fn read(&self, rel: &str) -> String {
            fs::read_to_string(self.path(rel)).unwrap()
        }

        fn changes(&self) -> Vec<Value> {
            read_jsonl(&self.tmp.path().join(".state/changes.jsonl")).unwrap()
        }

        fn prompts(&self) -> Vec<Value> {
            read_jsonl(&self.tmp.path().join(".state/prompts.jsonl")).unwrap()
        }
    }

    /// `terminal` gets the workspace root; `None` turns confirmation off.
    fn fixture_with(terminal: impl FnOnce(&Path) -> Option<Arc<dyn Terminal>>) -> Fixture {
        let tmp = TempDir::new().unwrap();
        let ws = Workspace::new(tmp.path()).unwrap();
        let state = tmp.path().join(".state");
        let log = PromptLog::new(state.join("prompts.jsonl")).with_poll_interval(Duration::from_millis(20));
        let gateway = match terminal(ws.root()) {
            Some(t) => ConfirmationGateway::new(Arc::new(StaticPolicy(true)), log)
                .with_backend(PromptBackend::Tty)
                .with_terminal(t),
            None => ConfirmationGateway::new(Arc::new(StaticPolicy(false)), log),
        };
        let recorder = ChangeRecorder::new(state.join("changes.jsonl"), ws.root());
        Fixture {
            tools: FileTools::new(ws, gateway, recorder),
            tmp,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(|_| None)
    }

    fn scripted(answers: &'static [Option<&'static str>]) -> impl FnOnce(&Path) -> Option<Arc<dyn Terminal>> {
        move |_| Some(Arc::new(ScriptedTerminal::new(answers)) as Arc<dyn Terminal>)
    }

    fn edit(path: &str, old: &str, new: &str) -> EditArgs {
        EditArgs {
            path: path.into(),
            old_string: old.into(),
            new_string: new.into(),
            expected_replacements: None,
        }
    }

    /// Approves, but rewrites the target while the human is "thinking".
    struct MeddlingTerminal {
        path: PathBuf,
    }

    #[async_trait]
    impl Terminal for MeddlingTerminal {
        fn writeln(&self, _line: &str) {}

        async fn ask(&self, _question: &str, _cancel: &CancellationToken) -> Option<String> {
            fs::write(&self.path, "changed underneath\n").unwrap();
            Some("y".to_string())
        }
    }

    #[tokio::test]
    async fn test_edit_create_then_refuse_existing() {
        let fx = fixture();
        let resp = fx.tools.edit_file(edit("new/hello.txt", "", "hello")).await.unwrap();
        assert_eq!(resp.outcome.strategy, Some(Strategy::Create));
        assert_eq!(resp.outcome.mode, "create");
        assert!(!resp.outcome.confirmed);
        assert_eq!(fx.read("new/hello.txt"), "hello");

        let err = fx
            .tools
            .edit_file(edit("new/hello.txt", "", "again"))
            .await
            .unwrap_err();
        assert!(matches!(err, MutationError::FileAlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_edit_replaces_all_expected_occurrences() {
        let fx = fixture();
        fs::write(fx.path("f.txt"), "foo foo").unwrap();
        let resp = fx
            .tools
            .edit_file(EditArgs {
                expected_replacements: Some(2),
                ..edit("f.txt", "foo", "bar")
            })
            .await
            .unwrap();
        assert_eq!(resp.outcome.occurrences, Some(2));
        assert_eq!(fx.read("f.txt"), "bar bar");

        let changes = fx.changes();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0]["changeType"], "modified");
        assert_eq!(changes[0]["mode"], "edit");
    }

    #[tokio::test]
    async fn test_count_mismatch_leaves_file_alone() {
        let fx = fixture();
        fs::write(fx.path("f.txt"), "foo foo").unwrap();
        let err = fx.tools.edit_file(edit("f.txt", "foo", "bar")).await.unwrap_err();
        assert!(matches!(err, MutationError::ReplacementCountMismatch { found: 2, .. }));
        assert_eq!(fx.read("f.txt"), "foo foo");
    }

    #[tokio::test]
    async fn test_terminal_cancel_returns_canceled_status() {
        let fx = fixture_with(scripted(&[Some("n"), Some("")]));
        fs::write(fx.path("f.txt"), "alpha\n").unwrap();

        let resp = fx.tools.edit_file(edit("f.txt", "alpha", "beta")).await.unwrap();
        assert!(resp.is_canceled());
        assert!(resp.outcome.request_id.is_some());
        assert_eq!(fx.read("f.txt"), "alpha\n");
        assert!(fx.changes().is_empty());

        let prompts = fx.prompts();
        assert_eq!(prompts.len(), 2);
        assert_eq!(prompts[0]["prompt"]["source"], "code_writer/edit_file");
        assert_eq!(prompts[1]["response"]["status"], "canceled");
    }

    #[tokio::test]
    async fn test_confirmed_edit_reports_confirmation() {
        let fx = fixture_with(scripted(&[Some("y"), Some("ship it")]));
        fs::write(fx.path("f.txt"), "alpha\n").unwrap();

        let resp = fx.tools.edit_file(edit("f.txt", "alpha", "beta")).await.unwrap();
        assert!(resp.outcome.confirmed);
        assert_eq!(resp.outcome.remark, "ship it");
        assert!(resp.text.contains("User remark: ship it"));
        assert_eq!(fx.read("f.txt"), "beta\n");
    }

    #[tokio::test]
    async fn test_change_during_confirmation_aborts() {
        let fx = fixture_with(|root| {
            Some(Arc::new(MeddlingTerminal {
                path: root.join("f.txt"),
            }) as Arc<dyn Terminal>)
        });
        fs::write(fx.path("f.txt"), "alpha\n").unwrap();

        let err = fx.tools.edit_file(edit("f.txt", "alpha", "beta")).await.unwrap_err();
        assert!(matches!(err, MutationError::StaleFileAborted { .. }));
        assert_eq!(fx.read("f.txt"), "changed underneath\n");
        assert!(fx.changes().is_empty());
    }

    #[tokio::test]
    async fn test_write_modes() {
        let fx = fixture();
        let resp = fx
            .tools
            .write_file(WriteArgs {
                path: "log.txt".into(),
                contents: Some("one\n".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(resp.text.starts_with("Created log.txt"));

        fx.tools
            .write_file(WriteArgs {
                path: "log.txt".into(),
                mode: WriteMode::Append,
                contents_base64: Some("dHdvCg==".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(fx.read("log.txt"), "one\ntwo\n");

        let modes: Vec<_> = fx.changes().iter().map(|c| c["mode"].clone()).collect();
        assert_eq!(modes, vec![json!("overwrite"), json!("append")]);
    }

    #[tokio::test]
    async fn test_write_rejects_empty_and_directories() {
        let fx = fixture();
        fs::create_dir(fx.path("dir")).unwrap();

        let err = fx
            .tools
            .write_file(WriteArgs {
                path: "a.txt".into(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_argument");

        let err = fx
            .tools
            .write_file(WriteArgs {
                path: "dir".into(),
                contents: Some("x".into()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, MutationError::NotAFile { .. }));
    }

    #[tokio::test]
    async fn test_delete_file_and_directory() {
        let fx = fixture();
        fs::create_dir_all(fx.path("pkg/sub")).unwrap();
        fs::write(fx.path("pkg/sub/a.txt"), "a").unwrap();
        fs::write(fx.path("b.txt"), "b").unwrap();

        fx.tools
            .delete_path(DeleteArgs { path: "b.txt".into() })
            .await
            .unwrap();
        fx.tools
            .delete_path(DeleteArgs { path: "pkg".into() })
            .await
            .unwrap();
        assert!(!fx.path("b.txt").exists());
        assert!(!fx.path("pkg").exists());

        let types: Vec<_> = fx.changes().iter().map(|c| c["changeType"].clone()).collect();
        assert_eq!(types, vec![json!("deleted"), json!("deleted")]);

        let err = fx
            .tools
            .delete_path(DeleteArgs { path: ".".into() })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_argument");

        let err = fx
            .tools
            .delete_path(DeleteArgs { path: "b.txt".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, MutationError::FileNotFound { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_delete_symlink_to_directory_keeps_target() {
        let fx = fixture();
        fs::create_dir_all(fx.path("real")).unwrap();
        fs::write(fx.path("real/keep.txt"), "keep").unwrap();
        std::os::unix::fs::symlink(fx.path("real"), fx.path("link")).unwrap();

        let resp = fx
            .tools
            .delete_path(DeleteArgs { path: "link".into() })
            .await
            .unwrap();
        assert_eq!(resp.outcome.status, ToolStatus::Ok);

        assert!(fs::symlink_metadata(fx.path("link")).is_err());
        assert_eq!(fx.read("real/keep.txt"), "keep");
        assert_eq!(fx.changes().len(), 1);
    }

    #[tokio::test]
    async fn test_patch_applies_and_records_each_file() {
        let fx = fixture();
        fs::create_dir_all(fx.path("src")).unwrap();
        fs::write(fx.path("src/app.js"), "let a = 1;\nlet b = 2;\n").unwrap();

        let patch = "--- a/app.js\n+++ b/app.js\n@@ -1,2 +1,2 @@\n-let a = 1;\n+let a = 10;\n let b = 2;\n--- /dev/null\n+++ b/util.js\n@@ -0,0 +1 @@\n+export {};";
        let resp = fx
            .tools
            .apply_patch(PatchArgs {
                path: "src".into(),
                patch: Some(patch.into()),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(resp.outcome.path, "src");
        assert_eq!(resp.outcome.files, vec!["src/app.js", "src/util.js"]);
        assert_eq!(fx.read("src/app.js"), "let a = 10;\nlet b = 2;\n");
        assert_eq!(fx.read("src/util.js"), "export {};\n");

        let types: Vec<_> = fx.changes().iter().map(|c| c["changeType"].clone()).collect();
        assert_eq!(types, vec![json!("modified"), json!("created")]);
    }

    #[tokio::test]
    async fn test_failing_hunk_touches_nothing() {
        let fx = fixture();
        fs::write(fx.path("a.txt"), "one\n").unwrap();
        fs::write(fx.path("b.txt"), "two\n").unwrap();

        let patch = "*** Begin Patch\n*** Update File: a.txt\n@@\n-one\n+uno\n*** Update File: b.txt\n@@\n-missing\n+nada\n*** End Patch\n";
        let err = fx
            .tools
            .apply_patch(PatchArgs {
                patch: Some(patch.into()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, MutationError::PatchApplicationFailed { .. }));
        assert!(err.to_string().contains("Troubleshooting tips"));
        assert_eq!(fx.read("a.txt"), "one\n");
        assert_eq!(fx.read("b.txt"), "two\n");
    }

    #[tokio::test]
    async fn test_call_dispatches_json_arguments() {
        let fx = fixture();
        let resp = fx
            .tools
            .call(
                "write_file",
                json!({"path": "c.txt", "chunks": [{"content": "a"}, {"content": "Yg==", "encoding": "base64"}]}),
            )
            .await
            .unwrap();
        assert_eq!(resp.outcome.tool, "write_file");
        assert_eq!(fx.read("c.txt"), "ab");

        let out = resp.to_json();
        assert_eq!(out["result"]["status"], "ok");
        assert_eq!(out["result"]["mode"], "overwrite");
        assert!(out["result"].get("occurrences").is_none());

        let err = fx.tools.call("rm_rf", json!({})).await.unwrap_err();
        assert_eq!(failure_json("rm_rf", &err)["error"], "invalid_argument");
    }

    #[tokio::test]
    async fn test_paths_cannot_escape_workspace() {
        let fx = fixture();
        let err = fx
            .tools
            .edit_file(edit("../outside.txt", "", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, MutationError::OutsideWorkspace { .. }));
        assert!(!Path::new(&fx.tmp.path().join("../outside.txt")).exists());
    }
}
