//! Patch planning.
//!
//! A plan fixes the directory a patch applies against and computes the
//! resulting content of every touched file in memory. Nothing is written
//! here; the caller commits the plan once it has been confirmed.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use indexmap::IndexMap;
use indexmap::map::Entry;
use tracing::debug;

use super::{
    PatchFormat, friendly, list_patch_files, preprocess_patch_text, rewrite_patch_working_dir,
    unified, validate_patch,
};
use crate::core::error::MutationError;
use crate::core::snapshot::FileSnapshot;
use crate::infra::workspace::Workspace;

/// Lines of the normalized patch echoed in a failure report.
const PREVIEW_LINES: usize = 20;

/// New state of one file.
#[derive(Debug, Clone)]
pub struct PlannedChange {
    pub label: String,
    pub path: PathBuf,
    pub before: FileSnapshot,
    /// `None` removes the file.
    pub after: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PatchPlan {
    pub apply_dir: PathBuf,
    pub rel_apply_dir: String,
    /// Paths as named by the patch, relative to `apply_dir`.
    pub affected_paths: Vec<String>,
    pub normalized_patch: String,
    pub format: PatchFormat,
    pub changes: Vec<PlannedChange>,
}

impl PatchPlan {
    pub fn troubleshooting(&self) -> String {
        troubleshooting(&self.rel_apply_dir, &self.affected_paths, &self.normalized_patch)
    }
}

fn troubleshooting(rel_apply_dir: &str, affected: &[String], patch: &str) -> String {
    let lines: Vec<&str> = patch.split('\n').collect();
    let mut out = format!(
        "\nTroubleshooting tips:\n\
         1. Working directory: {rel_apply_dir}/\n\
         2. Expected files: {}\n\
         3. Verify patch file paths are relative to working directory\n\
         4. Check that line numbers in @@ markers match current file state\n\
         5. Ensure context lines (without +/-) match exactly\n\
         6. For large changes, consider using write_file instead\n\
         \nPatch preview:\n{}",
        affected.join(", "),
        lines[..lines.len().min(PREVIEW_LINES)].join("\n")
    );
    if lines.len() > PREVIEW_LINES {
        out.push_str("\n...(truncated)");
    }
    out
}

/// Heuristic: no trailing separator and a dotted basename.
pub fn looks_like_file_path(input: &str) -> bool {
    let value = input.trim();
    if value.is_empty() || value.ends_with('/') || value.ends_with('\\') {
        return false;
    }
    let base = value.rsplit(['/', '\\']).next().unwrap_or(value);
    !matches!(base, "" | "." | "..") && base.contains('.')
}

/// Turn the caller's working-directory hint into an existing directory,
/// creating it when missing. A hint naming a file yields its parent.
pub fn resolve_work_dir(ws: &Workspace, hint: &str) -> Result<PathBuf, MutationError> {
    let hint = if hint.trim().is_empty() { "." } else { hint };
    let mut dir = ws.resolve(hint)?;

    if !dir.exists() {
        let target = if looks_like_file_path(hint) {
            dir.parent().map_or_else(|| ws.root().to_path_buf(), Path::to_path_buf)
        } else {
            dir.clone()
        };
        fs::create_dir_all(&target)
            .with_context(|| format!("Failed to create work dir {}", target.display()))?;
        dir = target;
    }

    if dir.is_file() {
        if let Some(parent) = dir.parent() {
            dir = parent.to_path_buf();
        }
    }

    if !dir.is_dir() {
        return Err(MutationError::InvalidArgument(format!(
            "Work dir {hint} is not a valid directory; cannot apply patch."
        )));
    }
    Ok(dir)
}

fn count_existing(ws: &Workspace, paths: &[String], base: &Path) -> usize {
    paths
        .iter()
        .filter_map(|rel| ws.resolve_from(base, rel).ok())
        .filter(|abs| abs.is_file())
        .count()
}

/// Decide whether patch paths are relative to the root or to `work_dir`.
///
/// The interpretation naming more existing files wins. On a tie the
/// hinted directory is kept, unless the patch mixes paths carrying the
/// directory prefix with paths that do not, in which case the root is
/// used.
pub fn choose_apply_dir(ws: &Workspace, work_dir: &Path, patch: &str) -> (PathBuf, String) {
    let rel = ws.label(work_dir);
    if rel == "." {
        return (ws.root().to_path_buf(), patch.to_string());
    }

    let for_work = rewrite_patch_working_dir(patch, &rel);
    let root_paths = list_patch_files(patch);
    let work_paths = list_patch_files(&for_work);
    let root_hits = count_existing(ws, &root_paths, ws.root());
    let work_hits = count_existing(ws, &work_paths, work_dir);
    debug!(%rel, root_hits, work_hits, "choosing patch apply dir");

    if root_hits > work_hits {
        return (ws.root().to_path_buf(), patch.to_string());
    }
    if work_hits > root_hits {
        return (work_dir.to_path_buf(), for_work);
    }

    let prefix = format!("{rel}/");
    let prefixed = root_paths.iter().any(|p| p.starts_with(&prefix));
    let mixed = prefixed && root_paths.iter().any(|p| !p.starts_with(&prefix));
    if mixed {
        (ws.root().to_path_buf(), patch.to_string())
    } else {
        (work_dir.to_path_buf(), for_work)
    }
}

/// Build a complete plan: preprocess, validate, pick the apply dir and
/// compute every file's new content.
pub fn plan_patch(ws: &Workspace, hint: &str, raw_patch: &str) -> Result<PatchPlan, MutationError> {
    let work_dir = resolve_work_dir(ws, hint)?;
    let rel_work = ws.label(&work_dir);

    let text = preprocess_patch_text(raw_patch);
    if text.trim().is_empty() {
        return Err(MutationError::EmptyPatch);
    }
    let format = validate_patch(&text, &rel_work)?;

    let (apply_dir, normalized_patch) = choose_apply_dir(ws, &work_dir, &text);
    let rel_apply_dir = ws.label(&apply_dir);
    let affected_paths = list_patch_files(&normalized_patch);
    if affected_paths.is_empty() {
        return Err(MutationError::InvalidPatchFormat {
            reason: "No files found in patch. Check patch format.".into(),
        });
    }

    let mut plan = PatchPlan {
        apply_dir,
        rel_apply_dir,
        affected_paths,
        normalized_patch,
        format,
        changes: Vec::new(),
    };

    let mut staging = Staging {
        ws,
        apply_dir: &plan.apply_dir,
        files: IndexMap::new(),
    };
    let staged = match format {
        PatchFormat::Unified => staging.apply_unified(&plan.normalized_patch),
        PatchFormat::Friendly => staging.apply_friendly(&plan.normalized_patch),
    };

    match staged {
        Ok(()) => {
            plan.changes = staging.into_changes();
            debug!(
                apply_dir = %plan.rel_apply_dir,
                files = plan.changes.len(),
                "patch planned"
            );
            Ok(plan)
        }
        Err(MutationError::PatchApplicationFailed { message, .. }) => {
            Err(MutationError::PatchApplicationFailed {
                message,
                troubleshooting: plan.troubleshooting(),
            })
        }
        Err(e) => Err(e),
    }
}

fn failed(message: impl Into<String>) -> MutationError {
    MutationError::PatchApplicationFailed {
        message: message.into(),
        troubleshooting: String::new(),
    }
}

struct Staged {
    before: FileSnapshot,
    current: Option<String>,
}

/// Working copy of every file a patch touches.
struct Staging<'a> {
    ws: &'a Workspace,
    apply_dir: &'a Path,
    files: IndexMap<PathBuf, Staged>,
}

impl Staging<'_> {
    fn resolve(&self, rel: &str) -> Result<PathBuf, MutationError> {
        self.ws.resolve_from(self.apply_dir, rel)
    }

    fn load(&mut self, path: &Path) -> Result<&mut Staged, MutationError> {
        match self.files.entry(path.to_path_buf()) {
            Entry::Occupied(e) => Ok(e.into_mut()),
            Entry::Vacant(v) => {
                let label = self.ws.label(path);
                if path.is_dir() {
                    return Err(MutationError::NotAFile { path: label });
                }
                let before = FileSnapshot::capture(path)?;
                if before.binary {
                    return Err(MutationError::BinaryFileRejected { path: label });
                }
                let current = before.exists.then(|| before.content.clone());
                Ok(v.insert(Staged { before, current }))
            }
        }
    }

    fn existing_content(&mut self, path: &Path) -> Result<String, MutationError> {
        let label = self.ws.label(path);
        self.load(path)?
            .current
            .clone()
            .ok_or_else(|| failed(format!("can't find file to patch: {label}")))
    }

    fn apply_unified(&mut self, text: &str) -> Result<(), MutationError> {
        let files = unified::parse(text).map_err(failed)?;

        for fp in &files {
            let Some(source_rel) = fp.source() else {
                continue;
            };
            let source = self.resolve(source_rel)?;
            let label = self.ws.label(&source);

            if fp.is_delete() {
                self.existing_content(&source)?;
                self.load(&source)?.current = None;
                continue;
            }

            let original = if fp.is_create() {
                let staged = self.load(&source)?;
                if staged.current.as_deref().is_some_and(|c| !c.is_empty()) {
                    return Err(failed(format!("{label} already exists; cannot create it")));
                }
                None
            } else {
                Some(self.existing_content(&source)?)
            };

            let updated = unified::apply_hunks(original.as_deref(), &fp.hunks)
                .map_err(|e| failed(format!("{label}: {e}")))?;

            let dest = match (&fp.old_path, &fp.new_path) {
                (Some(old), Some(new)) if old != new => {
                    self.load(&source)?.current = None;
                    self.resolve(new)?
                }
                _ => source,
            };
            self.load(&dest)?.current = Some(updated);
        }
        Ok(())
    }

    fn apply_friendly(&mut self, text: &str) -> Result<(), MutationError> {
        for op in friendly::parse(text) {
            match op {
                friendly::FriendlyOp::Add { path, lines } => {
                    let target = self.resolve(&path)?;
                    self.load(&target)?.current = Some(friendly::add_file_content(&lines));
                }
                friendly::FriendlyOp::Delete { path } => {
                    let target = self.resolve(&path)?;
                    let label = self.ws.label(&target);
                    let staged = self.load(&target)?;
                    if staged.current.is_none() {
                        return Err(failed(format!("Delete File target not found: {label}")));
                    }
                    staged.current = None;
                }
                friendly::FriendlyOp::Update {
                    path,
                    move_to,
                    blocks,
                } => {
                    let source = self.resolve(&path)?;
                    let label = self.ws.label(&source);
                    let content = self
                        .load(&source)?
                        .current
                        .clone()
                        .ok_or_else(|| failed(format!("Target file not found: {label}")))?;

                    let dest = match move_to {
                        Some(to) => {
                            self.load(&source)?.current = None;
                            self.resolve(&to)?
                        }
                        None => source,
                    };
                    let dest_label = self.ws.label(&dest);
                    let updated =
                        friendly::apply_blocks(&content, &blocks, &dest_label).map_err(failed)?;
                    self.load(&dest)?.current = Some(updated);
                }
            }
        }
        Ok(())
    }

    /// Files whose final state differs from disk.
    fn into_changes(self) -> Vec<PlannedChange> {
        let ws = self.ws;
        self.files
            .into_iter()
            .filter(|(_, s)| match &s.current {
                Some(c) => !s.before.exists || *c != s.before.content,
                None => s.before.exists,
            })
            .map(|(path, s)| PlannedChange {
                label: ws.label(&path),
                path,
                before: s.before,
                after: s.current,
            })
            .collect()
    }
}
