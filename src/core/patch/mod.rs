//! Patch text handling shared by both dialects.
//!
//! Two formats are accepted: standard unified diffs and a file-operation
//! dialect (`*** Add File:`, `*** Update File:`, `*** Delete File:`).
//! Incoming text is cleaned up first (fences, prose, indentation), then
//! sniffed, validated, and finally applied in memory by `unified` or
//! `friendly` before anything touches disk.

pub mod friendly;
pub mod plan;
pub mod unified;

use indexmap::IndexSet;

use crate::core::error::MutationError;

pub use plan::{PatchPlan, PlannedChange, plan_patch};

/// Which dialect a patch is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchFormat {
    Unified,
    Friendly,
}

/// File operation named by a friendly header line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOp {
    Add,
    Delete,
    Update,
}

impl FileOp {
    fn tag(self) -> &'static str {
        match self {
            FileOp::Add => "Add File",
            FileOp::Delete => "Delete File",
            FileOp::Update => "Update File",
        }
    }
}

/// Text after `*** ` on a directive line (leading indentation allowed).
pub(crate) fn star_directive(line: &str) -> Option<&str> {
    let rest = line.trim_start().strip_prefix("***")?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    Some(rest.trim_start())
}

/// `*** Add File: path` and friends.
pub(crate) fn friendly_header(line: &str) -> Option<(FileOp, &str)> {
    let d = star_directive(line)?;
    [FileOp::Add, FileOp::Delete, FileOp::Update]
        .into_iter()
        .find_map(|op| d.strip_prefix(op.tag())?.strip_prefix(':').map(|p| (op, p)))
}

/// `*** Move to: path`.
pub(crate) fn move_header(line: &str) -> Option<&str> {
    star_directive(line)?.strip_prefix("Move to:")
}

fn is_wrapper_line(line: &str) -> bool {
    matches!(line.trim(), "*** Begin Patch" | "*** End Patch" | "*** End of File")
}

/// Any line that can start a patch (used to drop leading prose).
fn is_patch_marker(line: &str) -> bool {
    let t = line.trim_start();
    if let Some(d) = star_directive(t) {
        return d.starts_with("Begin Patch") || d.starts_with("End Patch") || friendly_header(t).is_some();
    }
    t.starts_with("diff --git ") || t.starts_with("--- ") || t.starts_with("+++ ") || t.starts_with("@@")
}

/// Markers whose indentation is treated as accidental.
fn is_control_line(t: &str) -> bool {
    if t.starts_with("diff --git ") || t.starts_with("--- ") || t.starts_with("+++ ") || t.starts_with("@@") {
        return true;
    }
    if friendly_header(t).is_some() || move_header(t).is_some() {
        return true;
    }
    matches!(star_directive(t), Some(d) if d.starts_with("Begin Patch") || d.starts_with("End Patch"))
}

pub fn is_friendly_patch(text: &str) -> bool {
    text.lines().any(|l| friendly_header(l).is_some())
}

pub fn detect_format(text: &str) -> PatchFormat {
    if is_friendly_patch(text) {
        PatchFormat::Friendly
    } else {
        PatchFormat::Unified
    }
}

/// Rank how patch-like a block of text is.
fn patch_score(candidate: &str) -> u32 {
    let mut score = 0;
    if is_friendly_patch(candidate) {
        score += 100;
    }
    let header = |prefix: &str| {
        candidate
            .lines()
            .any(|l| l.strip_prefix(prefix).is_some_and(|r| r.starts_with(char::is_whitespace)))
    };
    if header("---") && header("+++") {
        score += 50;
    }
    if candidate.lines().any(|l| l.starts_with("diff --git ")) {
        score += 20;
    }
    if candidate.lines().any(|l| l.starts_with("@@")) {
        score += 10;
    }
    if candidate.contains("*** Begin Patch") {
        score += 5;
    }
    score
}

/// Pick the most patch-like fenced block, if any scores above zero.
fn best_fenced_block(source: &str) -> Option<String> {
    let lines: Vec<&str> = source.split('\n').collect();
    let mut best: Option<(u32, String)> = None;
    let mut i = 0;

    while i < lines.len() {
        let Some(info) = lines[i].trim_start().strip_prefix("```") else {
            i += 1;
            continue;
        };
        if info.contains('`') {
            i += 1;
            continue;
        }
        let lang = info.trim().to_ascii_lowercase();
        let start = i + 1;
        i = start;
        while i < lines.len() && !lines[i].trim_start().starts_with("```") {
            i += 1;
        }
        let body = lines[start..i.min(lines.len())].join("\n");
        i += 1;

        let mut score = patch_score(&body);
        if lang == "diff" || lang == "patch" {
            score += 5;
        }
        if best.as_ref().is_none_or(|(s, _)| score > *s) {
            best = Some((score, body));
        }
    }

    best.filter(|(s, _)| *s > 0).map(|(_, body)| body)
}

fn strip_surrounding_fence(source: &str) -> String {
    if !source.trim().starts_with("```") {
        return source.to_string();
    }
    let body = source
        .trim_start()
        .split_once('\n')
        .map_or("", |(_, rest)| rest);
    let trimmed = body.trim_end();
    match trimmed.strip_suffix("```") {
        Some(inner) if inner.is_empty() || inner.ends_with('\n') => inner.to_string(),
        _ => body.to_string(),
    }
}

fn trim_to_first_marker(source: &str) -> String {
    let lines: Vec<&str> = source.split('\n').collect();
    match lines.iter().position(|l| is_patch_marker(l)) {
        Some(idx) if idx > 0 => lines[idx..].join("\n"),
        _ => source.to_string(),
    }
}

fn strip_common_indent(source: &str) -> String {
    let min_indent = source
        .split('\n')
        .filter_map(|line| {
            let t = line.trim_start();
            let indent = line.len() - t.len();
            (indent > 0 && is_control_line(t)).then_some(indent)
        })
        .min();

    let Some(min_indent) = min_indent else {
        return source.to_string();
    };

    source
        .split('\n')
        .map(|line| {
            let strip = line
                .bytes()
                .take(min_indent)
                .take_while(|b| *b == b' ' || *b == b'\t')
                .count();
            &line[strip..]
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Clean up patch text as typically produced by a language model.
pub fn preprocess_patch_text(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }

    let mut text = raw.replace("\r\n", "\n");
    text = best_fenced_block(&text).unwrap_or_else(|| strip_surrounding_fence(&text));
    text = trim_to_first_marker(&text);
    text = strip_common_indent(&text);

    let friendly = is_friendly_patch(&text);
    let mut out: Vec<&str> = Vec::new();
    for line in text.split('\n') {
        if !friendly && is_wrapper_line(line) {
            continue;
        }
        let t = line.trim_start();
        out.push(if t.len() != line.len() && is_control_line(t) { t } else { line });
    }

    let joined = out.join("\n");
    let first_content = joined
        .split_inclusive('\n')
        .take_while(|l| l.trim().is_empty())
        .map(str::len)
        .sum::<usize>();
    let mut text = joined[first_content..].to_string();
    if !text.is_empty() && !text.ends_with('\n') {
        text.push('\n');
    }
    text
}

fn invalid(reason: &str, rel_dir: &str) -> MutationError {
    MutationError::InvalidPatchFormat {
        reason: format!(
            "{reason}\n\nTips:\n\
             - Ensure patch has proper headers (---, +++) or friendly file ops (*** Update File/Add File/Delete File)\n\
             - Include hunk markers (@@) for unified diff patches\n\
             - Use correct line prefixes (+, -, space for context)\n\
             - Verify file paths are relative to: {rel_dir}"
        ),
    }
}

/// Sniff the dialect and validate it. `rel_dir` only feeds the hint text.
pub fn validate_patch(text: &str, rel_dir: &str) -> Result<PatchFormat, MutationError> {
    if text.trim().is_empty() {
        return Err(MutationError::EmptyPatch);
    }

    match detect_format(text) {
        PatchFormat::Friendly => {
            let ops = friendly::parse(text);
            if ops.is_empty() {
                return Err(invalid(
                    "Missing friendly patch operations (*** Add/Update/Delete File)",
                    rel_dir,
                ));
            }
            tracing::debug!(ops = ops.len(), "friendly patch validation passed");
            Ok(PatchFormat::Friendly)
        }
        PatchFormat::Unified => {
            let lines: Vec<&str> = text.split('\n').collect();
            let has_minus = lines.iter().any(|l| l.starts_with("---"));
            let has_plus = lines.iter().any(|l| l.starts_with("+++"));
            if !has_minus || !has_plus {
                return Err(invalid("Missing file headers (--- or +++)", rel_dir));
            }

            let hunks: Vec<&str> = lines.iter().copied().filter(|l| l.starts_with("@@")).collect();
            if hunks.is_empty() {
                return Err(invalid("Missing hunk markers (@@)", rel_dir));
            }
            if let Some(bad) = hunks.iter().find(|h| unified::parse_hunk_header(h).is_none()) {
                return Err(invalid(&format!("Invalid hunk format: {bad}"), rel_dir));
            }

            let changes = lines
                .iter()
                .filter(|l| (l.starts_with('+') || l.starts_with('-')) && !l.starts_with("+++") && !l.starts_with("---"))
                .count();
            if changes == 0 {
                return Err(invalid("Patch contains no actual changes (no +/- lines)", rel_dir));
            }

            tracing::debug!(hunks = hunks.len(), changes, "unified patch validation passed");
            Ok(PatchFormat::Unified)
        }
    }
}

/// Strip `a/`, `b/`, `./` prefixes and trailing slashes.
pub fn normalize_friendly_path(raw: &str) -> String {
    let mut candidate = raw.trim().replace('\\', "/");
    if let Some(rest) = candidate.strip_prefix("a/").or_else(|| candidate.strip_prefix("b/")) {
        candidate = rest.to_string();
    }
    if let Some(rest) = candidate.strip_prefix("./") {
        candidate = rest.to_string();
    }
    candidate.trim_end_matches('/').to_string()
}

/// Path from a `---`/`+++`/`diff --git` header; `/dev/null` yields `""`.
pub fn normalize_patch_path(raw: &str) -> String {
    match raw.split_whitespace().next() {
        None | Some("/dev/null") => String::new(),
        Some(candidate) => normalize_friendly_path(candidate),
    }
}

/// Every path a patch names, in first-seen order.
pub fn list_patch_files(text: &str) -> Vec<String> {
    let mut files: IndexSet<String> = IndexSet::new();
    for line in text.split('\n') {
        let line = line.trim_end_matches('\r');
        if let Some(rest) = line.strip_prefix("diff --git ") {
            for part in rest.split(' ').filter(|p| !p.is_empty()).take(2) {
                files.insert(normalize_patch_path(part));
            }
        } else if let Some(rest) = line.strip_prefix("--- ").or_else(|| line.strip_prefix("+++ ")) {
            files.insert(normalize_patch_path(rest));
        } else if let Some((_, p)) = friendly_header(line).filter(|_| line.starts_with("***")) {
            files.insert(normalize_friendly_path(p));
        } else if let Some(p) = move_header(line).filter(|_| line.starts_with("***")) {
            files.insert(normalize_friendly_path(p));
        }
    }
    files.into_iter().filter(|f| !f.is_empty()).collect()
}

/// Strip `dir/` from a patch path, keeping an `a/`/`b/` prefix.
pub fn strip_workdir_prefix(raw: &str, dir: &str) -> String {
    let candidate = raw.replace('\\', "/");
    let (prefix, rest) = match candidate.get(..2) {
        Some(p @ ("a/" | "b/")) => (p, &candidate[2..]),
        _ => ("", candidate.as_str()),
    };
    if !dir.is_empty() {
        if let Some(trimmed) = rest.strip_prefix(&format!("{dir}/")) {
            if !trimmed.is_empty() {
                return format!("{prefix}{trimmed}");
            }
        }
    }
    format!("{prefix}{rest}")
}

fn normalize_rel_dir(rel_dir: &str) -> String {
    let dir = rel_dir.replace('\\', "/");
    let dir = if dir == "." { "" } else { dir.strip_prefix("./").unwrap_or(&dir) };
    dir.trim_end_matches('/').to_string()
}

/// Rewrite header paths that carry the working-directory prefix so the
/// patch applies from inside that directory.
pub fn rewrite_patch_working_dir(text: &str, rel_dir: &str) -> String {
    let dir = normalize_rel_dir(rel_dir);
    if dir.is_empty() {
        return text.to_string();
    }

    text.split('\n')
        .map(|line| rewrite_line(line, &dir).unwrap_or_else(|| line.to_string()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn rewrite_line(line: &str, dir: &str) -> Option<String> {
    for marker in ["---", "+++"] {
        if let Some(rest) = line.strip_prefix(marker) {
            if !rest.starts_with(char::is_whitespace) || rest.trim().is_empty() {
                return None;
            }
            let mut parts = rest.trim_start().split('\t').filter(|p| !p.is_empty());
            let path = parts.next()?;
            let meta: Vec<&str> = parts.collect();
            let suffix = if meta.is_empty() { String::new() } else { format!("\t{}", meta.join("\t")) };
            return Some(format!("{marker} {}{suffix}", strip_workdir_prefix(path.trim(), dir)));
        }
    }

    if let Some(rest) = line.strip_prefix("diff --git") {
        let rest = rest.trim_start();
        let (a, tail) = rest.split_once(char::is_whitespace)?;
        let tail = tail.trim_start();
        let (b, extra) = match tail.find(char::is_whitespace) {
            Some(idx) => (&tail[..idx], &tail[idx..]),
            None => (tail, ""),
        };
        return Some(format!(
            "diff --git {} {}{extra}",
            strip_workdir_prefix(a, dir),
            strip_workdir_prefix(b, dir)
        ));
    }

    if line.starts_with("*** ") {
        if let Some((op, p)) = friendly_header(line) {
            return Some(format!("*** {}: {}", op.tag(), strip_workdir_prefix(p.trim(), dir)));
        }
        if let Some(p) = move_header(line) {
            return Some(format!("*** Move to: {}", strip_workdir_prefix(p.trim(), dir)));
        }
    }
    None
}
