//! Unified diffs for confirmation prompts and the change log.

use similar::TextDiff;

/// Default cap for diffs shown in the UI prompt record.
pub const UI_DIFF_LIMIT: usize = 60_000;

/// Default cap for diffs printed in the terminal prompt.
pub const TTY_DIFF_LIMIT: usize = 20_000;

/// Render `before` → `after` with `a/<label>` / `b/<label>` headers.
///
/// Line endings are normalized so a CRLF file does not render every
/// line as changed.
pub fn unified_diff(label: &str, before: &str, after: &str) -> String {
    let before = before.replace("\r\n", "\n");
    let after = after.replace("\r\n", "\n");
    if before == after {
        return String::new();
    }

    TextDiff::from_lines(&before, &after)
        .unified_diff()
        .context_radius(3)
        .header(&format!("a/{label}"), &format!("b/{label}"))
        .to_string()
}

/// Cap `text` at `limit` characters, noting how much was dropped.
/// A limit of zero disables truncation.
pub fn truncate_for_ui(text: &str, limit: usize) -> String {
    if limit == 0 {
        return text.to_string();
    }
    let total = text.chars().count();
    if total <= limit {
        return text.to_string();
    }
    let kept: String = text.chars().take(limit).collect();
    format!("{kept}\n... (truncated {} chars)", total - limit)
}
