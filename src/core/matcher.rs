//! Edit-by-replacement resolution.
//!
//! An edit names an `old_string` to find and a `new_string` to put in its
//! place. Strategies are tried in order (exact, flexible, regex) and the
//! first one that matches decides the edit. Each strategy is a pure
//! function over LF-normalized text.

use regex::{NoExpand, Regex};

use crate::core::error::{MutationError, Strategy};
use crate::core::snapshot::FileSnapshot;
use crate::infra::io::{LineEnding, normalize_to_lf, restore_trailing_newline};

/// Outcome of a successful resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplacementResult {
    pub new_content: String,
    pub occurrences: usize,
    pub strategy: Strategy,
}

/// `(content, old, new) -> Option<result>`; `None` means "try the next one".
pub type StrategyFn = fn(&str, &str, &str) -> Option<ReplacementResult>;

/// Strategies in priority order.
pub const STRATEGIES: [StrategyFn; 3] = [exact_replace, flexible_replace, regex_replace];

/// Characters padded with spaces before tokenizing for the regex strategy.
const DELIMITERS: [char; 10] = ['(', ')', ':', '[', ']', '{', '}', '>', '<', '='];

/// Parameters of one edit attempt.
#[derive(Debug, Clone)]
pub struct EditRequest<'a> {
    /// Workspace-relative label used in error messages.
    pub path: &'a str,
    pub old_string: &'a str,
    pub new_string: &'a str,
    pub expected_replacements: usize,
}

/// Resolve an edit against the current state of the file.
///
/// The returned content is ready to write: the file's line-ending
/// convention and trailing-newline choice are preserved.
pub fn resolve(
    current: &FileSnapshot,
    req: &EditRequest<'_>,
) -> Result<ReplacementResult, MutationError> {
    if req.expected_replacements == 0 {
        return Err(MutationError::InvalidArgument(
            "expected_replacements must be at least 1".into(),
        ));
    }

    if current.exists && current.binary {
        return Err(MutationError::BinaryFileRejected {
            path: req.path.to_string(),
        });
    }

    if req.old_string.is_empty() {
        if current.exists {
            return Err(MutationError::FileAlreadyExists {
                path: req.path.to_string(),
            });
        }
        return Ok(ReplacementResult {
            new_content: req.new_string.to_string(),
            occurrences: 1,
            strategy: Strategy::Create,
        });
    }

    if !current.exists {
        return Err(MutationError::FileNotFound {
            path: req.path.to_string(),
        });
    }

    let old = normalize_to_lf(req.old_string);
    let new = normalize_to_lf(req.new_string);
    if old == new {
        return Err(MutationError::NoChange);
    }

    let ending = LineEnding::detect(&current.content);
    let content = normalize_to_lf(&current.content);

    let result = STRATEGIES
        .iter()
        .find_map(|strategy| strategy(&content, &old, &new))
        .ok_or_else(|| MutationError::NoMatchFound {
            path: req.path.to_string(),
        })?;

    if result.occurrences != req.expected_replacements {
        return Err(MutationError::ReplacementCountMismatch {
            path: req.path.to_string(),
            expected: req.expected_replacements,
            found: result.occurrences,
            strategy: result.strategy,
        });
    }

    let restored = restore_trailing_newline(&content, result.new_content);
    Ok(ReplacementResult {
        new_content: ending.apply(&restored),
        ..result
    })
}

/// Literal, case-sensitive, non-overlapping occurrences.
pub fn exact_replace(content: &str, old: &str, new: &str) -> Option<ReplacementResult> {
    if old.is_empty() {
        return None;
    }
    let occurrences = content.matches(old).count();
    if occurrences == 0 {
        return None;
    }
    Some(ReplacementResult {
        new_content: content.replace(old, new),
        occurrences,
        strategy: Strategy::Exact,
    })
}

/// Line-window match ignoring leading/trailing whitespace per line.
///
/// The replacement is indented like the first line of the matched window
/// and scanning resumes after the inserted block.
pub fn flexible_replace(content: &str, old: &str, new: &str) -> Option<ReplacementResult> {
    let mut lines: Vec<String> = content.split('\n').map(str::to_string).collect();
    let search: Vec<&str> = old.split('\n').map(str::trim).collect();
    let replace: Vec<&str> = new.split('\n').collect();

    let window = search.len();
    let mut occurrences = 0;
    let mut i = 0;

    while i + window <= lines.len() {
        let hit = lines[i..i + window]
            .iter()
            .zip(&search)
            .all(|(line, want)| line.trim() == *want);
        if !hit {
            i += 1;
            continue;
        }

        occurrences += 1;
        let indent = leading_whitespace(&lines[i]).to_string();
        let block: Vec<String> = replace.iter().map(|l| format!("{indent}{l}")).collect();
        let inserted = block.len();
        lines.splice(i..i + window, block);
        i += inserted;
    }

    (occurrences > 0).then(|| ReplacementResult {
        new_content: lines.join("\n"),
        occurrences,
        strategy: Strategy::Flexible,
    })
}

/// Token match tolerant of arbitrary whitespace between tokens; replaces
/// the first hit only.
pub fn regex_replace(content: &str, old: &str, new: &str) -> Option<ReplacementResult> {
    let re = token_pattern(old)?;
    let caps = re.captures(content)?;
    let indent = caps.get(1).map_or("", |m| m.as_str());

    let block = new
        .split('\n')
        .map(|l| format!("{indent}{l}"))
        .collect::<Vec<_>>()
        .join("\n");

    Some(ReplacementResult {
        new_content: re.replacen(content, 1, NoExpand(&block)).into_owned(),
        occurrences: 1,
        strategy: Strategy::Regex,
    })
}

/// `(?m)^(\s*)tok\s*tok...` built from the delimiter-padded tokens of `old`.
fn token_pattern(old: &str) -> Option<Regex> {
    let mut padded = String::with_capacity(old.len() * 2);
    for ch in old.chars() {
        if DELIMITERS.contains(&ch) {
            padded.push(' ');
            padded.push(ch);
            padded.push(' ');
        } else {
            padded.push(ch);
        }
    }

    let tokens: Vec<String> = padded.split_whitespace().map(regex::escape).collect();
    if tokens.is_empty() {
        return None;
    }

    Regex::new(&format!(r"(?m)^(\s*){}", tokens.join(r"\s*"))).ok()
}

fn leading_whitespace(line: &str) -> &str {
    &line[..line.len() - line.trim_start().len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req<'a>(old: &'a str, new: &'a str, expected: usize) -> EditRequest<'a> {
        EditRequest {
            path: "file.txt",
            old_string: old,
            new_string: new,
            expected_replacements: expected,
        }
    }

    #[test]
    fn test_exact_replaces_every_occurrence() {
        let snap = FileSnapshot::from_content("foo foo");
        let out = resolve(&snap, &req("foo", "bar", 2)).unwrap();
        assert_eq!(out.new_content, "bar bar");
        assert_eq!(out.occurrences, 2);
        assert_eq!(out.strategy, Strategy::Exact);
    }

    #[test]
    fn test_count_mismatch_fails_even_when_matchable() {
        let snap = FileSnapshot::from_content("foo foo");
        let err = resolve(&snap, &req("foo", "bar", 1)).unwrap_err();
        assert!(matches!(
            err,
            MutationError::ReplacementCountMismatch { expected: 1, found: 2, .. }
        ));
    }

    #[test]
    fn test_create_when_absent() {
        let out = resolve(&FileSnapshot::absent(), &req("", "hello", 1)).unwrap();
        assert_eq!(out.strategy, Strategy::Create);
        assert_eq!(out.new_content, "hello");
        assert_eq!(out.occurrences, 1);
    }

    #[test]
    fn test_create_over_existing_fails() {
        let snap = FileSnapshot::from_content("");
        let err = resolve(&snap, &req("", "hello", 1)).unwrap_err();
        assert!(matches!(err, MutationError::FileAlreadyExists { .. }));
    }

    #[test]
    fn test_edit_missing_file_fails() {
        let err = resolve(&FileSnapshot::absent(), &req("a", "b", 1)).unwrap_err();
        assert!(matches!(err, MutationError::FileNotFound { .. }));
    }

    #[test]
    fn test_identical_strings_are_rejected() {
        let snap = FileSnapshot::from_content("abc");
        let err = resolve(&snap, &req("a\r\nb", "a\nb", 1)).unwrap_err();
        assert!(matches!(err, MutationError::NoChange));
    }

    #[test]
    fn test_binary_rejected_before_matching() {
        let mut snap = FileSnapshot::from_content("");
        snap.binary = true;
        let err = resolve(&snap, &req("a", "b", 1)).unwrap_err();
        assert!(matches!(err, MutationError::BinaryFileRejected { .. }));
    }

    #[test]
    fn test_flexible_reindents_to_window() {
        let content = "fn main() {\n        let x = 1;\n        let y = 2;\n}\n";
        let old = "let x = 1;\n  let y = 2;";
        let new = "let x = 10;\nlet y = 20;";
        assert!(exact_replace(content, old, new).is_none());

        let out = flexible_replace(content, old, new).unwrap();
        assert_eq!(
            out.new_content,
            "fn main() {\n        let x = 10;\n        let y = 20;\n}\n"
        );
        assert_eq!(out.occurrences, 1);
    }

    #[test]
    fn test_flexible_does_not_rematch_inserted_block() {
        // The inserted block contains the search line again; scanning must
        // resume after it.
        let content = "  a\n  b";
        let out = flexible_replace(content, " a ", "a\na").unwrap();
        assert_eq!(out.occurrences, 1);
        assert_eq!(out.new_content, "  a\n  a\n  b");
    }

    #[test]
    fn test_regex_tolerates_token_spacing() {
        let content = "    if (x==1){\n        go();\n    }\n";
        let old = "if ( x == 1 ) {";
        assert!(exact_replace(content, old, "").is_none());
        assert!(flexible_replace(content, old, "").is_none());

        let out = regex_replace(content, old, "if (x == 2) {").unwrap();
        assert_eq!(out.strategy, Strategy::Regex);
        assert_eq!(out.occurrences, 1);
        assert!(out.new_content.starts_with("    if (x == 2) {\n"));
    }

    #[test]
    fn test_regex_replacement_is_literal() {
        let out = regex_replace("value = 1\n", "value=1", "value = $1").unwrap();
        assert_eq!(out.new_content, "value = $1\n");
    }

    #[test]
    fn test_crlf_file_stays_crlf() {
        let snap = FileSnapshot::from_content("one\r\ntwo\r\nthree\r\n");
        let out = resolve(&snap, &req("two", "2", 1)).unwrap();
        assert_eq!(out.new_content, "one\r\n2\r\nthree\r\n");
    }

    #[test]
    fn test_crlf_survives_flexible_match() {
        let snap = FileSnapshot::from_content(
            "fn main() {\r\n        let x = 1;\r\n        let y = 2;\r\n}\r\n",
        );
        let out = resolve(&snap, &req("let x = 1;\r\n  let y = 2;", "let x = 10;\nlet y = 20;", 1))
            .unwrap();
        assert_eq!(out.strategy, Strategy::Flexible);
        assert_eq!(
            out.new_content,
            "fn main() {\r\n        let x = 10;\r\n        let y = 20;\r\n}\r\n"
        );
    }

    #[test]
    fn test_crlf_survives_regex_match() {
        let snap = FileSnapshot::from_content("    if (x==1){\r\n        go();\r\n    }\r\n");
        let out = resolve(&snap, &req("if ( x == 1 ) {", "if (x == 2) {", 1)).unwrap();
        assert_eq!(out.strategy, Strategy::Regex);
        assert_eq!(out.new_content, "    if (x == 2) {\r\n        go();\r\n    }\r\n");
    }

    #[test]
    fn test_crlf_without_trailing_newline_via_regex() {
        let snap = FileSnapshot::from_content("x\r\n    if (x==1){\r\n    }");
        let out = resolve(&snap, &req("if ( x == 1 ) {", "if (x == 2) {", 1)).unwrap();
        assert_eq!(out.strategy, Strategy::Regex);
        assert_eq!(out.new_content, "x\r\n    if (x == 2) {\r\n    }");
    }

    #[test]
    fn test_trailing_newline_choice_is_kept() {
        let snap = FileSnapshot::from_content("alpha\nbeta");
        let out = resolve(&snap, &req("beta", "gamma\n", 1)).unwrap();
        assert_eq!(out.new_content, "alpha\ngamma");
    }

    #[test]
    fn test_no_match_mentions_remediation() {
        let snap = FileSnapshot::from_content("nothing here");
        let err = resolve(&snap, &req("absent text", "x", 1)).unwrap_err();
        assert!(matches!(err, MutationError::NoMatchFound { .. }));
        assert!(err.to_string().contains("write_file"));
    }
}
