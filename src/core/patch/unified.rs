//! In-memory unified diff application.
//!
//! Hunks are located at their stated line first, then anywhere after the
//! previous hunk, then ignoring whitespace, and finally with up to
//! `MAX_FUZZ` context lines dropped from either edge.

use super::normalize_patch_path;
use crate::infra::io::{LineEnding, normalize_to_lf};

/// Most context lines trimmed from each edge of a hunk while searching.
pub const MAX_FUZZ: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HunkHeader {
    pub old_start: usize,
    pub old_len: usize,
    pub new_start: usize,
    pub new_len: usize,
}

/// Parse `@@ -a[,b] +c[,d] @@...`.
pub fn parse_hunk_header(line: &str) -> Option<HunkHeader> {
    let rest = line.strip_prefix("@@")?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let rest = rest.trim_start().strip_prefix('-')?;
    let (old_start, old_len, rest) = range(rest)?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let rest = rest.trim_start().strip_prefix('+')?;
    let (new_start, new_len, rest) = range(rest)?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    rest.trim_start().starts_with("@@").then_some(HunkHeader {
        old_start,
        old_len,
        new_start,
        new_len,
    })
}

/// `start[,len]` followed by the remaining text.
fn range(s: &str) -> Option<(usize, usize, &str)> {
    let digits = |s: &str| s.bytes().take_while(u8::is_ascii_digit).count();

    let n = digits(s);
    if n == 0 {
        return None;
    }
    let start = s[..n].parse().ok()?;
    let rest = &s[n..];

    match rest.strip_prefix(',') {
        Some(tail) => {
            let m = digits(tail);
            if m == 0 {
                return None;
            }
            Some((start, tail[..m].parse().ok()?, &tail[m..]))
        }
        None => Some((start, 1, rest)),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HunkLine {
    Context(String),
    Remove(String),
    Add(String),
}

#[derive(Debug, Clone, Default)]
pub struct Hunk {
    pub header: Option<HunkHeader>,
    pub lines: Vec<HunkLine>,
    /// `\ No newline at end of file` followed the last old-side line.
    pub old_no_eol: bool,
    /// `\ No newline at end of file` followed the last new-side line.
    pub new_no_eol: bool,
}

impl Hunk {
    fn old_lines(&self) -> Vec<&str> {
        self.lines
            .iter()
            .filter_map(|l| match l {
                HunkLine::Context(s) | HunkLine::Remove(s) => Some(s.as_str()),
                HunkLine::Add(_) => None,
            })
            .collect()
    }

    fn leading_context(&self) -> usize {
        self.lines.iter().take_while(|l| matches!(l, HunkLine::Context(_))).count()
    }

    fn trailing_context(&self) -> usize {
        self.lines.iter().rev().take_while(|l| matches!(l, HunkLine::Context(_))).count()
    }
}

/// One file section of a unified diff. `None` paths are `/dev/null`.
#[derive(Debug, Clone, Default)]
pub struct FilePatch {
    pub old_path: Option<String>,
    pub new_path: Option<String>,
    pub hunks: Vec<Hunk>,
}

impl FilePatch {
    pub fn is_create(&self) -> bool {
        self.old_path.is_none() && self.new_path.is_some()
    }

    pub fn is_delete(&self) -> bool {
        self.new_path.is_none() && self.old_path.is_some()
    }

    /// Path the hunks are read from.
    pub fn source(&self) -> Option<&str> {
        self.old_path.as_deref().or(self.new_path.as_deref())
    }
}

fn header_path(raw: &str) -> Option<String> {
    let p = normalize_patch_path(raw);
    (!p.is_empty()).then_some(p)
}

/// Split a unified diff into file sections.
///
/// Hunk bodies run until the next header line rather than trusting the
/// line counts, which hand-written patches often get wrong.
pub fn parse(text: &str) -> Result<Vec<FilePatch>, String> {
    let lines: Vec<&str> = text.split('\n').map(|l| l.trim_end_matches('\r')).collect();
    let mut files: Vec<FilePatch> = Vec::new();
    let mut current: Option<FilePatch> = None;
    let mut hunk: Option<Hunk> = None;
    let mut i = 0;

    let close_hunk = |file: &mut Option<FilePatch>, hunk: &mut Option<Hunk>| {
        if let (Some(f), Some(mut h)) = (file.as_mut(), hunk.take()) {
            while matches!(h.lines.last(), Some(HunkLine::Context(s)) if s.is_empty()) {
                h.lines.pop();
            }
            if !h.lines.is_empty() {
                f.hunks.push(h);
            }
        }
    };

    while i < lines.len() {
        let line = lines[i];
        let next = lines.get(i + 1).copied().unwrap_or("");

        if line.starts_with("diff --git ") {
            close_hunk(&mut current, &mut hunk);
            files.extend(current.take());
            i += 1;
            continue;
        }

        if let (Some(old), Some(new)) = (line.strip_prefix("--- "), next.strip_prefix("+++ ")) {
            close_hunk(&mut current, &mut hunk);
            files.extend(current.take());
            current = Some(FilePatch {
                old_path: header_path(old),
                new_path: header_path(new),
                hunks: Vec::new(),
            });
            i += 2;
            continue;
        }

        if line.starts_with("@@") {
            close_hunk(&mut current, &mut hunk);
            if current.is_none() {
                return Err(format!("hunk without file header at line {}", i + 1));
            }
            hunk = Some(Hunk {
                header: parse_hunk_header(line),
                ..Hunk::default()
            });
            i += 1;
            continue;
        }

        if let Some(h) = hunk.as_mut() {
            if line.starts_with('\\') {
                match h.lines.last() {
                    Some(HunkLine::Remove(_)) => h.old_no_eol = true,
                    Some(HunkLine::Add(_)) => h.new_no_eol = true,
                    Some(HunkLine::Context(_)) => {
                        h.old_no_eol = true;
                        h.new_no_eol = true;
                    }
                    None => {}
                }
            } else if let Some(s) = line.strip_prefix('+') {
                h.lines.push(HunkLine::Add(s.to_string()));
            } else if let Some(s) = line.strip_prefix('-') {
                h.lines.push(HunkLine::Remove(s.to_string()));
            } else if let Some(s) = line.strip_prefix(' ') {
                h.lines.push(HunkLine::Context(s.to_string()));
            } else if line.is_empty() {
                // Context lines whose single space was stripped.
                h.lines.push(HunkLine::Context(String::new()));
            } else {
                close_hunk(&mut current, &mut hunk);
            }
        }
        i += 1;
    }

    close_hunk(&mut current, &mut hunk);
    files.extend(current.take());

    if files.is_empty() {
        return Err("no file sections found in patch".into());
    }
    Ok(files)
}

fn ws_eq(a: &str, b: &str) -> bool {
    a.split_whitespace().eq(b.split_whitespace())
}

fn matches_at(haystack: &[String], at: usize, needle: &[&str], loose: bool) -> bool {
    if at + needle.len() > haystack.len() {
        return false;
    }
    haystack[at..at + needle.len()]
        .iter()
        .zip(needle)
        .all(|(h, n)| if loose { ws_eq(h, n) } else { h.as_str() == *n })
}

/// Position of `needle` at or after `min`, nearest to `expected`.
fn locate(haystack: &[String], needle: &[&str], expected: usize, min: usize, loose: bool) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    let last = haystack.len() - needle.len();
    if min > last {
        return None;
    }
    let expected = expected.clamp(min, last);
    if matches_at(haystack, expected, needle, loose) {
        return Some(expected);
    }
    let span = (expected - min).max(last - expected);
    (1..=span).find_map(|d| {
        let before = expected.checked_sub(d).filter(|p| *p >= min);
        let after = Some(expected + d).filter(|p| *p <= last);
        [before, after]
            .into_iter()
            .flatten()
            .find(|p| matches_at(haystack, *p, needle, loose))
    })
}

/// Apply `hunks` to `original` (`None` when the file does not exist yet).
///
/// The result keeps the original line-ending convention.
pub fn apply_hunks(original: Option<&str>, hunks: &[Hunk]) -> Result<String, String> {
    let raw = original.unwrap_or("");
    let ending = LineEnding::detect(raw);
    let text = normalize_to_lf(raw);
    let mut trailing_newline = original.is_none() || text.is_empty() || text.ends_with('\n');

    let body = text.strip_suffix('\n').unwrap_or(&text);
    let mut lines: Vec<String> = if text.is_empty() {
        Vec::new()
    } else {
        body.split('\n').map(str::to_string).collect()
    };

    let mut offset: isize = 0;
    let mut min = 0usize;

    for (n, hunk) in hunks.iter().enumerate() {
        let old = hunk.old_lines();
        let stated = hunk.header.map_or(0, |h| {
            if h.old_len == 0 { h.old_start } else { h.old_start.saturating_sub(1) }
        });
        let expected = (stated as isize + offset).max(0) as usize;

        let (pos, cut_lead, cut_trail) = if old.is_empty() {
            (expected.clamp(min, lines.len()), 0, 0)
        } else {
            find_hunk(&lines, hunk, &old, expected, min).ok_or_else(|| {
                format!(
                    "Hunk #{} FAILED at {}: context does not match the current file",
                    n + 1,
                    stated + 1
                )
            })?
        };

        // Context lines keep the file's own text; only +/- lines come
        // from the patch.
        let mut cursor = pos;
        let mut block: Vec<String> = Vec::new();
        for line in &hunk.lines[cut_lead..hunk.lines.len() - cut_trail] {
            match line {
                HunkLine::Context(_) => {
                    block.push(lines[cursor].clone());
                    cursor += 1;
                }
                HunkLine::Remove(_) => cursor += 1,
                HunkLine::Add(s) => block.push(s.clone()),
            }
        }

        let replaced = cursor - pos;
        let inserted = block.len();
        lines.splice(pos..cursor, block);
        offset += inserted as isize - replaced as isize + (pos as isize - expected as isize);
        min = pos + inserted;

        if hunk.new_no_eol {
            trailing_newline = false;
        } else if hunk.old_no_eol {
            trailing_newline = true;
        }
    }

    let mut out = lines.join("\n");
    if trailing_newline && !lines.is_empty() {
        out.push('\n');
    }
    Ok(ending.apply(&out))
}

/// Locate a hunk with increasing tolerance. Returns the match position
/// and how many context lines were dropped from each edge.
fn find_hunk(
    lines: &[String],
    hunk: &Hunk,
    old: &[&str],
    expected: usize,
    min: usize,
) -> Option<(usize, usize, usize)> {
    for loose in [false, true] {
        if let Some(pos) = locate(lines, old, expected, min, loose) {
            return Some((pos, 0, 0));
        }
    }

    let lead = hunk.leading_context();
    let trail = hunk.trailing_context();
    for fuzz in 1..=MAX_FUZZ {
        let cut_lead = fuzz.min(lead);
        let cut_trail = fuzz.min(trail);
        if cut_lead + cut_trail == 0 || cut_lead + cut_trail >= old.len() {
            break;
        }
        let old_cut = &old[cut_lead..old.len() - cut_trail];
        for loose in [false, true] {
            if let Some(pos) = locate(lines, old_cut, expected + cut_lead, min, loose) {
                return Some((pos, cut_lead, cut_trail));
            }
        }
    }
    None
}
