//! File-operation patch dialect.
//!
//! ```text
//! *** Begin Patch
//! *** Update File: src/app.js
//! *** Move to: src/main.js
//! @@
//!  context
//! -old
//! +new
//! *** Add File: notes.txt
//! +hello
//! *** Delete File: stale.txt
//! *** End Patch
//! ```

use super::{FileOp, friendly_header, move_header, normalize_friendly_path};
use crate::infra::io::{LineEnding, normalize_to_lf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FriendlyOp {
    Add {
        path: String,
        lines: Vec<String>,
    },
    Delete {
        path: String,
    },
    Update {
        path: String,
        move_to: Option<String>,
        blocks: Vec<Vec<String>>,
    },
}

impl FriendlyOp {
    pub fn path(&self) -> &str {
        match self {
            FriendlyOp::Add { path, .. }
            | FriendlyOp::Delete { path }
            | FriendlyOp::Update { path, .. } => path,
        }
    }
}

fn ends_body(trimmed: &str) -> bool {
    trimmed == "*** End Patch" || (trimmed.starts_with("***") && friendly_header(trimmed).is_some())
}

pub fn parse(text: &str) -> Vec<FriendlyOp> {
    let normalized = normalize_to_lf(text);
    let lines: Vec<&str> = normalized.split('\n').collect();
    let mut ops = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let trimmed = lines[i].trim();
        if trimmed == "*** End Patch" {
            break;
        }
        let Some((op, raw_path)) = friendly_header(trimmed) else {
            i += 1;
            continue;
        };
        let path = normalize_friendly_path(raw_path);
        i += 1;

        match op {
            FileOp::Delete => ops.push(FriendlyOp::Delete { path }),
            FileOp::Add => {
                let mut body = Vec::new();
                while i < lines.len() {
                    let t = lines[i].trim();
                    if ends_body(t) {
                        break;
                    }
                    i += 1;
                    if t == "*** End of File" {
                        break;
                    }
                    body.push(lines[i - 1].to_string());
                }
                ops.push(FriendlyOp::Add { path, lines: body });
            }
            FileOp::Update => {
                let mut move_to = None;
                if let Some(target) = lines.get(i).and_then(|l| move_header(l.trim())) {
                    let target = normalize_friendly_path(target);
                    if target != path {
                        move_to = Some(target);
                    }
                    i += 1;
                }

                let mut blocks: Vec<Vec<String>> = Vec::new();
                let mut current: Option<Vec<String>> = None;
                while i < lines.len() {
                    let line = lines[i];
                    let t = line.trim();
                    if ends_body(t) {
                        break;
                    }
                    i += 1;
                    if t == "*** End of File" {
                        break;
                    }
                    if line.starts_with("@@") {
                        blocks.extend(current.take().filter(|b| !b.is_empty()));
                        current = Some(Vec::new());
                        continue;
                    }
                    if let Some(block) = current.as_mut() {
                        block.push(line.to_string());
                    }
                }
                blocks.extend(current.take().filter(|b| !b.is_empty()));
                ops.push(FriendlyOp::Update {
                    path,
                    move_to,
                    blocks,
                });
            }
        }
    }

    ops
}

/// Content of an `Add File` body: `+` prefixes dropped, trailing blank
/// artifacts removed, newline-terminated.
pub fn add_file_content(lines: &[String]) -> String {
    let mut body: Vec<&str> = lines
        .iter()
        .map(|l| l.strip_prefix('+').unwrap_or(l.as_str()))
        .collect();
    while body.last().is_some_and(|l| l.is_empty()) {
        body.pop();
    }
    if body.is_empty() {
        return String::new();
    }
    let mut out = body.join("\n");
    out.push('\n');
    out
}

/// Old and new text of one `@@` block.
fn split_block(lines: &[String]) -> (String, String) {
    let mut old = Vec::new();
    let mut new = Vec::new();
    for line in lines.iter().filter(|l| !l.is_empty()) {
        if let Some(s) = line.strip_prefix('+') {
            new.push(s);
        } else if let Some(s) = line.strip_prefix('-') {
            old.push(s);
        } else if let Some(s) = line.strip_prefix(' ') {
            old.push(s);
            new.push(s);
        }
    }
    (old.join("\n"), new.join("\n"))
}

/// Find `block` at or after `from`, also trying it with/without a final
/// newline. Returns `(index, matched_len)`.
fn locate_block(content: &str, block: &str, from: usize) -> Option<(usize, usize)> {
    if block.is_empty() {
        return Some((from, 0));
    }
    let alt = match block.strip_suffix('\n') {
        Some(trimmed) => trimmed.to_string(),
        None => format!("{block}\n"),
    };
    let hay = content.get(from..)?;
    [block, alt.as_str()]
        .into_iter()
        .filter(|v| !v.is_empty())
        .find_map(|v| hay.find(v).map(|idx| (from + idx, v.len())))
}

/// Apply `@@` blocks in order; each search starts after the previous
/// replacement.
pub fn apply_blocks(content: &str, blocks: &[Vec<String>], label: &str) -> Result<String, String> {
    if blocks.is_empty() {
        return Ok(content.to_string());
    }
    let ending = LineEnding::detect(content);
    let mut text = normalize_to_lf(content);
    let mut cursor = 0;

    for block in blocks {
        let (old, new) = split_block(block);
        let (idx, len) = locate_block(&text, &old, cursor)
            .ok_or_else(|| format!("Failed to match patch hunk in {label}."))?;
        text.replace_range(idx..idx + len, &new);
        cursor = idx + new.len();
    }

    Ok(ending.apply(&text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_operations() {
        let text = "*** Begin Patch\n*** Update File: a/src/app.js\n*** Move to: src/main.js\n@@\n-old\n+new\n*** Add File: notes.txt\n+hello\n*** Delete File: ./stale.txt\n*** End Patch\n";
        let ops = parse(text);
        assert_eq!(ops.len(), 3);
        assert_eq!(
            ops[0],
            FriendlyOp::Update {
                path: "src/app.js".into(),
                move_to: Some("src/main.js".into()),
                blocks: vec![vec!["-old".into(), "+new".into()]],
            }
        );
        assert_eq!(ops[1].path(), "notes.txt");
        assert_eq!(ops[2], FriendlyOp::Delete { path: "stale.txt".into() });
    }

    #[test]
    fn test_add_file_content_is_newline_terminated() {
        let ops = parse("*** Add File: n.txt\n+a\n+b\n\n");
        let FriendlyOp::Add { lines, .. } = &ops[0] else {
            panic!("expected add");
        };
        assert_eq!(add_file_content(lines), "a\nb\n");
    }

    #[test]
    fn test_blocks_apply_sequentially() {
        let content = "x = 1\ny = 2\nx = 1\n";
        let blocks = vec![
            vec!["-x = 1".to_string(), "+x = 10".to_string()],
            vec!["-x = 1".to_string(), "+x = 11".to_string()],
        ];
        let out = apply_blocks(content, &blocks, "f").unwrap();
        assert_eq!(out, "x = 10\ny = 2\nx = 11\n");
    }

    #[test]
    fn test_blocks_keep_crlf() {
        let content = "a\r\nb\r\n";
        let blocks = vec![vec![" a".to_string(), "-b".to_string(), "+c".to_string()]];
        assert_eq!(apply_blocks(content, &blocks, "f").unwrap(), "a\r\nc\r\n");
    }

    #[test]
    fn test_unmatched_block_names_file() {
        let blocks = vec![vec!["-nope".to_string()]];
        let err = apply_blocks("yes\n", &blocks, "src/x.rs").unwrap_err();
        assert!(err.contains("src/x.rs"));
    }
}
