use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use memchr::{memchr, memchr_iter};
use serde::Serialize;
use serde_json::Value;

/// Number of leading bytes inspected when sniffing for binary content.
pub const BINARY_SNIFF_LEN: usize = 512;

/// A null byte near the start of the file marks it as binary.
pub fn looks_binary(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(BINARY_SNIFF_LEN)];
    memchr(0, head).is_some()
}

/// Line terminator convention of a text file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEnding {
    Lf,
    Crlf,
}

impl LineEnding {
    /// Any CRLF pair makes the file CRLF.
    pub fn detect(content: &str) -> Self {
        if memchr::memmem::find(content.as_bytes(), b"\r\n").is_some() {
            LineEnding::Crlf
        } else {
            LineEnding::Lf
        }
    }

    /// Re-apply this convention to LF-only text.
    pub fn apply(self, lf_text: &str) -> String {
        match self {
            LineEnding::Lf => lf_text.to_string(),
            LineEnding::Crlf => lf_text.replace('\n', "\r\n"),
        }
    }
}

pub fn normalize_to_lf(s: &str) -> String {
    s.replace("\r\n", "\n")
}

/// Match the trailing-newline choice of `original` in `modified`.
pub fn restore_trailing_newline(original: &str, modified: String) -> String {
    let had = original.ends_with('\n');
    if had && !modified.ends_with('\n') {
        let mut out = modified;
        out.push('\n');
        return out;
    }
    if !had && modified.ends_with('\n') {
        let mut out = modified;
        out.pop();
        return out;
    }
    modified
}

/// Atomic write with robust temp file strategy
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;

    // Preserve original permissions
    #[cfg(unix)]
    let perms = fs::metadata(path)
        .map(|m| m.permissions())
        .unwrap_or_else(|_| std::os::unix::fs::PermissionsExt::from_mode(0o644));
    #[cfg(not(unix))]
    let perms = fs::metadata(path).map(|m| m.permissions()).ok();

    let tmp = match tempfile::NamedTempFile::new_in(dir) {
        Ok(t) => t,
        Err(_) => tempfile::NamedTempFile::new()?,
    };

    let mut file = tmp.as_file();
    file.write_all(data)?;
    file.sync_all()?;

    #[cfg(unix)]
    fs::set_permissions(tmp.path(), perms).context("set temp permissions")?;
    #[cfg(not(unix))]
    if let Some(perms) = perms {
        fs::set_permissions(tmp.path(), perms).context("set temp permissions")?;
    }

    match tmp.persist(path) {
        Ok(_) => {}
        Err(e) => {
            // Different filesystem? Try copy fallback
            fs::copy(e.file.path(), path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
    }

    let _ = sync_dir(dir);
    Ok(())
}

/// Cross-platform directory fsync helper.
#[cfg(unix)]
pub fn sync_dir(p: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::OpenOptionsExt;
    let f = OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_DIRECTORY)
        .open(p)?;
    f.sync_all()
}

#[cfg(windows)]
pub fn sync_dir(_p: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Append one JSON record as a line, holding an advisory lock so lines
/// from cooperating processes never interleave.
pub fn append_jsonl<T: Serialize>(path: &Path, record: &T) -> Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
    }

    let mut line = serde_json::to_string(record).context("Failed to serialize record")?;
    line.push('\n');

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let mut lock = fd_lock::RwLock::new(file);
    let mut guard = lock
        .write()
        .with_context(|| format!("Failed to lock {}", path.display()))?;
    guard
        .write_all(line.as_bytes())
        .with_context(|| format!("Failed to append to {}", path.display()))?;
    guard.flush()?;
    Ok(())
}

/// Read every well-formed JSON line; a missing file reads as empty and
/// malformed lines (bad UTF-8, a half-written tail) are skipped.
pub fn read_jsonl(path: &Path) -> Result<Vec<Value>> {
    let raw = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read {}", path.display()));
        }
    };

    let mut records = Vec::new();
    let mut start = 0;
    for end in memchr_iter(b'\n', &raw).chain(std::iter::once(raw.len())) {
        let line = &raw[start..end];
        start = end + 1;
        let Ok(text) = std::str::from_utf8(line) else {
            continue;
        };
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        if let Ok(value) = serde_json::from_str::<Value>(text) {
            records.push(value);
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_looks_binary_only_checks_head() {
        assert!(looks_binary(b"abc\0def"));
        assert!(!looks_binary(b"plain text\n"));

        let mut late = vec![b'a'; BINARY_SNIFF_LEN];
        late.push(0);
        assert!(!looks_binary(&late));
    }

    #[test]
    fn test_line_ending_roundtrip() {
        let crlf = "a\r\nb\r\n";
        let le = LineEnding::detect(crlf);
        assert_eq!(le, LineEnding::Crlf);
        assert_eq!(le.apply(&normalize_to_lf(crlf)), crlf);
        assert_eq!(LineEnding::detect("a\nb"), LineEnding::Lf);
    }

    #[test]
    fn test_restore_trailing_newline() {
        assert_eq!(restore_trailing_newline("x\n", "y".into()), "y\n");
        assert_eq!(restore_trailing_newline("x", "y\n".into()), "y");
        assert_eq!(restore_trailing_newline("x\n", "y\n".into()), "y\n");
    }

    #[test]
    fn test_write_atomic_creates_parents() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("nested/dir/file.txt");
        write_atomic(&target, b"hello").unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "hello");

        write_atomic(&target, b"again").unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "again");
    }

    #[test]
    fn test_jsonl_skips_malformed_lines() {
        let tmp = TempDir::new().unwrap();
        let log = tmp.path().join("log.jsonl");
        append_jsonl(&log, &serde_json::json!({"n": 1})).unwrap();
        fs::OpenOptions::new()
            .append(true)
            .open(&log)
            .unwrap()
            .write_all(b"{not json\n")
            .unwrap();
        append_jsonl(&log, &serde_json::json!({"n": 2})).unwrap();

        let rows = read_jsonl(&log).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["n"], 2);
    }

    #[test]
    fn test_jsonl_skips_invalid_utf8_lines() {
        let tmp = TempDir::new().unwrap();
        let log = tmp.path().join("log.jsonl");
        fs::write(&log, b"{\"n\": \"\xff\"}\n").unwrap();
        append_jsonl(&log, &serde_json::json!({"n": 2})).unwrap();

        let rows = read_jsonl(&log).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["n"], 2);
    }

    #[test]
    fn test_read_jsonl_missing_is_empty() {
        let tmp = TempDir::new().unwrap();
        assert!(read_jsonl(&tmp.path().join("nope.jsonl")).unwrap().is_empty());
    }
}
