//! Point-in-time view of a path: existence, text content and a blake3
//! digest of the raw bytes. Snapshots are taken once before a mutation
//! is computed and again right before it is committed.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use anyhow::{Context, Result};

use crate::infra::io::looks_binary;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSnapshot {
    pub exists: bool,
    pub content: String,
    pub binary: bool,
    hash: String,
}

impl FileSnapshot {
    pub fn absent() -> Self {
        Self {
            exists: false,
            content: String::new(),
            binary: false,
            hash: "absent".to_string(),
        }
    }

    /// Build a snapshot from in-memory text, as if it had been read from disk.
    pub fn from_content(content: impl Into<String>) -> Self {
        let content = content.into();
        let hash = hash_bytes(content.as_bytes());
        Self {
            exists: true,
            content,
            binary: false,
            hash,
        }
    }

    /// Read `path`. A missing path is not an error.
    pub fn capture(path: &Path) -> Result<Self> {
        let bytes = match fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::absent()),
            Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
        };

        let binary = looks_binary(&bytes);
        let hash = hash_bytes(&bytes);
        let content = if binary {
            String::new()
        } else {
            String::from_utf8_lossy(&bytes).into_owned()
        };

        Ok(Self {
            exists: true,
            content,
            binary,
            hash,
        })
    }

    /// Fingerprint a directory tree. `content` is a sorted manifest of
    /// `relative/path<TAB>hash` lines, so two captures compare equal only
    /// when no entry was added, removed or modified.
    pub fn capture_tree(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Self::capture(dir);
        }
        let mut entries = Vec::new();
        collect_tree(dir, dir, &mut entries)?;
        entries.sort();
        let mut snap = Self::from_content(entries.join("\n"));
        snap.hash = format!("tree:{}", snap.hash);
        Ok(snap)
    }

    /// `"blake3:<hex>"` for existing files, `"absent"` otherwise.
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// True when both snapshots describe the same on-disk state.
    pub fn same_state(&self, other: &FileSnapshot) -> bool {
        self.exists == other.exists && self.hash == other.hash
    }
}

pub fn hash_bytes(bytes: &[u8]) -> String {
    format!("blake3:{}", blake3::hash(bytes).to_hex())
}

fn collect_tree(root: &Path, dir: &Path, out: &mut Vec<String>) -> Result<()> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("Failed to list {}", dir.display()))?;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let rel = path
            .strip_prefix(root)
            .unwrap_or(&path)
            .to_string_lossy()
            .replace('\\', "/");
        let kind = entry.file_type()?;
        if kind.is_dir() {
            out.push(format!("{rel}/\tdir"));
            collect_tree(root, &path, out)?;
        } else if kind.is_symlink() {
            let target = fs::read_link(&path).unwrap_or_default();
            out.push(format!("{rel}\tlink:{}", target.display()));
        } else {
            let bytes =
                fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;
            out.push(format!("{rel}\t{}", hash_bytes(&bytes)));
        }
    }
    Ok(())
}
