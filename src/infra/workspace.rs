//! Workspace confinement: every tool path resolves inside one root.

use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};

use crate::core::error::MutationError;

#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Canonicalize `root`; it must exist.
    pub fn new(root: &Path) -> Result<Self> {
        let root = dunce::canonicalize(root)
            .with_context(|| format!("Workspace root not found: {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn contains(&self, p: &Path) -> bool {
        lexical_normalize(p).starts_with(&self.root)
    }

    /// Resolve a tool-supplied path against the root.
    pub fn resolve(&self, raw: &str) -> Result<PathBuf, MutationError> {
        self.resolve_from(&self.root, raw)
    }

    /// Resolve `raw` relative to `base` (which falls back to the root when
    /// it is outside). Absolute paths outside the root are re-rooted once
    /// by dropping leading separators.
    pub fn resolve_from(&self, base: &Path, raw: &str) -> Result<PathBuf, MutationError> {
        let base = if self.contains(base) { base } else { self.root.as_path() };
        let input = raw.trim();
        if input.is_empty() || input == "." {
            return Ok(lexical_normalize(base));
        }

        let outside = || MutationError::OutsideWorkspace {
            path: format!(
                "{raw} (workspace root: {}); use paths inside this root",
                self.root.display()
            ),
        };

        let candidate = Path::new(input);
        if candidate.is_absolute() {
            let abs = lexical_normalize(candidate);
            if abs.starts_with(&self.root) {
                return Ok(abs);
            }
            let rerooted = lexical_normalize(&self.root.join(input.trim_start_matches(['/', '\\'])));
            if rerooted.starts_with(&self.root) {
                return Ok(rerooted);
            }
            return Err(outside());
        }

        let joined = lexical_normalize(&base.join(candidate));
        if joined.starts_with(&self.root) {
            Ok(joined)
        } else {
            Err(outside())
        }
    }

    /// Root-relative label with `/` separators; `.` for the root itself.
    pub fn label(&self, p: &Path) -> String {
        let normalized = lexical_normalize(p);
        match normalized.strip_prefix(&self.root) {
            Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
            Ok(rel) => rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/"),
            Err(_) => normalized.to_string_lossy().replace('\\', "/"),
        }
    }
}

/// Resolve `.` and `..` without touching the filesystem.
pub fn lexical_normalize(p: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in p.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_relative_paths_stay_inside() {
        let tmp = TempDir::new().unwrap();
        let ws = Workspace::new(tmp.path()).unwrap();

        let p = ws.resolve("src/./lib.rs").unwrap();
        assert_eq!(ws.label(&p), "src/lib.rs");
        assert_eq!(ws.label(&ws.resolve(".").unwrap()), ".");

        let err = ws.resolve("../escape.txt").unwrap_err();
        assert!(matches!(err, MutationError::OutsideWorkspace { .. }));
    }

    #[test]
    fn test_absolute_outside_is_rerooted() {
        let tmp = TempDir::new().unwrap();
        let ws = Workspace::new(tmp.path()).unwrap();
        let p = ws.resolve("/etc/hosts").unwrap();
        assert_eq!(ws.label(&p), "etc/hosts");
        assert!(ws.contains(&p));
    }

    #[test]
    fn test_base_outside_falls_back_to_root() {
        let tmp = TempDir::new().unwrap();
        let ws = Workspace::new(tmp.path()).unwrap();
        let p = ws.resolve_from(Path::new("/definitely/elsewhere"), "a.txt").unwrap();
        assert_eq!(ws.label(&p), "a.txt");
    }
}
