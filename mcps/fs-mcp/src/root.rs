//! Path resolution against the server root

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::types::{FsError, FsResult};

/// Environment variable naming the directory the server exposes
pub const ROOT_ENV: &str = "FS_MCP_ROOT";

/// The directory every tool call is confined to
#[derive(Debug, Clone)]
pub struct Root {
    base: PathBuf,
}

impl Root {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        let base = base.canonicalize().unwrap_or(base);
        Self { base }
    }

    /// `FS_MCP_ROOT`, falling back to the working directory
    pub fn from_env() -> Self {
        let base = std::env::var_os(ROOT_ENV)
            .map(PathBuf::from)
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));
        Self::new(base)
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Resolve a user-supplied path to a canonical path under the root
    pub fn resolve(&self, path: &str) -> FsResult<PathBuf> {
        if path.contains('\0') {
            return Err(FsError::InvalidPath("Path contains null byte".to_string()));
        }

        let requested = Path::new(path);
        let joined = if requested.is_absolute() {
            requested.to_path_buf()
        } else {
            self.base.join(requested)
        };

        // Symlinks and `..` are resolved before the containment check
        let canonical = joined.canonicalize().map_err(|e| match e.kind() {
            ErrorKind::NotFound => FsError::NotFound(path.to_string()),
            _ => FsError::InvalidPath(format!("{}: {}", path, e)),
        })?;

        if !canonical.starts_with(&self.base) {
            return Err(FsError::PathTraversal(path.to_string()));
        }
        Ok(canonical)
    }

    /// Display form of a resolved path, relative to the root
    pub fn relative(&self, canonical: &Path) -> String {
        match canonical.strip_prefix(&self.base) {
            Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
            Ok(rel) => rel.display().to_string(),
            Err(_) => canonical.display().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_resolves_inside_root() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/lib.rs"), "").unwrap();

        let root = Root::new(dir.path());
        let path = root.resolve("src/lib.rs").unwrap();
        assert_eq!(root.relative(&path), "src/lib.rs");
        assert_eq!(root.relative(&root.resolve(".").unwrap()), ".");
    }

    #[test]
    fn test_rejects_parent_escape() {
        let outer = tempdir().unwrap();
        let inner = outer.path().join("inner");
        std::fs::create_dir(&inner).unwrap();
        std::fs::write(outer.path().join("secret.txt"), "nope").unwrap();

        let root = Root::new(&inner);
        assert!(matches!(
            root.resolve("../secret.txt"),
            Err(FsError::PathTraversal(_))
        ));
        assert!(matches!(
            root.resolve(outer.path().join("secret.txt").to_str().unwrap()),
            Err(FsError::PathTraversal(_))
        ));
    }

    #[test]
    fn test_missing_and_invalid_paths() {
        let dir = tempdir().unwrap();
        let root = Root::new(dir.path());
        assert!(matches!(root.resolve("missing.txt"), Err(FsError::NotFound(_))));
        assert!(matches!(root.resolve("a\0b"), Err(FsError::InvalidPath(_))));
    }
}
