//! Path validation — confining model-supplied paths to the project root.
//!
//! File tools receive relative paths from the model. Every one of them is
//! resolved here before touching the filesystem, so no tool can read, write
//! or delete outside the active project root.

use std::path::{Component, Path, PathBuf};

/// Error returned when path validation fails.
#[derive(Debug, thiserror::Error)]
pub enum PathValidationError {
    #[error("Path '{path}' must be relative to the project root")]
    Absolute { path: String },

    #[error("Path traversal detected in '{path}'")]
    PathTraversal { path: String },

    #[error("Path '{path}' resolves outside the project root")]
    OutsideRoot { path: String },

    #[error("Failed to canonicalize path '{path}': {reason}")]
    CanonicalizeFailed { path: String, reason: String },
}

/// Resolve `relative` against `root`, refusing anything that would escape it.
///
/// Checks:
/// 1. The path is relative (no root, no drive prefix)
/// 2. `..` components never climb above the root
/// 3. The deepest existing ancestor, with symlinks resolved, is still
///    inside the canonical root
///
/// The target itself need not exist (writes create it). Returns the
/// canonical root joined with the normalized relative path.
pub fn resolve_within(root: &Path, relative: &str) -> Result<PathBuf, PathValidationError> {
    let mut normalized = PathBuf::new();
    let mut depth = 0usize;

    for component in Path::new(relative).components() {
        match component {
            Component::Prefix(_) | Component::RootDir => {
                return Err(PathValidationError::Absolute { path: relative.into() });
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return Err(PathValidationError::PathTraversal { path: relative.into() });
                }
                normalized.pop();
                depth -= 1;
            }
            Component::Normal(part) => {
                normalized.push(part);
                depth += 1;
            }
        }
    }

    let canonical_root = root
        .canonicalize()
        .map_err(|e| PathValidationError::CanonicalizeFailed {
            path: root.display().to_string(),
            reason: e.to_string(),
        })?;
    let target = canonical_root.join(&normalized);

    // A symlink inside the root may still point elsewhere
    let existing = target
        .ancestors()
        .find(|p| p.exists())
        .unwrap_or(canonical_root.as_path());
    let resolved = existing
        .canonicalize()
        .map_err(|e| PathValidationError::CanonicalizeFailed {
            path: relative.into(),
            reason: e.to_string(),
        })?;
    if !resolved.starts_with(&canonical_root) {
        return Err(PathValidationError::OutsideRoot { path: relative.into() });
    }

    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_relative_path_resolves() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let resolved = resolve_within(dir.path(), "src/app/app.component.ts").unwrap();
        assert_eq!(resolved, root.join("src/app/app.component.ts"));
    }

    #[test]
    fn dot_resolves_to_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        assert_eq!(resolve_within(dir.path(), ".").unwrap(), root);
        assert_eq!(resolve_within(dir.path(), "").unwrap(), root);
    }

    #[test]
    fn inner_parent_components_are_fine() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let resolved = resolve_within(dir.path(), "src/../README.md").unwrap();
        assert_eq!(resolved, root.join("README.md"));
    }

    #[test]
    fn path_traversal_blocked() {
        let dir = tempfile::tempdir().unwrap();
        match resolve_within(dir.path(), "../../../etc/passwd").unwrap_err() {
            PathValidationError::PathTraversal { .. } => {}
            other => panic!("Expected PathTraversal, got: {other}"),
        }
        assert!(resolve_within(dir.path(), "src/../../secret").is_err());
    }

    #[test]
    fn absolute_path_blocked() {
        let dir = tempfile::tempdir().unwrap();
        match resolve_within(dir.path(), "/etc/passwd").unwrap_err() {
            PathValidationError::Absolute { .. } => {}
            other => panic!("Expected Absolute, got: {other}"),
        }
    }

    #[test]
    fn missing_root_fails() {
        let result = resolve_within(Path::new("/nonexistent/devloop/root"), "a.txt");
        assert!(matches!(result, Err(PathValidationError::CanonicalizeFailed { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_escape_blocked() {
        let outside = tempfile::tempdir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("escape")).unwrap();
        match resolve_within(dir.path(), "escape/file.txt").unwrap_err() {
            PathValidationError::OutsideRoot { .. } => {}
            other => panic!("Expected OutsideRoot, got: {other}"),
        }
    }
}
