use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PathSecurityError {
    #[error("failed to resolve current directory: {0}")]
    CurrentDir(#[source] std::io::Error),
    #[error("path has no parent: {path}")]
    NoParent { path: PathBuf },
    #[error("path climbs above filesystem root: {path}")]
    ParentTraversal { path: PathBuf },
    #[error("Path is outside worktree: {requested}")]
    OutsideWorktree { requested: String },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PathSecurityError {
    /// Escapes are containment violations; everything else is a resolution failure.
    pub fn is_escape(&self) -> bool {
        matches!(
            self,
            PathSecurityError::OutsideWorktree { .. }
                | PathSecurityError::ParentTraversal { .. }
                | PathSecurityError::NoParent { .. }
        )
    }
}

/// Lexically resolves `.`/`..`, then canonicalizes the longest existing prefix
/// so symlinks cannot smuggle the path out of its root.
pub fn normalize_path(path: &Path) -> Result<PathBuf, PathSecurityError> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(PathSecurityError::CurrentDir)?
            .join(path)
    };

    let normalized = normalize_components(&absolute)?;
    let (existing_prefix, suffix) = split_existing_prefix(&normalized)?;
    let mut resolved = std::fs::canonicalize(existing_prefix)?;
    for component in suffix {
        resolved.push(component);
    }

    Ok(resolved)
}

/// Resolves `requested` against `worktree` and rejects anything that does not
/// land on or below the worktree root.
pub fn ensure_inside_worktree(requested: &str, worktree: &Path) -> Result<PathBuf, PathSecurityError> {
    let root = normalize_path(worktree)?;
    let requested_path = Path::new(requested);
    let candidate = if requested_path.is_absolute() {
        requested_path.to_path_buf()
    } else {
        root.join(requested_path)
    };

    let resolved = match normalize_path(&candidate) {
        Ok(resolved) => resolved,
        Err(PathSecurityError::ParentTraversal { .. }) => {
            return Err(PathSecurityError::OutsideWorktree {
                requested: requested.to_string(),
            });
        }
        Err(error) => return Err(error),
    };

    if resolved.starts_with(&root) {
        return Ok(resolved);
    }

    Err(PathSecurityError::OutsideWorktree {
        requested: requested.to_string(),
    })
}

/// Worktree-relative display path with `/` separators; the file name when the
/// path is the root itself.
pub fn to_workspace_path(absolute: &Path, worktree: &Path) -> String {
    let root = normalize_path(worktree).unwrap_or_else(|_| worktree.to_path_buf());
    let relative = absolute
        .strip_prefix(&root)
        .unwrap_or(absolute)
        .to_string_lossy()
        .replace('\\', "/");

    if !relative.is_empty() {
        return relative;
    }

    absolute
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| ".".to_string())
}

fn normalize_components(path: &Path) -> Result<PathBuf, PathSecurityError> {
    let mut normalized = PathBuf::new();

    for component in path.components() {
        match component {
            Component::Prefix(prefix) => normalized.push(prefix.as_os_str()),
            Component::RootDir => normalized.push(Path::new(std::path::MAIN_SEPARATOR_STR)),
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() || !normalized.has_root() {
                    return Err(PathSecurityError::ParentTraversal {
                        path: path.to_path_buf(),
                    });
                }
            }
            Component::Normal(part) => normalized.push(part),
        }
    }

    Ok(normalized)
}

fn split_existing_prefix(path: &Path) -> Result<(PathBuf, Vec<OsString>), PathSecurityError> {
    let mut current = path;
    let mut suffix: Vec<OsString> = Vec::new();

    loop {
        if current.exists() {
            suffix.reverse();
            return Ok((current.to_path_buf(), suffix));
        }
        let name = current
            .file_name()
            .ok_or_else(|| PathSecurityError::NoParent {
                path: current.to_path_buf(),
            })?;
        suffix.push(name.to_os_string());
        current = current.parent().ok_or_else(|| PathSecurityError::NoParent {
            path: current.to_path_buf(),
        })?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn normalize_path_handles_missing_leaf() {
        let temp = TempDir::new().expect("tempdir");
        let target = temp.path().join("alpha").join("beta").join("..").join("gamma");
        let normalized = normalize_path(&target).expect("normalize path");
        assert!(normalized.ends_with(Path::new("alpha/gamma")));
    }

    #[test]
    fn relative_path_resolves_inside_worktree() {
        let temp = TempDir::new().expect("tempdir");
        let resolved = ensure_inside_worktree("src/./main.rs", temp.path()).expect("inside");
        let root = normalize_path(temp.path()).expect("root");
        assert!(resolved.starts_with(&root));
        assert_eq!(to_workspace_path(&resolved, temp.path()), "src/main.rs");
    }

    #[test]
    fn dot_dot_escape_is_rejected() {
        let temp = TempDir::new().expect("tempdir");
        let error = ensure_inside_worktree("nested/../../secret.txt", temp.path())
            .expect_err("escape must fail");
        assert!(error.is_escape());
        assert!(error.to_string().contains("outside worktree"));
    }

    #[test]
    fn absolute_path_elsewhere_is_rejected() {
        let worktree = TempDir::new().expect("worktree");
        let outside = TempDir::new().expect("outside");
        let target = outside.path().join("file.txt");
        let error = ensure_inside_worktree(&target.to_string_lossy(), worktree.path())
            .expect_err("outside must fail");
        assert!(error.is_escape());
    }

    #[test]
    fn absolute_path_inside_is_accepted() {
        let worktree = TempDir::new().expect("worktree");
        let target = worktree.path().join("file.txt");
        let resolved = ensure_inside_worktree(&target.to_string_lossy(), worktree.path())
            .expect("inside");
        assert_eq!(to_workspace_path(&resolved, worktree.path()), "file.txt");
    }

    #[test]
    fn worktree_root_itself_is_contained() {
        let worktree = TempDir::new().expect("worktree");
        let resolved = ensure_inside_worktree(".", worktree.path()).expect("root");
        let expected = worktree
            .path()
            .canonicalize()
            .expect("canonical")
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .expect("name");
        assert_eq!(to_workspace_path(&resolved, worktree.path()), expected);
    }

    #[cfg(unix)]
    #[test]
    fn symlink_escape_is_rejected() {
        let worktree = TempDir::new().expect("worktree");
        let outside = TempDir::new().expect("outside");
        std::os::unix::fs::symlink(outside.path(), worktree.path().join("escape")).expect("symlink");

        let error = ensure_inside_worktree("escape/file.txt", worktree.path())
            .expect_err("symlink escape must fail");
        assert!(error.is_escape());
    }
}
