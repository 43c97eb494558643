//! Workspace root resolution and path containment.
//!
//! Every user-supplied path is cleaned lexically and must resolve inside the
//! workspace root. Containment is the only sandbox the dev tools provide.

use std::path::{Component, Path, PathBuf};

use crate::error::{CelesteError, Result};

/// Lexically normalize a path: fold `.`, apply `..` without touching the
/// filesystem.
pub fn clean_path(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !cleaned.pop() {
                    cleaned.push(Component::ParentDir);
                }
            }
            other => cleaned.push(other),
        }
    }
    cleaned
}

/// Resolve and validate a workspace root: absolute, existing directory.
/// `None` falls back to the current directory.
pub fn normalize_workspace(workspace: Option<&Path>) -> Result<PathBuf> {
    let base = match workspace {
        Some(path) if !path.as_os_str().is_empty() => {
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                std::env::current_dir()?.join(path)
            }
        }
        _ => std::env::current_dir()?,
    };
    let cleaned = clean_path(&base);
    let meta = std::fs::metadata(&cleaned).map_err(|err| {
        CelesteError::InvalidInput(format!("workspace {}: {err}", cleaned.display()))
    })?;
    if !meta.is_dir() {
        return Err(CelesteError::InvalidInput(format!(
            "workspace is not a directory: {}",
            cleaned.display()
        )));
    }
    Ok(cleaned)
}

/// Resolve a user-supplied path against the workspace and enforce
/// containment. Relative paths join the workspace; absolute paths must
/// already live inside it.
pub fn resolve_workspace_path(workspace: &Path, input: &str) -> Result<PathBuf> {
    let workspace = clean_path(workspace);
    let input = if input.is_empty() { "." } else { input };

    let raw = Path::new(input);
    let candidate = if raw.is_absolute() {
        clean_path(raw)
    } else {
        clean_path(&workspace.join(raw))
    };

    if candidate.strip_prefix(&workspace).is_err() {
        return Err(CelesteError::PathEscape(input.to_string()));
    }
    Ok(candidate)
}
