//! Filesystem operations
//!
//! Handles file and directory operations.

use globset::{GlobBuilder, GlobMatcher};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::FilesystemError;

/// Create a directory and all parent directories
pub fn create_dir_all(path: &Path) -> Result<(), FilesystemError> {
    std::fs::create_dir_all(path).map_err(|e| FilesystemError::CreateDir {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

/// Read content from a file
pub fn read_file(path: &Path) -> Result<String, FilesystemError> {
    std::fs::read_to_string(path).map_err(|e| FilesystemError::ReadFile {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

/// Write content to a file through a temporary sibling and a rename,
/// so readers see either the old or the new content
pub fn write_file_atomic(path: &Path, content: &str) -> Result<(), FilesystemError> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    std::fs::write(&tmp, content).map_err(|e| FilesystemError::WriteFile {
        path: tmp.clone(),
        error: e.to_string(),
    })?;
    std::fs::rename(&tmp, path).map_err(|e| FilesystemError::WriteFile {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

/// Remove a file, symlink or directory tree
///
/// Returns `Ok(false)` when nothing was there.
pub fn remove_path(path: &Path) -> std::io::Result<bool> {
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };

    let result = if metadata.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };

    match result {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Whether a path pattern contains glob wildcards
pub fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

/// Compile a glob over `/`-separated relative paths
///
/// `**` crosses directories, `*` and `?` do not.
fn compile_glob(pattern: &str) -> Result<GlobMatcher, FilesystemError> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map(|glob| glob.compile_matcher())
        .map_err(|e| FilesystemError::Pattern {
            pattern: pattern.to_string(),
            error: e.to_string(),
        })
}

/// Expand a path pattern against a root directory
///
/// Returns matching paths relative to `root`, sorted, with matches nested
/// inside another match dropped. A pattern without wildcards yields itself
/// when it exists. A directory that cannot be read fails the expansion.
pub fn expand_pattern(root: &Path, pattern: &str) -> Result<Vec<PathBuf>, FilesystemError> {
    let relative = pattern.trim_start_matches('/');

    if !is_glob(relative) {
        let path = PathBuf::from(relative);
        return Ok(if root.join(&path).exists() {
            vec![path]
        } else {
            Vec::new()
        });
    }

    // Walk only below the literal prefix of the pattern
    let literal: Vec<&str> = relative
        .split('/')
        .take_while(|part| !is_glob(part))
        .collect();
    let walk_root = root.join(literal.join("/"));
    if !walk_root.exists() {
        return Ok(Vec::new());
    }

    let matcher = compile_glob(relative)?;
    let mut matches = Vec::new();
    for entry in walkdir::WalkDir::new(&walk_root).min_depth(1) {
        let entry = entry.map_err(|e| FilesystemError::Walk {
            path: e.path().map_or_else(|| walk_root.clone(), Path::to_path_buf),
            error: e.to_string(),
        })?;
        let Ok(rel) = entry.path().strip_prefix(root) else {
            continue;
        };
        if matcher.is_match(rel) {
            matches.push(rel.to_path_buf());
        }
    }

    matches.sort();
    let mut kept: Vec<PathBuf> = Vec::with_capacity(matches.len());
    for path in matches {
        if !kept.iter().any(|parent| path.starts_with(parent)) {
            kept.push(path);
        }
    }
    Ok(kept)
}
