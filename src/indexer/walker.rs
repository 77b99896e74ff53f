//! Vault traversal.
//!
//! Depth-first walk from the vault root, skipping the configured directory
//! set and anything private. Only markdown files are yielded, with
//! forward-slash normalized vault-relative paths.

use anyhow::Result;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

use crate::config::PRIVATE_PREFIX;

/// A markdown file discovered during a walk.
#[derive(Debug, Clone)]
pub struct WalkedFile {
    pub abs_path: PathBuf,
    /// Vault-relative, forward-slash normalized.
    pub rel_path: String,
    /// Seconds since epoch.
    pub modified: f64,
}

/// Walk the vault and return every indexable markdown file, sorted by
/// relative path for deterministic ordering.
pub fn walk_vault(root: &Path, skip_dirs: &HashSet<String>) -> Result<Vec<WalkedFile>> {
    let canonical_root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    let mut files = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_entry(|entry| {
            if entry.file_type().is_dir() && entry.depth() > 0 {
                let name = entry.file_name().to_string_lossy();
                return !skip_dirs.contains(name.as_ref());
            }
            true
        });

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                tracing::warn!(error = %err, "walk error, skipping entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if !is_markdown(path) {
            continue;
        }

        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_path = relative.to_string_lossy().replace('\\', "/");

        // Reject private components anywhere in the path, even nested, and
        // regardless of case.
        if has_private_component(&rel_path) {
            continue;
        }

        // A symlinked file whose real location is outside the vault is
        // never indexed.
        if let Ok(real) = path.canonicalize() {
            if !real.starts_with(&canonical_root) {
                tracing::warn!(path = %rel_path, "symlink escapes vault, skipping");
                continue;
            }
        }

        let modified = entry
            .metadata()
            .ok()
            .and_then(|m| m.modified().ok())
            .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);

        files.push(WalkedFile {
            abs_path: path.to_path_buf(),
            rel_path,
            modified,
        });
    }

    files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    Ok(files)
}

fn is_markdown(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some(ext) if ext.eq_ignore_ascii_case("md") || ext.eq_ignore_ascii_case("markdown")
    )
}

/// True if any path component starts with the private prefix,
/// case-insensitively.
pub fn has_private_component(rel_path: &str) -> bool {
    let upper_prefix = PRIVATE_PREFIX.to_uppercase();
    rel_path
        .split(['/', '\\'])
        .any(|component| component.to_uppercase().starts_with(&upper_prefix))
}
