//! Path perimeter for tool arguments.
//!
//! Every path argument must stay a vault-relative reference to a real file
//! inside the vault. Traversal, absolute prefixes, drive letters, private
//! components, and symlink escapes are all rejected — and except for
//! outright malformed input, rejection looks exactly like absence.

use std::path::{Path, PathBuf};

use super::protocol::ToolError;
use crate::indexer::walker::has_private_component;

/// Validate a vault-relative path argument and resolve it to an absolute
/// path inside the vault.
///
/// Returns `invalid_argument` for malformed input (empty, null bytes) and
/// `not_found` for everything that must stay invisible: traversal,
/// absolute prefixes, drive letters, private paths, symlink escapes, and
/// genuinely missing files.
pub fn safe_vault_path(vault_root: &Path, raw: &str) -> Result<PathBuf, ToolError> {
    if raw.is_empty() {
        return Err(ToolError::invalid_argument("path must not be empty"));
    }
    if raw.contains('\0') {
        return Err(ToolError::invalid_argument("path contains null byte"));
    }

    // Traversal, absolute prefixes, and drive letters are checked on both
    // separator conventions regardless of host OS.
    let normalized = raw.replace('\\', "/");
    if normalized.split('/').any(|segment| segment == "..") {
        return Err(ToolError::not_found(format!("note not found: {raw}")));
    }
    if normalized.starts_with('/') {
        return Err(ToolError::not_found(format!("note not found: {raw}")));
    }
    if has_drive_letter(&normalized) {
        return Err(ToolError::not_found(format!("note not found: {raw}")));
    }

    // Private paths are reported as missing, never as forbidden.
    if has_private_component(&normalized) {
        return Err(ToolError::not_found(format!("note not found: {raw}")));
    }

    let candidate = vault_root.join(&normalized);
    let canonical_root = vault_root
        .canonicalize()
        .map_err(|_| ToolError::not_found(format!("note not found: {raw}")))?;
    let real = candidate
        .canonicalize()
        .map_err(|_| ToolError::not_found(format!("note not found: {raw}")))?;

    // The real path after symlink resolution must remain inside the vault.
    if !real.starts_with(&canonical_root) {
        return Err(ToolError::not_found(format!("note not found: {raw}")));
    }

    Ok(real)
}

fn has_drive_letter(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}
