// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine relevent path information for the canonical configuration
//! folder, and the global root that hosts the user-wide copy of it.

use std::path::{Path, PathBuf};

/// Name of the canonical configuration folder at every chain level.
pub const CANONICAL_DIR: &str = ".ailink";

/// Name of the directory holding generated documents inside a canonical folder.
pub const GENERATED_DIR: &str = ".generated";

/// Name of the directory holding backup sessions inside a canonical folder.
pub const BACKUPS_DIR: &str = ".backups";

/// Environment variable that overrides the global root.
pub const GLOBAL_ROOT_ENV: &str = "AILINK_HOME";

/// Determine absolute path to user's home directory.
///
/// Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`PathError::NoWayHome`] if home directory path cannot be
///   determined.
pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or(PathError::NoWayHome)
}

/// Determine default absolute path to the global root.
///
/// Uses `$AILINK_HOME` when set, performing shell expansion on it, and falls
/// back to the user's home directory otherwise. Does not check if the path
/// returned actually exists.
///
/// # Errors
///
/// - Return [`PathError::NoWayHome`] if home directory path cannot be
///   determined.
/// - Return [`PathError::ShellExpansion`] if `$AILINK_HOME` cannot be expanded.
pub fn default_global_root() -> Result<PathBuf> {
    match std::env::var(GLOBAL_ROOT_ENV) {
        Ok(value) if !value.trim().is_empty() => expand_path(value),
        _ => home_dir(),
    }
}

/// Perform shell expansion on a user supplied path.
///
/// # Errors
///
/// - Return [`PathError::ShellExpansion`] if a variable cannot be resolved.
pub fn expand_path(path: impl AsRef<str>) -> Result<PathBuf> {
    Ok(PathBuf::from(shellexpand::full(path.as_ref())?.into_owned()))
}

/// Path to canonical folder hosted by a directory.
pub fn canonical_dir(root: impl AsRef<Path>) -> PathBuf {
    root.as_ref().join(CANONICAL_DIR)
}

/// Check if a directory hosts a canonical folder.
pub fn hosts_canonical_dir(root: impl AsRef<Path>) -> bool {
    canonical_dir(root).is_dir()
}

/// Path resolution error types.
#[derive(Debug, thiserror::Error)]
pub enum PathError {
    /// No way to determine user's home directory.
    #[error("cannot determine absolute path to user's home directory")]
    NoWayHome,

    /// Shell expansion of user supplied path failed.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),
}

/// Friendly result alias :3
pub type Result<T, E = PathError> = std::result::Result<T, E>;
