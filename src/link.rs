// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Link planning.
//!
//! Maps a [`ResolvedResourceSet`](crate::merge::ResolvedResourceSet) onto the
//! target paths of every active consumer, compares each target against live
//! filesystem state, and emits a [`Plan`]. Planning only reads. Nothing is
//! touched until the plan is handed to the
//! [`TransactionManager`](crate::transaction::TransactionManager).
//!
//! # Target States
//!
//! | current state                      | outcome                  |
//! |------------------------------------|--------------------------|
//! | absent                             | create-symlink task      |
//! | symlink to desired source          | no-op task               |
//! | symlink pointing elsewhere         | replace-symlink task     |
//! | empty directory                    | replace-symlink task     |
//! | regular file                       | conflict                 |
//! | non-empty directory                | conflict                 |
//!
//! Symlinks are always safe to repoint, since the only symlinks at consumer
//! targets are assumed to be owned by a prior run. Conflicts are never
//! resolved without an explicit force policy.
//!
//! # See Also
//!
//! 1. [`consumer`]
//! 2. [`plan`]

pub mod consumer;
pub mod plan;

pub use consumer::{find as find_consumer, registry, Consumer, Targets};
pub use plan::LinkPlanner;

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs::{read_dir, read_link, symlink_metadata},
    io::ErrorKind,
    path::{Path, PathBuf},
};

/// Kind of planned filesystem action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// Target is absent, create symlink.
    Create,

    /// Target is a foreign symlink or empty directory, replace it.
    Replace,

    /// Target already links to desired source.
    Noop,

    /// Target is a managed symlink that is no longer desired.
    RemoveStale,
}

impl Display for TaskKind {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(match self {
            Self::Create => "create",
            Self::Replace => "replace",
            Self::Noop => "no-op",
            Self::RemoveStale => "remove-stale",
        })
    }
}

/// One planned filesystem action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkTask {
    /// Path receiving the symlink.
    pub target: PathBuf,

    /// Path the symlink should point at.
    ///
    /// For stale links this is where the link currently points.
    pub source: PathBuf,

    /// Kind of action.
    pub kind: TaskKind,
}

/// Why a target cannot be replaced without consent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictReason {
    ExistingFile,
    ExistingDirectory,
}

impl Display for ConflictReason {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(match self {
            Self::ExistingFile => "existing file",
            Self::ExistingDirectory => "existing directory",
        })
    }
}

/// Target path that cannot be safely replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    /// Path that is in the way.
    pub target: PathBuf,

    /// Path the symlink should point at.
    pub source: PathBuf,

    /// Why target is in the way.
    pub reason: ConflictReason,
}

impl Display for Conflict {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(fmt, "{}: {}", self.target.display(), self.reason)
    }
}

/// Document content that must be written before linking to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedDocument {
    /// Where generated content lives.
    pub path: PathBuf,

    /// Rendered content.
    pub content: String,

    /// File already holds exactly this content.
    pub up_to_date: bool,
}

/// Plan of link operations for one level.
///
/// # Invariants
///
/// - Task targets and conflict targets are disjoint.
/// - Every task touches a distinct target path.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Plan {
    /// Directory of level being planned.
    pub scope: PathBuf,

    /// Planned tasks, no-ops included.
    pub tasks: Vec<LinkTask>,

    /// Targets that need explicit consent.
    pub conflicts: Vec<Conflict>,

    /// Generated documents linked by tasks.
    pub generated: Vec<GeneratedDocument>,
}

impl Plan {
    /// Tasks that would change the filesystem.
    pub fn pending(&self) -> impl Iterator<Item = &LinkTask> {
        self.tasks.iter().filter(|task| task.kind != TaskKind::Noop)
    }

    /// Check if applying plan would change nothing.
    pub fn is_converged(&self) -> bool {
        self.pending().next().is_none()
            && self.conflicts.is_empty()
            && self.generated.iter().all(|generated| generated.up_to_date)
    }
}

/// Live state of a target path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TargetState {
    Absent,
    Symlink(PathBuf),
    File,
    EmptyDir,
    Dir,
}

/// Inspect target path without following symlinks.
///
/// Relative link destinations are resolved against the link's parent.
pub(crate) fn inspect(path: &Path) -> std::io::Result<TargetState> {
    let metadata = match symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(TargetState::Absent),
        Err(err) => return Err(err),
    };

    if metadata.file_type().is_symlink() {
        return Ok(TargetState::Symlink(link_destination(path)?));
    }

    if metadata.is_dir() {
        return match read_dir(path)?.next() {
            None => Ok(TargetState::EmptyDir),
            Some(_) => Ok(TargetState::Dir),
        };
    }

    Ok(TargetState::File)
}

/// Absolute destination of symlink.
pub(crate) fn link_destination(path: &Path) -> std::io::Result<PathBuf> {
    let destination = read_link(path)?;
    if destination.is_absolute() {
        return Ok(destination);
    }

    Ok(path
        .parent()
        .map(|parent| parent.join(&destination))
        .unwrap_or(destination))
}

/// Link planning error types.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    /// Target state cannot be inspected.
    #[error("failed to inspect target {:?}", path.display())]
    Inspect {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Document cannot be rendered for consumer.
    #[error("failed to render instructions document for {consumer}")]
    Render {
        #[source]
        source: std::io::Error,
        consumer: String,
    },
}

/// Friendly result alias :3
pub type Result<T, E = PlanError> = std::result::Result<T, E>;
