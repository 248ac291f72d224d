// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Backup session storage.
//!
//! # Storage Layout
//!
//! ```text
//! <scope>/.ailink/.backups/
//! └── <id>/
//!     ├── session.toml    # SessionManifest
//!     └── files/<n>       # saved copies of overwritten content
//! ```
//!
//! Session ids are UTC timestamps, so sorting them sorts sessions
//! chronologically. The manifest is rewritten after every recorded entry,
//! which keeps an interrupted run's record accurate.

use crate::transaction::{Result, TransactionError};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::{
    fs::{create_dir, create_dir_all, read_to_string, remove_dir_all, rename, write},
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::debug;

/// File name of session manifest.
pub const SESSION_FILE: &str = "session.toml";

/// Directory holding saved copies inside a session.
const FILES_DIR: &str = "files";

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionState {
    /// Apply run still recording, or aborted.
    Open,

    /// Durable, usable by undo.
    Finalized,

    /// Already restored by undo.
    Undone,
}

/// What undo must do for one entry.
///
/// Tracked per entry, never inferred: a symlink that replaced nothing has no
/// saved copy and must simply be deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntryKind {
    /// Regular file was overwritten, restore saved copy.
    RestoreFile,

    /// Directory was overwritten, restore saved tree.
    RestoreDirectory,

    /// Symlink was overwritten or removed, recreate it.
    RestoreSymlink,

    /// Symlink was created from scratch, remove it.
    Created,

    /// Directory was created from scratch, remove it once empty.
    CreatedDirectory,
}

/// One recorded change.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BackupEntry {
    /// What undo must do.
    pub kind: EntryKind,

    /// Original path that was changed.
    pub path: PathBuf,

    /// Saved copy, relative to session directory.
    pub saved: Option<PathBuf>,

    /// Previous destination of overwritten symlink.
    pub link: Option<PathBuf>,
}

impl BackupEntry {
    /// Entry for a path created from scratch.
    pub fn created(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: EntryKind::Created,
            path: path.into(),
            saved: None,
            link: None,
        }
    }

    /// Entry for a directory created from scratch.
    pub fn created_directory(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: EntryKind::CreatedDirectory,
            path: path.into(),
            saved: None,
            link: None,
        }
    }

    /// Entry for overwritten content with a saved copy.
    pub fn saved(kind: EntryKind, path: impl Into<PathBuf>, saved: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
            saved: Some(saved.into()),
            link: None,
        }
    }

    /// Entry for overwritten or removed symlink.
    pub fn symlink(path: impl Into<PathBuf>, link: impl Into<PathBuf>) -> Self {
        Self {
            kind: EntryKind::RestoreSymlink,
            path: path.into(),
            saved: None,
            link: Some(link.into()),
        }
    }
}

/// Persistent record of one session.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SessionManifest {
    /// Unique, chronologically sortable id.
    pub id: String,

    /// Directory of level the session belongs to.
    pub scope: PathBuf,

    /// RFC 3339 creation time.
    pub created_at: String,

    /// Lifecycle state.
    pub state: SessionState,

    /// Recorded changes, in order.
    #[serde(default, rename = "entry")]
    pub entries: Vec<BackupEntry>,
}

/// Open backup transaction.
#[derive(Debug)]
pub struct BackupSession {
    dir: PathBuf,
    manifest: SessionManifest,
}

impl BackupSession {
    /// Create new open session under backup directory.
    pub(crate) fn create(backups_dir: &Path, scope: &Path) -> Result<Self> {
        create_dir_all(backups_dir).map_err(|err| TransactionError::io(err, backups_dir))?;

        // INVARIANT: Never reuse an existing session directory.
        let (id, dir) = loop {
            let now = Utc::now();
            let id = now.format("%Y%m%dT%H%M%S%.9fZ").to_string();
            let dir = backups_dir.join(&id);
            match create_dir(&dir) {
                Ok(()) => break (id, dir),
                Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
                Err(err) => return Err(TransactionError::io(err, &dir)),
            }
        };

        let session = Self {
            manifest: SessionManifest {
                id,
                scope: scope.to_path_buf(),
                created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
                state: SessionState::Open,
                entries: Vec::new(),
            },
            dir,
        };
        session.save()?;
        debug!("begin session {}", session.id());

        Ok(session)
    }

    /// Load existing session from its directory.
    pub(crate) fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let manifest = load_manifest(&dir)?;
        Ok(Self { dir, manifest })
    }

    /// Session id.
    pub fn id(&self) -> &str {
        self.manifest.id.as_str()
    }

    /// Session directory.
    pub fn dir(&self) -> &Path {
        self.dir.as_path()
    }

    /// Lifecycle state.
    pub fn state(&self) -> SessionState {
        self.manifest.state
    }

    /// Recorded changes, in order.
    pub fn entries(&self) -> &[BackupEntry] {
        self.manifest.entries.as_slice()
    }

    /// Persistent record of session.
    pub fn manifest(&self) -> &SessionManifest {
        &self.manifest
    }

    /// Reserve relative path for next saved copy.
    pub(crate) fn reserve_saved_path(&self) -> PathBuf {
        let taken = self
            .manifest
            .entries
            .iter()
            .filter(|entry| entry.saved.is_some())
            .count();
        PathBuf::from(FILES_DIR).join(taken.to_string())
    }

    /// Resolve saved copy path against session directory.
    pub(crate) fn saved_path(&self, relative: &Path) -> PathBuf {
        self.dir.join(relative)
    }

    /// Append entry and persist manifest.
    pub(crate) fn record(&mut self, entry: BackupEntry) -> Result<()> {
        debug!("record {:?} for {:?}", entry.kind, entry.path.display());
        self.manifest.entries.push(entry);
        self.save()
    }

    /// Replace recorded changes and persist manifest.
    pub(crate) fn set_entries(&mut self, entries: Vec<BackupEntry>) -> Result<()> {
        self.manifest.entries = entries;
        self.save()
    }

    /// Change lifecycle state and persist manifest.
    pub(crate) fn set_state(&mut self, state: SessionState) -> Result<()> {
        self.manifest.state = state;
        self.save()
    }

    /// Delete session from disk.
    pub(crate) fn discard(self) -> Result<()> {
        remove_dir_all(&self.dir).map_err(|err| TransactionError::io(err, &self.dir))
    }

    /// Write manifest by writing to a temporary file, and renaming it.
    fn save(&self) -> Result<()> {
        let path = self.dir.join(SESSION_FILE);
        let temp_path = self.dir.join(format!("{SESSION_FILE}.tmp"));
        let content = toml::to_string_pretty(&self.manifest)?;
        write(&temp_path, content).map_err(|err| TransactionError::io(err, &temp_path))?;
        rename(&temp_path, &path).map_err(|err| TransactionError::io(err, &path))?;

        Ok(())
    }
}

/// Load session manifest from session directory.
pub(crate) fn load_manifest(dir: &Path) -> Result<SessionManifest> {
    let path = dir.join(SESSION_FILE);
    let content = read_to_string(&path).map_err(|err| TransactionError::io(err, &path))?;
    toml::from_str(&content).map_err(|err| TransactionError::Manifest { source: err, path })
}
