// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Apply plans inside reversible backup sessions.
//!
//! Every destructive change made while applying a [`Plan`] is recorded in a
//! [`BackupSession`] _before_ the change happens. Overwritten files and
//! directories are copied into the session, overwritten symlinks have their
//! destination noted, and symlinks or directories created from scratch are
//! marked as such. Undo replays the most recent finalized session in reverse.
//!
//! Undo refuses to clobber anything that changed since the session was
//! applied. A path is only removed or restored over if it is currently a
//! symlink or absent.
//!
//! # See Also
//!
//! 1. [`session`]

pub mod session;

pub use session::{BackupEntry, BackupSession, EntryKind, SessionManifest, SessionState};

use crate::{
    chain::ChainLevel,
    link::{inspect, Conflict, LinkTask, Plan, TargetState, TaskKind},
    path::BACKUPS_DIR,
};

use std::{
    collections::HashSet,
    fs::{copy, create_dir_all, read_dir, read_link, remove_dir, remove_dir_all, remove_file, write},
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

/// How conflicts are handled while applying a plan.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ForcePolicy {
    /// Leave conflicting targets untouched.
    #[default]
    Skip,

    /// Back up conflicting targets and replace them.
    Overwrite,
}

/// Task that could not be carried out.
#[derive(Debug)]
pub struct TaskFailure {
    /// Path being changed.
    pub target: PathBuf,

    /// What went wrong.
    pub error: TransactionError,
}

/// Outcome of applying a plan.
#[derive(Debug, Default)]
pub struct ApplyReport {
    /// Symlinks created or repointed.
    pub linked: usize,

    /// Stale symlinks removed.
    pub pruned: usize,

    /// Conflicts overwritten under force.
    pub forced: usize,

    /// Generated documents written.
    pub generated: usize,

    /// Tasks that were already satisfied.
    pub unchanged: usize,

    /// Conflicts left untouched.
    pub conflicts: Vec<Conflict>,

    /// Tasks that failed.
    pub failures: Vec<TaskFailure>,
}

impl ApplyReport {
    /// Total number of filesystem changes made.
    pub fn applied(&self) -> usize {
        self.linked + self.pruned + self.forced + self.generated
    }
}

/// Outcome of undoing a session.
#[derive(Debug, Default)]
pub struct UndoReport {
    /// Id of undone session.
    pub session: String,

    /// Paths restored from backup.
    pub restored: usize,

    /// Created paths removed.
    pub removed: usize,

    /// Entries left in place.
    pub failures: Vec<TaskFailure>,
}

/// Backup-aware applier of link plans for one level.
#[derive(Debug, Clone)]
pub struct TransactionManager {
    scope: PathBuf,
    backups_dir: PathBuf,
}

impl TransactionManager {
    /// Construct new transaction manager for level.
    pub fn new(level: &ChainLevel) -> Self {
        Self {
            scope: level.root.clone(),
            backups_dir: level.canonical_dir().join(BACKUPS_DIR),
        }
    }

    /// Directory holding backup sessions.
    pub fn backups_dir(&self) -> &Path {
        self.backups_dir.as_path()
    }

    /// Open new backup session.
    ///
    /// # Errors
    ///
    /// - Return [`TransactionError::Io`] if session directory cannot be made.
    pub fn begin(&self) -> Result<BackupSession> {
        BackupSession::create(&self.backups_dir, &self.scope)
    }

    /// Apply plan, recording every change in session.
    ///
    /// Failures of individual tasks are collected in the report, and the
    /// remaining tasks still run.
    #[instrument(skip(self, plan, session), fields(id = session.id()), level = "debug")]
    pub fn apply(&self, plan: &Plan, session: &mut BackupSession, force: ForcePolicy) -> ApplyReport {
        let mut report = ApplyReport::default();

        // INVARIANT: Only write generated documents that a kept or new link points at.
        let mut linked_sources: HashSet<&Path> = plan
            .tasks
            .iter()
            .filter(|task| task.kind != TaskKind::RemoveStale)
            .map(|task| task.source.as_path())
            .collect();
        if force == ForcePolicy::Overwrite {
            linked_sources.extend(plan.conflicts.iter().map(|conflict| conflict.source.as_path()));
        }

        let pending = plan.generated.iter().filter(|generated| {
            !generated.up_to_date && linked_sources.contains(generated.path.as_path())
        });
        for generated in pending {
            match self.write_generated(&generated.path, &generated.content, session) {
                Ok(()) => report.generated += 1,
                Err(error) => failure(&mut report.failures, &generated.path, error),
            }
        }

        for task in &plan.tasks {
            let outcome = match task.kind {
                TaskKind::Noop => {
                    report.unchanged += 1;
                    continue;
                }
                TaskKind::Create | TaskKind::Replace => self.link(task, session, false),
                TaskKind::RemoveStale => self.remove_stale(task, session),
            };

            match (outcome, task.kind) {
                (Ok(()), TaskKind::RemoveStale) => report.pruned += 1,
                (Ok(()), _) => report.linked += 1,
                (Err(error), _) => failure(&mut report.failures, &task.target, error),
            }
        }

        for conflict in &plan.conflicts {
            if force == ForcePolicy::Skip {
                info!("skip {conflict}");
                report.conflicts.push(conflict.clone());
                continue;
            }

            let task = LinkTask {
                target: conflict.target.clone(),
                source: conflict.source.clone(),
                kind: TaskKind::Replace,
            };
            match self.link(&task, session, true) {
                Ok(()) => report.forced += 1,
                Err(error) => failure(&mut report.failures, &task.target, error),
            }
        }

        report
    }

    /// Make session durable.
    ///
    /// A session that recorded nothing is abandoned and deleted, returning
    /// `None`.
    ///
    /// # Errors
    ///
    /// - Return [`TransactionError::Io`] if session cannot be written or
    ///   deleted.
    pub fn finalize(&self, mut session: BackupSession) -> Result<Option<String>> {
        if session.entries().is_empty() {
            debug!("abandon empty session {}", session.id());
            session.discard()?;
            return Ok(None);
        }

        session.set_state(SessionState::Finalized)?;
        info!("finalized session {} with {} entries", session.id(), session.entries().len());
        Ok(Some(session.id().to_string()))
    }

    /// Undo most recent finalized session.
    ///
    /// Entries are replayed in reverse. Paths that changed since the session
    /// was applied are left in place and reported as failures. Such a session
    /// stays finalized holding only the entries left to revert, so undo can be
    /// retried once they are dealt with.
    ///
    /// # Errors
    ///
    /// - Return [`TransactionError::NoSession`] if nothing can be undone.
    /// - Return [`TransactionError::Manifest`] if session record is corrupt.
    #[instrument(skip(self), fields(scope = %self.scope.display()), level = "debug")]
    pub fn undo(&self) -> Result<UndoReport> {
        let manifest = self
            .sessions()?
            .into_iter()
            .rev()
            .find(|manifest| manifest.state == SessionState::Finalized)
            .ok_or_else(|| TransactionError::NoSession { scope: self.scope.clone() })?;

        let mut session = BackupSession::open(self.backups_dir.join(&manifest.id))?;
        let mut report = UndoReport {
            session: session.id().to_string(),
            ..Default::default()
        };

        let mut remaining = Vec::new();
        for entry in session.entries().iter().rev() {
            match self.revert(&session, entry) {
                Ok(Reverted::Restored) => report.restored += 1,
                Ok(Reverted::Removed) => report.removed += 1,
                Ok(Reverted::Kept) => remaining.push(entry.clone()),
                Err(error) => {
                    failure(&mut report.failures, &entry.path, error);
                    remaining.push(entry.clone());
                }
            }
        }

        // INVARIANT: A session stays finalized until every entry is reverted.
        if report.failures.is_empty() {
            session.set_state(SessionState::Undone)?;
        } else {
            remaining.reverse();
            warn!(
                "session {} keeps {} entries that could not be reverted",
                report.session,
                remaining.len()
            );
            session.set_entries(remaining)?;
            return Ok(report);
        }

        info!(
            "undid session {}: {} restored, {} removed",
            report.session, report.restored, report.removed
        );

        Ok(report)
    }

    /// List every session of scope, oldest first.
    ///
    /// Unreadable session records are skipped with a warning.
    ///
    /// # Errors
    ///
    /// - Return [`TransactionError::Io`] if backup directory cannot be read.
    pub fn sessions(&self) -> Result<Vec<SessionManifest>> {
        let entries = match read_dir(&self.backups_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(TransactionError::io(err, &self.backups_dir)),
        };

        let mut sessions = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| TransactionError::io(err, &self.backups_dir))?;
            if !entry.path().is_dir() {
                continue;
            }

            match session::load_manifest(&entry.path()) {
                Ok(manifest) => sessions.push(manifest),
                Err(error) => warn!("skip session {:?}: {error}", entry.path().display()),
            }
        }
        sessions.sort_by(|a, b| a.id.cmp(&b.id));

        Ok(sessions)
    }

    fn write_generated(&self, path: &Path, content: &str, session: &mut BackupSession) -> Result<()> {
        let existed = match inspect(path).map_err(|err| TransactionError::io(err, path))? {
            TargetState::Absent => {
                ensure_parent(path, session)?;
                false
            }
            TargetState::File => {
                backup_file(path, session)?;
                true
            }
            _ => return Err(TransactionError::Changed { path: path.to_path_buf() }),
        };

        write(path, content).map_err(|err| TransactionError::io(err, path))?;
        debug!("wrote generated document {:?}", path.display());
        if !existed {
            session.record(BackupEntry::created(path))?;
        }

        Ok(())
    }

    /// Point target at task source, backing up whatever is in the way.
    ///
    /// Without `overwrite`, regular files and non-empty directories that
    /// appeared since planning are refused.
    fn link(&self, task: &LinkTask, session: &mut BackupSession, overwrite: bool) -> Result<()> {
        let target = task.target.as_path();
        let state = inspect(target).map_err(|err| TransactionError::io(err, target))?;

        let created = match state {
            TargetState::Absent => {
                ensure_parent(target, session)?;
                true
            }
            TargetState::Symlink(destination) if destination == task.source => return Ok(()),
            TargetState::Symlink(destination) => {
                session.record(BackupEntry::symlink(target, destination))?;
                remove_file(target).map_err(|err| TransactionError::io(err, target))?;
                false
            }
            TargetState::EmptyDir => {
                backup_directory(target, session)?;
                remove_dir(target).map_err(|err| TransactionError::io(err, target))?;
                false
            }
            TargetState::File | TargetState::Dir if !overwrite => {
                return Err(TransactionError::Changed { path: target.to_path_buf() });
            }
            TargetState::File => {
                backup_file(target, session)?;
                remove_file(target).map_err(|err| TransactionError::io(err, target))?;
                false
            }
            TargetState::Dir => {
                backup_directory(target, session)?;
                remove_dir_all(target).map_err(|err| TransactionError::io(err, target))?;
                false
            }
        };

        create_symlink(&task.source, target).map_err(|err| TransactionError::io(err, target))?;
        debug!("linked {:?} -> {:?}", target.display(), task.source.display());
        if created {
            session.record(BackupEntry::created(target))?;
        }

        Ok(())
    }

    fn remove_stale(&self, task: &LinkTask, session: &mut BackupSession) -> Result<()> {
        let target = task.target.as_path();
        match inspect(target).map_err(|err| TransactionError::io(err, target))? {
            TargetState::Absent => Ok(()),
            TargetState::Symlink(destination) => {
                session.record(BackupEntry::symlink(target, destination))?;
                remove_file(target).map_err(|err| TransactionError::io(err, target))?;
                debug!("pruned stale link {:?}", target.display());
                Ok(())
            }
            _ => Err(TransactionError::Changed { path: target.to_path_buf() }),
        }
    }

    fn revert(&self, session: &BackupSession, entry: &BackupEntry) -> Result<Reverted> {
        let path = entry.path.as_path();

        if entry.kind == EntryKind::CreatedDirectory {
            prune_empty_dirs(path)?;
            return Ok(if path.exists() { Reverted::Kept } else { Reverted::Removed });
        }

        // INVARIANT: Resolve what to restore before touching the live path.
        let restore = match entry.kind {
            EntryKind::Created | EntryKind::CreatedDirectory => None,
            EntryKind::RestoreFile => Some(Restore::File(saved_copy(session, entry)?)),
            EntryKind::RestoreDirectory => Some(Restore::Directory(saved_copy(session, entry)?)),
            EntryKind::RestoreSymlink => {
                let link = entry
                    .link
                    .clone()
                    .ok_or_else(|| TransactionError::Incomplete { path: path.to_path_buf() })?;
                Some(Restore::Symlink(link))
            }
        };

        // INVARIANT: Only symlinks and absent paths may be removed or restored over.
        match inspect(path).map_err(|err| TransactionError::io(err, path))? {
            TargetState::Absent => {}
            TargetState::Symlink(_) => {
                remove_file(path).map_err(|err| TransactionError::io(err, path))?;
            }
            TargetState::File
                if is_generated(entry)
                    && matches!(entry.kind, EntryKind::Created | EntryKind::RestoreFile) =>
            {
                remove_file(path).map_err(|err| TransactionError::io(err, path))?;
            }
            _ => return Err(TransactionError::Changed { path: path.to_path_buf() }),
        }

        let Some(restore) = restore else {
            return Ok(Reverted::Removed);
        };

        ensure_dir(path.parent())?;
        match restore {
            Restore::File(saved) => {
                copy(saved, path).map_err(|err| TransactionError::io(err, path))?;
            }
            Restore::Directory(saved) => copy_tree(&saved, path)?,
            Restore::Symlink(link) => {
                create_symlink(&link, path).map_err(|err| TransactionError::io(err, path))?;
            }
        }
        debug!("restored {:?}", path.display());

        Ok(Reverted::Restored)
    }
}

enum Reverted {
    Restored,
    Removed,
    Kept,
}

enum Restore {
    File(PathBuf),
    Directory(PathBuf),
    Symlink(PathBuf),
}

/// Locate saved copy of entry, which must still exist.
fn saved_copy(session: &BackupSession, entry: &BackupEntry) -> Result<PathBuf> {
    let saved = entry
        .saved
        .as_deref()
        .map(|saved| session.saved_path(saved))
        .ok_or_else(|| TransactionError::Incomplete { path: entry.path.clone() })?;

    if saved.symlink_metadata().is_err() {
        return Err(TransactionError::MissingCopy {
            path: entry.path.clone(),
            saved,
        });
    }

    Ok(saved)
}

fn failure(failures: &mut Vec<TaskFailure>, target: &Path, error: TransactionError) {
    warn!("{error}");
    failures.push(TaskFailure {
        target: target.to_path_buf(),
        error,
    });
}

/// Generated documents live in the canonical folder, so they are the only
/// regular files undo may delete.
fn is_generated(entry: &BackupEntry) -> bool {
    entry
        .path
        .components()
        .any(|component| component.as_os_str() == crate::path::GENERATED_DIR)
}

/// Create missing parents of path, recording the outermost one created.
fn ensure_parent(path: &Path, session: &mut BackupSession) -> Result<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };

    let outermost = mkdirp::mkdirp(parent).map_err(|err| TransactionError::io(err, parent))?;
    if let Some(outermost) = outermost {
        session.record(BackupEntry::created_directory(outermost))?;
    }

    Ok(())
}

fn ensure_dir(dir: Option<&Path>) -> Result<()> {
    match dir {
        Some(dir) => create_dir_all(dir).map_err(|err| TransactionError::io(err, dir)),
        None => Ok(()),
    }
}

fn backup_file(target: &Path, session: &mut BackupSession) -> Result<()> {
    let saved = session.reserve_saved_path();
    let saved_path = session.saved_path(&saved);
    ensure_dir(saved_path.parent())?;
    copy(target, &saved_path).map_err(|err| TransactionError::io(err, target))?;
    session.record(BackupEntry::saved(EntryKind::RestoreFile, target, saved))
}

fn backup_directory(target: &Path, session: &mut BackupSession) -> Result<()> {
    let saved = session.reserve_saved_path();
    copy_tree(target, &session.saved_path(&saved))?;
    session.record(BackupEntry::saved(EntryKind::RestoreDirectory, target, saved))
}

/// Copy directory tree without following symlinks.
fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    for entry in WalkDir::new(from).follow_links(false) {
        let entry = entry.map_err(|err| {
            let path = err.path().unwrap_or(from).to_path_buf();
            TransactionError::io(err.into(), path)
        })?;
        let relative = entry.path().strip_prefix(from).unwrap_or(entry.path());
        let destination = to.join(relative);

        let file_type = entry.file_type();
        if file_type.is_dir() {
            create_dir_all(&destination).map_err(|err| TransactionError::io(err, &destination))?;
        } else if file_type.is_symlink() {
            let link = read_link(entry.path()).map_err(|err| TransactionError::io(err, entry.path()))?;
            create_symlink(&link, &destination)
                .map_err(|err| TransactionError::io(err, &destination))?;
        } else {
            copy(entry.path(), &destination).map_err(|err| TransactionError::io(err, entry.path()))?;
        }
    }

    Ok(())
}

/// Remove every empty directory under path, path included.
fn prune_empty_dirs(path: &Path) -> Result<()> {
    if !path.is_dir() {
        return Ok(());
    }

    for entry in WalkDir::new(path).follow_links(false).contents_first(true) {
        let entry = entry.map_err(|err| {
            let failed = err.path().unwrap_or(path).to_path_buf();
            TransactionError::io(err.into(), failed)
        })?;

        if entry.file_type().is_dir() {
            match remove_dir(entry.path()) {
                Ok(()) => debug!("removed directory {:?}", entry.path().display()),
                Err(err) => debug!("keep directory {:?}: {err}", entry.path().display()),
            }
        }
    }

    Ok(())
}

/// Cross-platform symlink creation.
pub(crate) fn create_symlink(source: &Path, link: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(source, link)
    }
    #[cfg(windows)]
    {
        if source.is_dir() {
            std::os::windows::fs::symlink_dir(source, link)
        } else {
            std::os::windows::fs::symlink_file(source, link)
        }
    }
}

/// Transaction error types.
#[derive(Debug, thiserror::Error)]
pub enum TransactionError {
    /// Filesystem operation failed.
    #[error("failed to modify {:?}", path.display())]
    Io {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Path no longer matches what was planned or applied.
    #[error("{:?} changed since it was last managed, leaving it in place", path.display())]
    Changed { path: PathBuf },

    /// Session record lacks data needed for restore.
    #[error("backup entry for {:?} is incomplete", path.display())]
    Incomplete { path: PathBuf },

    /// Saved copy of a backed up path is gone.
    #[error("saved copy {:?} of {:?} is missing", saved.display(), path.display())]
    MissingCopy { path: PathBuf, saved: PathBuf },

    /// Session record cannot be parsed.
    #[error("failed to parse session record {:?}", path.display())]
    Manifest {
        #[source]
        source: toml::de::Error,
        path: PathBuf,
    },

    /// Session record cannot be serialized.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// No finalized session exists.
    #[error("no session to undo in {:?}", scope.display())]
    NoSession { scope: PathBuf },
}

impl TransactionError {
    pub(crate) fn io(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        Self::Io {
            source,
            path: path.into(),
        }
    }
}

/// Friendly result alias :3
pub type Result<T, E = TransactionError> = std::result::Result<T, E>;

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::link::{ConflictReason, GeneratedDocument};
    use pretty_assertions::assert_eq;
    use std::{
        fs::{canonicalize, read_to_string},
        os::unix::fs::symlink,
    };

    struct Fixture {
        _temp: tempfile::TempDir,
        root: PathBuf,
        manager: TransactionManager,
    }

    impl Fixture {
        fn new() -> anyhow::Result<Self> {
            let temp = tempfile::tempdir()?;
            let root = canonicalize(temp.path())?;
            create_dir_all(root.join(".ailink/commands"))?;
            write(root.join(".ailink/commands/build.md"), "build")?;
            write(root.join(".ailink/AGENTS.md"), "agents")?;
            let level = ChainLevel {
                root: root.clone(),
                rank: 0,
                current: true,
                global: false,
            };
            Ok(Self {
                _temp: temp,
                manager: TransactionManager::new(&level),
                root,
            })
        }

        fn task(&self, target: &str, source: &str, kind: TaskKind) -> LinkTask {
            LinkTask {
                target: self.root.join(target),
                source: self.root.join(source),
                kind,
            }
        }

        fn apply(
            &self,
            plan: &Plan,
            force: ForcePolicy,
        ) -> anyhow::Result<(ApplyReport, Option<String>)> {
            let mut session = self.manager.begin()?;
            let report = self.manager.apply(plan, &mut session, force);
            let id = self.manager.finalize(session)?;
            Ok((report, id))
        }
    }

    #[test]
    fn apply_then_undo_restores_original_state() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        write(fixture.root.join("CLAUDE.md"), "user notes\n")?;

        let plan = Plan {
            scope: fixture.root.clone(),
            tasks: vec![fixture.task(
                ".claude/commands/build.md",
                ".ailink/commands/build.md",
                TaskKind::Create,
            )],
            conflicts: vec![Conflict {
                target: fixture.root.join("CLAUDE.md"),
                source: fixture.root.join(".ailink/AGENTS.md"),
                reason: ConflictReason::ExistingFile,
            }],
            generated: Vec::new(),
        };

        let (report, id) = fixture.apply(&plan, ForcePolicy::Overwrite)?;
        assert_eq!(report.linked, 1);
        assert_eq!(report.forced, 1);
        assert!(report.failures.is_empty());
        assert!(id.is_some());
        assert_eq!(read_to_string(fixture.root.join("CLAUDE.md"))?, "agents");
        assert!(fixture.root.join(".claude/commands/build.md").is_symlink());

        let undo = fixture.manager.undo()?;
        assert_eq!(undo.restored, 1);
        assert_eq!(undo.removed, 2);
        assert!(undo.failures.is_empty());
        assert_eq!(read_to_string(fixture.root.join("CLAUDE.md"))?, "user notes\n");
        assert!(!fixture.root.join("CLAUDE.md").is_symlink());
        assert!(!fixture.root.join(".claude").exists());

        let sessions = fixture.manager.sessions()?;
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].state, SessionState::Undone);
        assert!(matches!(fixture.manager.undo(), Err(TransactionError::NoSession { .. })));

        Ok(())
    }

    #[test]
    fn conflicts_are_skipped_without_force() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        write(fixture.root.join("CLAUDE.md"), "user notes")?;
        let plan = Plan {
            scope: fixture.root.clone(),
            tasks: Vec::new(),
            conflicts: vec![Conflict {
                target: fixture.root.join("CLAUDE.md"),
                source: fixture.root.join(".ailink/AGENTS.md"),
                reason: ConflictReason::ExistingFile,
            }],
            generated: Vec::new(),
        };

        let (report, id) = fixture.apply(&plan, ForcePolicy::Skip)?;
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.applied(), 0);
        assert_eq!(id, None);
        assert!(fixture.manager.sessions()?.is_empty());
        assert_eq!(read_to_string(fixture.root.join("CLAUDE.md"))?, "user notes");

        Ok(())
    }

    #[test]
    fn replaced_and_pruned_links_are_restored() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        create_dir_all(fixture.root.join(".claude/commands"))?;
        symlink("/elsewhere", fixture.root.join(".claude/commands/build.md"))?;
        symlink(
            fixture.root.join(".ailink/commands/old.md"),
            fixture.root.join(".claude/commands/old.md"),
        )?;

        let plan = Plan {
            scope: fixture.root.clone(),
            tasks: vec![
                fixture.task(
                    ".claude/commands/build.md",
                    ".ailink/commands/build.md",
                    TaskKind::Replace,
                ),
                fixture.task(
                    ".claude/commands/old.md",
                    ".ailink/commands/old.md",
                    TaskKind::RemoveStale,
                ),
            ],
            ..Default::default()
        };

        let (report, _) = fixture.apply(&plan, ForcePolicy::Skip)?;
        assert_eq!(report.linked, 1);
        assert_eq!(report.pruned, 1);
        assert!(!fixture.root.join(".claude/commands/old.md").is_symlink());

        let undo = fixture.manager.undo()?;
        assert_eq!(undo.restored, 2);
        assert_eq!(
            read_link(fixture.root.join(".claude/commands/build.md"))?,
            PathBuf::from("/elsewhere")
        );
        assert!(fixture.root.join(".claude/commands/old.md").is_symlink());

        Ok(())
    }

    #[test]
    fn undo_leaves_modified_paths_alone() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        let plan = Plan {
            scope: fixture.root.clone(),
            tasks: vec![fixture.task("CLAUDE.md", ".ailink/AGENTS.md", TaskKind::Create)],
            ..Default::default()
        };
        fixture.apply(&plan, ForcePolicy::Skip)?;

        remove_file(fixture.root.join("CLAUDE.md"))?;
        write(fixture.root.join("CLAUDE.md"), "hand written")?;

        let undo = fixture.manager.undo()?;
        assert_eq!(undo.failures.len(), 1);
        assert!(matches!(undo.failures[0].error, TransactionError::Changed { .. }));
        assert_eq!(read_to_string(fixture.root.join("CLAUDE.md"))?, "hand written");

        Ok(())
    }

    #[test]
    fn apply_refuses_files_that_appeared_after_planning() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        let plan = Plan {
            scope: fixture.root.clone(),
            tasks: vec![fixture.task("CLAUDE.md", ".ailink/AGENTS.md", TaskKind::Create)],
            ..Default::default()
        };
        write(fixture.root.join("CLAUDE.md"), "raced")?;

        let (report, _) = fixture.apply(&plan, ForcePolicy::Skip)?;
        assert_eq!(report.failures.len(), 1);
        assert_eq!(read_to_string(fixture.root.join("CLAUDE.md"))?, "raced");

        Ok(())
    }

    #[test]
    fn generated_documents_are_written_and_undone() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        let generated = fixture.root.join(".ailink/.generated/codex/AGENTS.md");
        let plan = Plan {
            scope: fixture.root.clone(),
            tasks: vec![LinkTask {
                target: fixture.root.join("AGENTS.md"),
                source: generated.clone(),
                kind: TaskKind::Create,
            }],
            conflicts: Vec::new(),
            generated: vec![GeneratedDocument {
                path: generated.clone(),
                content: "A\n\nB".into(),
                up_to_date: false,
            }],
        };

        let (report, _) = fixture.apply(&plan, ForcePolicy::Skip)?;
        assert_eq!(report.generated, 1);
        assert_eq!(read_to_string(fixture.root.join("AGENTS.md"))?, "A\n\nB");

        fixture.manager.undo()?;
        assert!(!fixture.root.join("AGENTS.md").exists());
        assert!(!fixture.root.join(".ailink/.generated").exists());

        Ok(())
    }

    #[test]
    fn rewritten_generated_document_is_backed_up() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        let generated = fixture.root.join(".ailink/.generated/claude/CLAUDE.md");
        create_dir_all(fixture.root.join(".ailink/.generated/claude"))?;
        write(&generated, "A\n\nB")?;
        symlink(&generated, fixture.root.join("CLAUDE.md"))?;

        let plan = Plan {
            scope: fixture.root.clone(),
            tasks: vec![LinkTask {
                target: fixture.root.join("CLAUDE.md"),
                source: generated.clone(),
                kind: TaskKind::Noop,
            }],
            conflicts: Vec::new(),
            generated: vec![GeneratedDocument {
                path: generated.clone(),
                content: "A\n\nC".into(),
                up_to_date: false,
            }],
        };

        let (report, id) = fixture.apply(&plan, ForcePolicy::Skip)?;
        assert_eq!(report.generated, 1);
        assert!(id.is_some());
        assert_eq!(read_to_string(fixture.root.join("CLAUDE.md"))?, "A\n\nC");

        let undo = fixture.manager.undo()?;
        assert!(undo.failures.is_empty());
        assert_eq!(undo.restored, 1);
        assert_eq!(read_to_string(fixture.root.join("CLAUDE.md"))?, "A\n\nB");

        Ok(())
    }

    #[test]
    fn generated_documents_of_skipped_conflicts_are_not_written() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        write(fixture.root.join("CLAUDE.md"), "user notes")?;
        let generated = fixture.root.join(".ailink/.generated/claude/CLAUDE.md");
        let plan = Plan {
            scope: fixture.root.clone(),
            tasks: Vec::new(),
            conflicts: vec![Conflict {
                target: fixture.root.join("CLAUDE.md"),
                source: generated.clone(),
                reason: ConflictReason::ExistingFile,
            }],
            generated: vec![GeneratedDocument {
                path: generated.clone(),
                content: "A\n\nB".into(),
                up_to_date: false,
            }],
        };

        let (report, id) = fixture.apply(&plan, ForcePolicy::Skip)?;
        assert_eq!(report.generated, 0);
        assert_eq!(id, None);
        assert!(!generated.exists());
        assert!(fixture.manager.sessions()?.is_empty());

        let (report, _) = fixture.apply(&plan, ForcePolicy::Overwrite)?;
        assert_eq!(report.generated, 1);
        assert_eq!(report.forced, 1);
        assert_eq!(read_to_string(fixture.root.join("CLAUDE.md"))?, "A\n\nB");

        Ok(())
    }

    #[test]
    fn missing_saved_copy_keeps_link_and_session() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        write(fixture.root.join("CLAUDE.md"), "user notes")?;
        let plan = Plan {
            scope: fixture.root.clone(),
            conflicts: vec![Conflict {
                target: fixture.root.join("CLAUDE.md"),
                source: fixture.root.join(".ailink/AGENTS.md"),
                reason: ConflictReason::ExistingFile,
            }],
            ..Default::default()
        };

        let (_, id) = fixture.apply(&plan, ForcePolicy::Overwrite)?;
        let id = id.expect("session is finalized");
        let saved = fixture.manager.backups_dir().join(&id).join("files/0");
        remove_file(&saved)?;

        let undo = fixture.manager.undo()?;
        assert_eq!(undo.failures.len(), 1);
        assert!(matches!(undo.failures[0].error, TransactionError::MissingCopy { .. }));
        assert_eq!(
            read_link(fixture.root.join("CLAUDE.md"))?,
            fixture.root.join(".ailink/AGENTS.md")
        );

        let sessions = fixture.manager.sessions()?;
        assert_eq!(sessions[0].state, SessionState::Finalized);
        assert_eq!(sessions[0].entries.len(), 1);

        write(&saved, "user notes")?;
        let undo = fixture.manager.undo()?;
        assert!(undo.failures.is_empty());
        assert_eq!(undo.restored, 1);
        assert_eq!(read_to_string(fixture.root.join("CLAUDE.md"))?, "user notes");
        assert_eq!(fixture.manager.sessions()?[0].state, SessionState::Undone);

        Ok(())
    }

    #[test]
    fn directories_are_backed_up_recursively() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        let target = fixture.root.join(".claude/skills/review");
        create_dir_all(target.join("nested"))?;
        write(target.join("nested/notes.txt"), "keep me")?;

        let plan = Plan {
            scope: fixture.root.clone(),
            conflicts: vec![Conflict {
                target: target.clone(),
                source: fixture.root.join(".ailink/commands"),
                reason: ConflictReason::ExistingDirectory,
            }],
            ..Default::default()
        };

        let (report, _) = fixture.apply(&plan, ForcePolicy::Overwrite)?;
        assert_eq!(report.forced, 1);
        assert!(target.is_symlink());

        fixture.manager.undo()?;
        assert!(!target.is_symlink());
        assert_eq!(read_to_string(target.join("nested/notes.txt"))?, "keep me");

        Ok(())
    }
}
