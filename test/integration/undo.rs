// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::TreeFixture;

use ailink::{
    link::find_consumer,
    transaction::{EntryKind, ForcePolicy, SessionState, TransactionError},
    WorkspaceError,
};

use anyhow::Result;
use indoc::indoc;
use pretty_assertions::assert_eq;
use std::fs::read;

#[test]
fn forced_conflict_is_restored_byte_identical() -> Result<()> {
    let fixture = TreeFixture::new()?;
    let original: &[u8] = b"hand written\r\nwith odd bytes \xF0\x9F\xA6\x80\n";
    fixture.write("home/repo/.ailink/AGENTS.md", "agents")?;
    fixture.write("home/repo/.ailink/commands/build.md", "build")?;
    std::fs::write(fixture.path("home/repo/CLAUDE.md"), original)?;

    let workspace = fixture.open("home/repo")?;
    let claude = find_consumer("claude").expect("claude is registered");

    let report = workspace.sync(&[claude], ForcePolicy::Overwrite)?;
    assert_eq!(report.apply.forced, 1);
    assert_eq!(report.apply.linked, 1);
    assert_eq!(fixture.read("home/repo/CLAUDE.md")?, "agents");

    let sessions = workspace.sessions()?;
    assert_eq!(sessions.len(), 1);
    let kinds: Vec<_> = sessions[0].entries.iter().map(|entry| entry.kind).collect();
    assert_eq!(
        kinds,
        vec![
            EntryKind::CreatedDirectory,
            EntryKind::Created,
            EntryKind::RestoreFile
        ]
    );

    let undo = workspace.undo()?;
    assert!(undo.failures.is_empty());
    assert_eq!(undo.restored, 1);
    assert_eq!(undo.removed, 2);
    assert_eq!(read(fixture.path("home/repo/CLAUDE.md"))?, original);
    assert!(!fixture.path("home/repo/CLAUDE.md").is_symlink());
    assert!(!fixture.path("home/repo/.claude").exists());

    assert_eq!(workspace.sessions()?[0].state, SessionState::Undone);

    Ok(())
}

#[test]
fn undo_reverts_only_most_recent_sync() -> Result<()> {
    let fixture = TreeFixture::new()?;
    fixture.write("home/repo/.ailink/commands/build.md", "build")?;
    let claude = find_consumer("claude").expect("claude is registered");

    fixture.open("home/repo")?.sync(&[claude], ForcePolicy::Skip)?;
    fixture.write("home/repo/.ailink/commands/lint.md", "lint")?;
    fixture.open("home/repo")?.sync(&[claude], ForcePolicy::Skip)?;

    let workspace = fixture.open("home/repo")?;
    let undo = workspace.undo()?;
    assert_eq!(undo.removed, 1);
    assert!(!fixture.path("home/repo/.claude/commands/lint.md").is_symlink());
    assert!(fixture.path("home/repo/.claude/commands/build.md").is_symlink());

    let states: Vec<_> = workspace
        .sessions()?
        .into_iter()
        .map(|session| session.state)
        .collect();
    assert_eq!(states, vec![SessionState::Finalized, SessionState::Undone]);

    Ok(())
}

#[test]
fn undo_restores_previous_generated_document() -> Result<()> {
    let fixture = TreeFixture::new()?;
    fixture.write("home/work/mono/.ailink/AGENTS.md", "A\n")?;
    fixture.write("home/work/mono/pkg/.ailink/AGENTS.md", "B")?;
    fixture.write(
        "home/work/mono/pkg/.ailink/config.toml",
        indoc! {r#"
            [inherit.extends]
            instructions = "extend"
        "#},
    )?;
    let claude = find_consumer("claude").expect("claude is registered");

    fixture.open("home/work/mono/pkg")?.sync(&[claude], ForcePolicy::Skip)?;
    assert_eq!(fixture.read("home/work/mono/pkg/CLAUDE.md")?, "A\n\nB");

    fixture.write("home/work/mono/pkg/.ailink/AGENTS.md", "C")?;
    let workspace = fixture.open("home/work/mono/pkg")?;
    let report = workspace.sync(&[claude], ForcePolicy::Skip)?;
    assert_eq!(report.apply.generated, 1);
    assert!(report.session.is_some());
    assert_eq!(fixture.read("home/work/mono/pkg/CLAUDE.md")?, "A\n\nC");

    let undo = workspace.undo()?;
    assert!(undo.failures.is_empty());
    assert_eq!(undo.restored, 1);
    assert_eq!(fixture.read("home/work/mono/pkg/CLAUDE.md")?, "A\n\nB");

    let states: Vec<_> = workspace
        .sessions()?
        .into_iter()
        .map(|session| session.state)
        .collect();
    assert_eq!(states, vec![SessionState::Finalized, SessionState::Undone]);

    Ok(())
}

#[test]
fn undo_without_session_fails() -> Result<()> {
    let fixture = TreeFixture::new()?;
    fixture.level("home/repo")?;

    let result = fixture.open("home/repo")?.undo();
    assert!(matches!(
        result,
        Err(WorkspaceError::Transaction(TransactionError::NoSession { .. }))
    ));

    Ok(())
}
