// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::TreeFixture;

use ailink::{
    link::{find_consumer, ConflictReason, TaskKind},
    select_consumers,
    transaction::ForcePolicy,
    Workspace, WorkspaceError,
};

use anyhow::Result;
use pretty_assertions::assert_eq;
use std::fs::{read_link, remove_file};

#[test]
fn second_sync_is_noop() -> Result<()> {
    let fixture = TreeFixture::new()?;
    fixture.write("home/repo/.ailink/AGENTS.md", "agents")?;
    fixture.write("home/repo/.ailink/commands/build.md", "build")?;
    fixture.write("home/repo/.ailink/hooks/pre-commit.sh", "#!/bin/sh")?;

    let workspace = fixture.open("home/repo")?;
    let consumers = select_consumers(&["claude", "codex"])?;

    let first = workspace.sync(&consumers, ForcePolicy::Skip)?;
    assert!(first.apply.failures.is_empty());
    assert!(first.session.is_some());
    assert_eq!(first.apply.linked, 5);
    assert_eq!(
        read_link(fixture.path("home/repo/.claude/commands/build.md"))?,
        fixture.path("home/repo/.ailink/commands/build.md")
    );
    assert_eq!(fixture.read("home/repo/.codex/prompts/build.md")?, "build");
    assert_eq!(fixture.read("home/repo/CLAUDE.md")?, "agents");

    let plan = workspace.plan(&consumers)?;
    assert!(plan.is_converged());
    assert!(plan.tasks.iter().all(|task| task.kind == TaskKind::Noop));

    let second = workspace.sync(&consumers, ForcePolicy::Skip)?;
    assert_eq!(second.apply.applied(), 0);
    assert_eq!(second.apply.unchanged, 5);
    assert_eq!(second.session, None);
    assert_eq!(workspace.sessions()?.len(), 1);

    Ok(())
}

#[test]
fn existing_file_is_conflict_not_task() -> Result<()> {
    let fixture = TreeFixture::new()?;
    fixture.write("home/repo/.ailink/AGENTS.md", "agents")?;
    fixture.write("home/repo/CLAUDE.md", "hand written")?;

    let workspace = fixture.open("home/repo")?;
    let claude = find_consumer("claude").expect("claude is registered");
    let plan = workspace.plan(&[claude])?;

    assert!(plan.tasks.is_empty());
    assert_eq!(plan.conflicts.len(), 1);
    assert_eq!(plan.conflicts[0].target, fixture.path("home/repo/CLAUDE.md"));
    assert_eq!(plan.conflicts[0].reason, ConflictReason::ExistingFile);
    assert!(plan.conflicts[0].to_string().ends_with("existing file"));

    let report = workspace.sync(&[claude], ForcePolicy::Skip)?;
    assert_eq!(report.apply.conflicts.len(), 1);
    assert_eq!(report.session, None);
    assert_eq!(fixture.read("home/repo/CLAUDE.md")?, "hand written");

    Ok(())
}

#[test]
fn removed_resources_are_pruned() -> Result<()> {
    let fixture = TreeFixture::new()?;
    fixture.write("home/repo/.ailink/commands/build.md", "build")?;
    fixture.write("home/repo/.ailink/commands/lint.md", "lint")?;

    let claude = find_consumer("claude").expect("claude is registered");
    fixture.open("home/repo")?.sync(&[claude], ForcePolicy::Skip)?;
    assert!(fixture.path("home/repo/.claude/commands/lint.md").is_symlink());

    remove_file(fixture.path("home/repo/.ailink/commands/lint.md"))?;
    let report = fixture.open("home/repo")?.sync(&[claude], ForcePolicy::Skip)?;
    assert_eq!(report.apply.pruned, 1);
    assert!(!fixture.path("home/repo/.claude/commands/lint.md").is_symlink());
    assert!(fixture.path("home/repo/.claude/commands/build.md").is_symlink());

    Ok(())
}

#[test]
fn global_level_uses_global_targets() -> Result<()> {
    let fixture = TreeFixture::new()?;
    fixture.write("home/.ailink/AGENTS.md", "global agents")?;

    let workspace = fixture.open("home")?;
    let claude = find_consumer("claude").expect("claude is registered");
    workspace.sync(&[claude], ForcePolicy::Skip)?;

    assert_eq!(fixture.read("home/.claude/CLAUDE.md")?, "global agents");
    assert!(!fixture.path("home/CLAUDE.md").exists());

    Ok(())
}

#[test]
fn uninitialized_directory_is_rejected() -> Result<()> {
    let fixture = TreeFixture::new()?;
    fixture.level("home")?;
    fixture.write("home/plain/file.txt", "data")?;

    let result = Workspace::open(fixture.path("home/plain"), Some(fixture.global_root()));
    assert!(matches!(result, Err(WorkspaceError::NotInitialized { .. })));

    Ok(())
}

#[test]
fn malformed_declaration_is_rejected() -> Result<()> {
    let fixture = TreeFixture::new()?;
    fixture.write("home/repo/.ailink/config.toml", "[inherit]\nextnds = true\n")?;

    let result = Workspace::open(fixture.path("home/repo"), Some(fixture.global_root()));
    assert!(matches!(result, Err(WorkspaceError::Config(_))));

    Ok(())
}
