// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::TreeFixture;

use ailink::{
    link::find_consumer, merge::ResolvedDocument, resource::ResourceType, transaction::ForcePolicy,
};

use anyhow::Result;
use indoc::indoc;
use pretty_assertions::assert_eq;
use std::path::PathBuf;

#[test]
fn chain_orders_global_to_current() -> Result<()> {
    let fixture = TreeFixture::new()?;
    fixture.level("home")?;
    fixture.level("home/work/mono")?;
    fixture.level("home/work/mono/pkg")?;

    let workspace = fixture.open("home/work/mono/pkg")?;
    let levels: Vec<_> = workspace
        .chain()
        .levels()
        .iter()
        .map(|level| (level.rank, level.root.clone(), level.global, level.current))
        .collect();

    assert_eq!(
        levels,
        vec![
            (0, fixture.path("home"), true, false),
            (1, fixture.path("home/work/mono"), false, false),
            (2, fixture.path("home/work/mono/pkg"), false, true),
        ]
    );

    Ok(())
}

#[test]
fn global_level_has_no_parent() -> Result<()> {
    let fixture = TreeFixture::new()?;
    fixture.level("home")?;
    fixture.write("home/.ailink/commands/build.md", "build")?;

    let workspace = fixture.open("home")?;
    assert_eq!(workspace.chain().levels().len(), 1);
    assert!(workspace.chain().levels()[0].global);
    assert_eq!(workspace.resolve()?.set.items(ResourceType::Commands).count(), 1);

    Ok(())
}

#[test]
fn absent_declaration_inherits_nearest_ancestor() -> Result<()> {
    let fixture = TreeFixture::new()?;
    fixture.level("home")?;
    fixture.write("home/.ailink/commands/global.md", "global")?;
    fixture.write("home/work/mono/.ailink/commands/build.md", "mono build")?;
    fixture.write("home/work/mono/pkg/.ailink/commands/build.md", "pkg build")?;

    let workspace = fixture.open("home/work/mono/pkg")?;
    let resolution = workspace.resolve()?;
    let commands: Vec<_> = resolution
        .set
        .items(ResourceType::Commands)
        .map(|item| item.source.clone())
        .collect();

    assert_eq!(
        commands,
        vec![fixture.path("home/work/mono/.ailink/commands/build.md")]
    );

    Ok(())
}

#[test]
fn extend_concatenates_documents_and_stays_stable() -> Result<()> {
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

    let workspace = fixture.open("home/work/mono/pkg")?;
    let claude = find_consumer("claude").expect("claude is registered");

    let report = workspace.sync(&[claude], ForcePolicy::Skip)?;
    assert!(report.apply.failures.is_empty());
    assert_eq!(report.apply.generated, 1);
    assert_eq!(fixture.read("home/work/mono/pkg/CLAUDE.md")?, "A\n\nB");

    let plan = workspace.plan(&[claude])?;
    assert!(plan.is_converged());
    let report = workspace.sync(&[claude], ForcePolicy::Skip)?;
    assert_eq!(report.session, None);
    assert_eq!(fixture.read("home/work/mono/pkg/CLAUDE.md")?, "A\n\nB");

    Ok(())
}

#[test]
fn compose_takes_child_items_and_listed_parent_items() -> Result<()> {
    let fixture = TreeFixture::new()?;
    fixture.write("home/work/mono/.ailink/commands/build.md", "mono build")?;
    fixture.write("home/work/mono/.ailink/commands/lint.md", "mono lint")?;
    fixture.write("home/work/mono/.ailink/commands/deploy.md", "mono deploy")?;
    fixture.write("home/work/mono/pkg/.ailink/commands/build.md", "pkg build")?;
    fixture.write(
        "home/work/mono/pkg/.ailink/config.toml",
        indoc! {r#"
            [inherit.extends]
            commands = "compose"

            [inherit.include]
            commands = ["build", "lint", "missing"]
        "#},
    )?;

    let workspace = fixture.open("home/work/mono/pkg")?;
    let resolution = workspace.resolve()?;
    let commands: Vec<_> = resolution
        .set
        .items(ResourceType::Commands)
        .map(|item| (item.name.clone(), item.source.clone()))
        .collect();

    assert_eq!(
        commands,
        vec![
            (
                "build".to_string(),
                fixture.path("home/work/mono/pkg/.ailink/commands/build.md")
            ),
            (
                "lint".to_string(),
                fixture.path("home/work/mono/.ailink/commands/lint.md")
            ),
        ]
    );
    assert_eq!(
        resolution.set.dropped_includes,
        vec![(ResourceType::Commands, "missing".to_string())]
    );

    Ok(())
}

#[test]
fn compose_without_includes_acts_as_override() -> Result<()> {
    let fixture = TreeFixture::new()?;
    fixture.write("home/work/mono/.ailink/commands/lint.md", "mono lint")?;
    fixture.write("home/work/mono/pkg/.ailink/commands/build.md", "pkg build")?;
    fixture.write(
        "home/work/mono/pkg/.ailink/config.toml",
        indoc! {r#"
            [inherit.extends]
            commands = "compose"
        "#},
    )?;

    let workspace = fixture.open("home/work/mono/pkg")?;
    let names: Vec<_> = workspace
        .resolve()?
        .set
        .items(ResourceType::Commands)
        .map(|item| item.name.clone())
        .collect();
    assert_eq!(names, vec!["build".to_string()]);

    Ok(())
}

#[test]
fn excludes_filter_merged_items() -> Result<()> {
    let fixture = TreeFixture::new()?;
    fixture.write("home/work/mono/.ailink/AGENTS.md", "A")?;
    fixture.write("home/work/mono/.ailink/commands/build.md", "build")?;
    fixture.write("home/work/mono/.ailink/commands/tmp-scratch.md", "scratch")?;
    fixture.write(
        "home/work/mono/pkg/.ailink/config.toml",
        indoc! {r#"
            [inherit]
            exclude = ["commands/tmp-*", "AGENTS.md"]
        "#},
    )?;

    let workspace = fixture.open("home/work/mono/pkg")?;
    let resolution = workspace.resolve()?;
    let names: Vec<_> = resolution
        .set
        .items(ResourceType::Commands)
        .map(|item| item.name.clone())
        .collect();
    assert_eq!(names, vec!["build".to_string()]);
    assert_eq!(resolution.set.document, ResolvedDocument::Absent);

    Ok(())
}

#[test]
fn consumer_variant_document_takes_priority() -> Result<()> {
    let fixture = TreeFixture::new()?;
    fixture.write("home/work/mono/.ailink/AGENTS.md", "generic")?;
    fixture.write("home/work/mono/.ailink/AGENTS.claude.md", "claude only")?;
    fixture.level("home/work/mono/pkg")?;

    let workspace = fixture.open("home/work/mono/pkg")?;
    let claude = find_consumer("claude").expect("claude is registered");
    let codex = find_consumer("codex").expect("codex is registered");
    let plan = workspace.plan(&[claude, codex])?;

    let mut links: Vec<_> = plan
        .tasks
        .iter()
        .map(|task| (task.target.clone(), task.source.clone()))
        .collect();
    links.sort();

    let expected: Vec<(PathBuf, PathBuf)> = vec![
        (
            fixture.path("home/work/mono/pkg/AGENTS.md"),
            fixture.path("home/work/mono/.ailink/AGENTS.md"),
        ),
        (
            fixture.path("home/work/mono/pkg/CLAUDE.md"),
            fixture.path("home/work/mono/.ailink/AGENTS.claude.md"),
        ),
    ];
    assert_eq!(links, expected);

    Ok(())
}
