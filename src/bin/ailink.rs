// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use ailink::{
    link::{Plan, TaskKind},
    merge::ResolvedDocument,
    path::{default_global_root, expand_path},
    resource::ResourceType,
    select_consumers,
    transaction::ForcePolicy,
    Workspace,
};

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use inquire::Confirm;
use std::{
    io::{stdin, IsTerminal},
    path::PathBuf,
    process::exit,
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "ailink [options] <ailink-command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Directory to resolve instead of the current directory.
    #[arg(short = 'C', long, global = true, value_name = "path")]
    pub dir: Option<PathBuf>,

    /// Directory hosting the user-wide canonical folder.
    #[arg(long, global = true, value_name = "path")]
    pub global_root: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<()> {
        let workspace = self.open_workspace()?;
        match self.command {
            Command::Sync(opts) => run_sync(&workspace, opts),
            Command::Status(opts) => run_status(&workspace, opts),
            Command::Undo => run_undo(&workspace),
            Command::History => run_history(&workspace),
            Command::Chain => run_chain(&workspace),
            Command::Resolve => run_resolve(&workspace),
        }
    }

    fn open_workspace(&self) -> Result<Workspace> {
        let start = match &self.dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()?,
        };

        let global_root = match &self.global_root {
            Some(path) => Some(expand_path(path)?),
            None => match default_global_root() {
                Ok(path) => Some(path),
                Err(error) => {
                    warn!("{error}, global configuration disabled");
                    None
                }
            },
        };

        Ok(Workspace::open(start, global_root)?)
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Link resources of current level into consumer paths.
    #[command(override_usage = "ailink sync [options]")]
    Sync(SyncOptions),

    /// Show what sync would change.
    #[command(override_usage = "ailink status [options]")]
    Status(ClientOptions),

    /// Revert most recent sync of current level.
    Undo,

    /// List backup sessions of current level.
    History,

    /// Show inheritance chain of current level.
    Chain,

    /// Show resolved resources of current level.
    Resolve,
}

#[derive(Args, Clone, Debug)]
struct ClientOptions {
    /// Consumers to manage, defaults to every registered consumer.
    #[arg(short, long = "client", value_name = "name")]
    pub clients: Vec<String>,
}

#[derive(Args, Clone, Debug)]
struct SyncOptions {
    #[command(flatten)]
    pub clients: ClientOptions,

    /// Back up and replace conflicting files without asking.
    #[arg(short, long)]
    pub force: bool,

    /// Only show planned changes.
    #[arg(short = 'n', long)]
    pub dry_run: bool,
}

fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_timer(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run() {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

fn run() -> Result<()> {
    Cli::parse().run()
}

fn run_sync(workspace: &Workspace, opts: SyncOptions) -> Result<()> {
    let consumers = select_consumers(&opts.clients.clients)?;
    let plan = workspace.plan(&consumers)?;

    if opts.dry_run {
        print_plan(&plan);
        return Ok(());
    }

    if plan.is_converged() {
        info!("already in sync");
        return Ok(());
    }

    let force = if opts.force {
        ForcePolicy::Overwrite
    } else if !plan.conflicts.is_empty() && stdin().is_terminal() {
        for conflict in &plan.conflicts {
            warn!("{conflict}");
        }

        let overwrite = Confirm::new("Back up and replace conflicting paths?")
            .with_default(false)
            .with_help_message("originals can be restored with `ailink undo`")
            .prompt()?;
        if overwrite {
            ForcePolicy::Overwrite
        } else {
            ForcePolicy::Skip
        }
    } else {
        ForcePolicy::Skip
    };

    let report = workspace.apply(plan, force)?;
    for conflict in &report.apply.conflicts {
        warn!("skipped {conflict}, rerun with --force to replace it");
    }
    for failure in &report.apply.failures {
        error!("{:?}: {}", failure.target.display(), failure.error);
    }
    if let Some(session) = &report.session {
        info!("backup session {session} recorded");
    }

    if !report.apply.failures.is_empty() {
        anyhow::bail!("{} tasks failed", report.apply.failures.len());
    }

    Ok(())
}

fn run_status(workspace: &Workspace, opts: ClientOptions) -> Result<()> {
    let consumers = select_consumers(&opts.clients)?;
    let plan = workspace.plan(&consumers)?;
    print_plan(&plan);
    Ok(())
}

fn run_undo(workspace: &Workspace) -> Result<()> {
    let report = workspace.undo()?;
    for failure in &report.failures {
        warn!("{:?}: {}", failure.target.display(), failure.error);
    }
    info!(
        "undid session {}: {} restored, {} removed",
        report.session, report.restored, report.removed
    );
    Ok(())
}

fn run_history(workspace: &Workspace) -> Result<()> {
    for session in workspace.sessions()? {
        println!(
            "{}  {:<9}  {} entries",
            session.id,
            format!("{:?}", session.state).to_lowercase(),
            session.entries.len()
        );
    }
    Ok(())
}

fn run_chain(workspace: &Workspace) -> Result<()> {
    for level in workspace.chain().levels() {
        let marker = match (level.global, level.current) {
            (true, _) => " (global)",
            (_, true) => " (current)",
            _ => "",
        };
        println!("{}  {}{marker}", level.rank, level.root.display());
    }
    Ok(())
}

fn run_resolve(workspace: &Workspace) -> Result<()> {
    let resolution = workspace.resolve()?;
    let config = workspace.config();

    println!(
        "{} [{}]:",
        ResourceType::Instructions,
        config.behavior(ResourceType::Instructions)
    );
    match &resolution.set.document {
        ResolvedDocument::Absent => {}
        ResolvedDocument::Single(document) => println!("  {}", document.path.display()),
        ResolvedDocument::Concatenated { parent, child } => {
            println!("  {}", parent.path.display());
            println!("  {}", child.path.display());
        }
    }
    for kind in ResourceType::COLLECTIONS {
        println!("{kind} [{}]:", config.behavior(kind));
        for item in resolution.set.items(kind) {
            println!("  {}  {}", item.name, item.source.display());
        }
    }
    for (kind, name) in &resolution.set.dropped_includes {
        warn!("include {kind}/{name} matched no ancestor item");
    }

    Ok(())
}

fn print_plan(plan: &Plan) {
    for task in plan.tasks.iter().filter(|task| task.kind != TaskKind::Noop) {
        println!(
            "{:<12} {} -> {}",
            task.kind.to_string(),
            task.target.display(),
            task.source.display()
        );
    }
    for generated in plan.generated.iter().filter(|generated| !generated.up_to_date) {
        println!("{:<12} {}", "generate", generated.path.display());
    }
    for conflict in &plan.conflicts {
        println!("{:<12} {}", "conflict", conflict);
    }
    if plan.is_converged() {
        println!("in sync");
    }
}
