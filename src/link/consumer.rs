// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Consumer registry.
//!
//! A __consumer__ is an external tool whose configuration directory receives
//! symlinks from the canonical folder. Every consumer declares where each
//! resource type should land, once for project levels and once for the
//! global root. Paths are relative to the level's directory.

use crate::resource::ResourceType;

use std::path::{Path, PathBuf};

/// Target path templates of one consumer for one scope.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Targets {
    /// Path of linked instructions document.
    pub instructions: Option<&'static str>,

    /// Directory receiving command links.
    pub commands: Option<&'static str>,

    /// Directory receiving skill links.
    pub skills: Option<&'static str>,

    /// Directory receiving hook links.
    pub hooks: Option<&'static str>,
}

impl Targets {
    /// Target template of resource type.
    pub fn get(&self, kind: ResourceType) -> Option<&'static str> {
        match kind {
            ResourceType::Instructions => self.instructions,
            ResourceType::Commands => self.commands,
            ResourceType::Skills => self.skills,
            ResourceType::Hooks => self.hooks,
        }
    }
}

/// External tool managed through symlinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Consumer {
    /// Unique consumer name.
    pub name: &'static str,

    /// Targets used at project levels.
    pub project: Targets,

    /// Targets used at the global root.
    pub global: Targets,
}

impl Consumer {
    /// Resolve target path of resource type at level directory.
    ///
    /// Returns `None` when consumer does not take resource type in scope.
    pub fn target(&self, root: &Path, global: bool, kind: ResourceType) -> Option<PathBuf> {
        let targets = if global { &self.global } else { &self.project };
        targets.get(kind).map(|template| root.join(template))
    }
}

static REGISTRY: [Consumer; 4] = [
    Consumer {
        name: "claude",
        project: Targets {
            instructions: Some("CLAUDE.md"),
            commands: Some(".claude/commands"),
            skills: Some(".claude/skills"),
            hooks: Some(".claude/hooks"),
        },
        global: Targets {
            instructions: Some(".claude/CLAUDE.md"),
            commands: Some(".claude/commands"),
            skills: Some(".claude/skills"),
            hooks: Some(".claude/hooks"),
        },
    },
    Consumer {
        name: "codex",
        project: Targets {
            instructions: Some("AGENTS.md"),
            commands: Some(".codex/prompts"),
            skills: Some(".codex/skills"),
            hooks: None,
        },
        global: Targets {
            instructions: Some(".codex/AGENTS.md"),
            commands: Some(".codex/prompts"),
            skills: Some(".codex/skills"),
            hooks: None,
        },
    },
    Consumer {
        name: "gemini",
        project: Targets {
            instructions: Some("GEMINI.md"),
            commands: Some(".gemini/commands"),
            skills: None,
            hooks: None,
        },
        global: Targets {
            instructions: Some(".gemini/GEMINI.md"),
            commands: Some(".gemini/commands"),
            skills: None,
            hooks: None,
        },
    },
    Consumer {
        name: "cursor",
        project: Targets {
            instructions: Some(".cursor/rules/ailink.mdc"),
            commands: Some(".cursor/commands"),
            skills: None,
            hooks: None,
        },
        global: Targets {
            instructions: None,
            commands: Some(".cursor/commands"),
            skills: None,
            hooks: None,
        },
    },
];

/// Every registered consumer.
pub fn registry() -> &'static [Consumer] {
    &REGISTRY
}

/// Look up consumer by name.
pub fn find(name: &str) -> Option<&'static Consumer> {
    REGISTRY.iter().find(|consumer| consumer.name == name)
}
