// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Hierarchical AI tool configuration through symlinks.
//!
//! Ailink keeps agent instructions, commands, skills, and hooks in one
//! __canonical folder__ named `.ailink` per directory. Directories nest, so a
//! monorepo package can inherit from the monorepo root, which in turn inherits
//! from the user's home directory. Each level decides per resource type how
//! much of its parent it takes through a small declaration in
//! `.ailink/config.toml`.
//!
//! The final resource set of a level is exposed to every supported AI tool,
//! called a __consumer__, by symlinking it into that tool's own configuration
//! paths. Every change is recorded in a backup session first, so a sync can
//! always be undone.
//!
//! # See Also
//!
//! 1. [`chain`]
//! 2. [`config`]
//! 3. [`resource`]
//! 4. [`merge`]
//! 5. [`link`]
//! 6. [`transaction`]
//! 7. [`workspace`]

pub mod chain;
pub mod config;
pub mod link;
pub mod merge;
pub mod path;
pub mod resource;
pub mod transaction;
pub mod workspace;

pub use workspace::{select_consumers, Resolution, SyncReport, Workspace, WorkspaceError};
