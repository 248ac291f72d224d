// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Inheritance chain discovery.
//!
//! A __chain__ is the ordered list of directories hosting a canonical folder,
//! from the global root down to the starting directory. Directories without a
//! canonical folder are skipped rather than inserted as empty levels.
//!
//! # Ranks
//!
//! Each level is given a __rank__. The most distant level gets rank 0, and
//! ranks strictly increase toward the starting directory. Missing
//! configuration is never an error here. A chain without a current level
//! simply tells the caller that the starting directory needs initialization.

use crate::path::{canonical_dir, hosts_canonical_dir};

use std::{
    fs::canonicalize,
    path::{Path, PathBuf},
};
use tracing::{debug, instrument};

/// One configuration root in the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainLevel {
    /// Absolute path of directory hosting canonical folder.
    pub root: PathBuf,

    /// Position in chain, zero being the most distant level.
    pub rank: usize,

    /// Level matches the starting directory.
    pub current: bool,

    /// Level is the global root.
    pub global: bool,
}

impl ChainLevel {
    /// Path to canonical folder of level.
    pub fn canonical_dir(&self) -> PathBuf {
        canonical_dir(&self.root)
    }
}

/// Ordered inheritance chain.
///
/// # Invariants
///
/// - Ranks strictly increase from global root to current level.
/// - Current level, if any, is the last level.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Chain {
    levels: Vec<ChainLevel>,
}

impl Chain {
    /// All levels, most distant first.
    pub fn levels(&self) -> &[ChainLevel] {
        self.levels.as_slice()
    }

    /// Level being resolved.
    pub fn current(&self) -> Option<&ChainLevel> {
        self.levels.last().filter(|level| level.current)
    }

    /// Levels above current level, most distant first.
    ///
    /// Every level counts as an ancestor when there is no current level.
    pub fn ancestors(&self) -> &[ChainLevel] {
        match self.current() {
            Some(_) => &self.levels[..self.levels.len() - 1],
            None => self.levels.as_slice(),
        }
    }

    /// Check if current level has anything to inherit from.
    pub fn has_parent(&self) -> bool {
        self.current().is_some() && self.levels.len() > 1
    }

    /// Check if no level was found.
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Canonical folders of every level.
    pub fn canonical_dirs(&self) -> Vec<PathBuf> {
        self.levels.iter().map(ChainLevel::canonical_dir).collect()
    }
}

/// Build inheritance chains by walking parent directories.
#[derive(Debug, Default, Clone)]
pub struct ChainResolver {
    global_root: Option<PathBuf>,
}

impl ChainResolver {
    /// Construct new chain resolver.
    ///
    /// The global root is the directory hosting the user-wide canonical
    /// folder. Passing `None` disables global configuration.
    pub fn new(global_root: Option<PathBuf>) -> Self {
        Self { global_root }
    }

    /// Resolve chain for starting directory.
    ///
    /// Walks from starting directory up to the filesystem root, or up to the
    /// global root if it is reached first. The global root is still placed at
    /// the top of the chain when the starting directory lives outside of it.
    ///
    /// # Errors
    ///
    /// - Return [`ChainError::Canonicalize`] if the starting directory cannot
    ///   be resolved to an absolute path.
    #[instrument(skip(self, start), level = "debug")]
    pub fn resolve(&self, start: impl AsRef<Path>) -> Result<Chain> {
        let start = canonicalize(start.as_ref()).map_err(|err| ChainError::Canonicalize {
            source: err,
            path: start.as_ref().to_path_buf(),
        })?;

        // INVARIANT: Global root compared in canonical form, it may not exist.
        let global = self
            .global_root
            .as_ref()
            .map(|path| canonicalize(path).unwrap_or_else(|_| path.clone()));

        let mut roots = Vec::new();
        let mut reached_global = false;
        for dir in start.ancestors() {
            if hosts_canonical_dir(dir) {
                debug!("found canonical folder at {:?}", dir.display());
                roots.push(dir.to_path_buf());
            }

            if global.as_deref() == Some(dir) {
                reached_global = true;
                break;
            }
        }

        if !reached_global {
            if let Some(global) = global.as_ref().filter(|path| hosts_canonical_dir(path)) {
                debug!("found global canonical folder at {:?}", global.display());
                roots.push(global.clone());
            }
        }

        roots.reverse();
        let levels = roots
            .into_iter()
            .enumerate()
            .map(|(rank, root)| ChainLevel {
                current: root == start,
                global: global.as_ref() == Some(&root),
                root,
                rank,
            })
            .collect();

        Ok(Chain { levels })
    }
}

/// Chain resolution error types.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    /// Starting directory cannot be resolved.
    #[error("failed to resolve starting directory {:?}", path.display())]
    Canonicalize {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
type Result<T, E = ChainError> = std::result::Result<T, E>;
