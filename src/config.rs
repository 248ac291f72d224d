// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Inheritance declaration layout and resolution.
//!
//! Every chain level may carry a __declaration__ in `.ailink/config.toml`
//! that states how each resource type relates to the levels above it. The
//! declaration is normalized into a [`ResolvedConfig`]: one
//! [`ExtendBehavior`] per resource type, plus the include and exclude lists
//! used by the merge engine.
//!
//! # Declaration Layout
//!
//! TOML cannot hold a bare boolean document, so the declaration is the value
//! of the top-level `inherit` key. It is either a boolean, or a table:
//!
//! ```toml
//! [inherit]
//! exclude = ["commands/tmp-*"]
//!
//! [inherit.extends]
//! default = "extend"
//! commands = "compose"
//!
//! [inherit.include]
//! commands = ["build", "lint"]
//! ```
//!
//! The `extends` key is itself a boolean or a per-resource table with an
//! optional `default` entry. A boolean `extends` means the same thing as a
//! boolean declaration.

use crate::{chain::ChainLevel, resource::ResourceType};

use glob::{MatchOptions, Pattern};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::{Display, Formatter, Result as FmtResult},
    fs::read_to_string,
    io::ErrorKind,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::{debug, instrument};

/// File name of declaration inside a canonical folder.
pub const CONFIG_FILE: &str = "config.toml";

/// Per-resource merge policy.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtendBehavior {
    /// Use nearest ancestor's resource verbatim, ignore child.
    #[default]
    Inherit,

    /// Concatenate documents, union collections with child winning.
    Extend,

    /// Use only child's resource.
    Override,

    /// Child's resource plus explicitly included ancestor items.
    Compose,
}

impl Display for ExtendBehavior {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(match self {
            Self::Inherit => "inherit",
            Self::Extend => "extend",
            Self::Override => "override",
            Self::Compose => "compose",
        })
    }
}

/// Raw layout of `config.toml`.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct ConfigFile {
    /// Inheritance declaration of level.
    pub inherit: Option<Declaration>,
}

impl FromStr for ConfigFile {
    type Err = toml::de::Error;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        toml::from_str(data)
    }
}

/// Inheritance declaration of one level.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Declaration {
    /// `true` inherits everything, `false` overrides everything.
    Bool(bool),

    /// Detailed declaration.
    Table(DeclarationTable),
}

/// Detailed inheritance declaration.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DeclarationTable {
    /// Behavior per resource type.
    pub extends: Option<Extends>,

    /// Ancestor items to pull in under `compose`.
    pub include: Option<IncludeTable>,

    /// Patterns removing items after merge.
    pub exclude: Option<Vec<String>>,
}

/// Value of `extends` key.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Extends {
    /// Same meaning as a boolean declaration.
    Bool(bool),

    /// Explicit behavior per resource type.
    PerResource(BehaviorTable),
}

/// Explicit behavior per resource type, with optional fallback.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BehaviorTable {
    pub default: Option<ExtendBehavior>,
    pub instructions: Option<ExtendBehavior>,
    pub commands: Option<ExtendBehavior>,
    pub skills: Option<ExtendBehavior>,
    pub hooks: Option<ExtendBehavior>,
}

impl BehaviorTable {
    fn explicit(&self, kind: ResourceType) -> Option<ExtendBehavior> {
        match kind {
            ResourceType::Instructions => self.instructions,
            ResourceType::Commands => self.commands,
            ResourceType::Skills => self.skills,
            ResourceType::Hooks => self.hooks,
        }
    }
}

/// Include lists per collection resource type.
///
/// The instructions document is a singleton, so it cannot be listed here.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct IncludeTable {
    pub commands: Option<Vec<String>>,
    pub skills: Option<Vec<String>>,
    pub hooks: Option<Vec<String>>,
}

impl IncludeTable {
    fn names(&self, kind: ResourceType) -> Option<&Vec<String>> {
        match kind {
            ResourceType::Instructions => None,
            ResourceType::Commands => self.commands.as_ref(),
            ResourceType::Skills => self.skills.as_ref(),
            ResourceType::Hooks => self.hooks.as_ref(),
        }
    }
}

/// Effective configuration of one chain level.
///
/// A pure function of the level's declaration and whether the level has a
/// parent. Recomputed on every run, never persisted.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    behaviors: BTreeMap<ResourceType, ExtendBehavior>,
    include: BTreeMap<ResourceType, BTreeSet<String>>,
    exclude: ExcludeRules,
}

impl ResolvedConfig {
    /// Normalize a declaration.
    ///
    /// # Invariants
    ///
    /// - Absent declaration inherits everything.
    /// - `compose` with an empty include list degrades to `override` for
    ///   collections.
    /// - Include lists only survive for `compose` collections.
    /// - Without a parent level every resource type is `override`.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Pattern`] if an exclude pattern is invalid.
    pub fn from_declaration(declaration: Option<&Declaration>, has_parent: bool) -> Result<Self> {
        let (extends, include, exclude) = match declaration {
            None => (None, None, None),
            Some(Declaration::Bool(value)) => (Some(Extends::Bool(*value)), None, None),
            Some(Declaration::Table(table)) => (
                table.extends.clone(),
                table.include.clone(),
                table.exclude.clone(),
            ),
        };

        let mut behaviors = BTreeMap::new();
        let mut includes = BTreeMap::new();
        for kind in ResourceType::ALL {
            let mut behavior = match &extends {
                None | Some(Extends::Bool(true)) => ExtendBehavior::Inherit,
                Some(Extends::Bool(false)) => ExtendBehavior::Override,
                Some(Extends::PerResource(table)) => table
                    .explicit(kind)
                    .or(table.default)
                    .unwrap_or(ExtendBehavior::Inherit),
            };

            let names: BTreeSet<String> = include
                .as_ref()
                .and_then(|table| table.names(kind))
                .map(|names| names.iter().cloned().collect())
                .unwrap_or_default();

            if behavior == ExtendBehavior::Compose && kind.is_collection() {
                if names.is_empty() {
                    debug!("{kind} compose without include list, using override");
                    behavior = ExtendBehavior::Override;
                } else {
                    includes.insert(kind, names);
                }
            } else if !names.is_empty() {
                debug!("{kind} include list ignored under {behavior}");
            }

            // INVARIANT: Nothing to inherit from without a parent.
            if !has_parent {
                behavior = ExtendBehavior::Override;
            }

            behaviors.insert(kind, behavior);
        }

        if !has_parent {
            includes.clear();
        }

        Ok(Self {
            behaviors,
            include: includes,
            exclude: ExcludeRules::new(exclude.unwrap_or_default())?,
        })
    }

    /// Effective behavior of resource type.
    pub fn behavior(&self, kind: ResourceType) -> ExtendBehavior {
        self.behaviors.get(&kind).copied().unwrap_or_default()
    }

    /// Ancestor item names to pull in for resource type.
    ///
    /// Always empty unless behavior is `compose`.
    pub fn include(&self, kind: ResourceType) -> impl Iterator<Item = &str> {
        self.include
            .get(&kind)
            .into_iter()
            .flat_map(|names| names.iter().map(String::as_str))
    }

    /// Exclude rules applied after merge.
    pub fn exclude(&self) -> &ExcludeRules {
        &self.exclude
    }
}

/// Load and normalize declarations of chain levels.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConfigResolver;

impl ConfigResolver {
    /// Construct new config resolver.
    pub fn new() -> Self {
        Self
    }

    /// Resolve effective configuration of chain level.
    ///
    /// A level has a parent if and only if its rank is above zero.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Read`] if declaration exists, but cannot be
    ///   read.
    /// - Return [`ConfigError::Malformed`] if declaration does not match any
    ///   accepted shape.
    /// - Return [`ConfigError::Pattern`] if an exclude pattern is invalid.
    #[instrument(skip(self, level), fields(root = %level.root.display()), level = "debug")]
    pub fn resolve(&self, level: &ChainLevel) -> Result<ResolvedConfig> {
        let declaration = self.load(level.canonical_dir().join(CONFIG_FILE))?;
        ResolvedConfig::from_declaration(declaration.as_ref(), level.rank > 0)
    }

    /// Load declaration from target file.
    ///
    /// Missing file means no declaration.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Read`] if file cannot be read.
    /// - Return [`ConfigError::Malformed`] if file cannot be parsed.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<Option<Declaration>> {
        let path = path.as_ref();
        let content = match read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(ConfigError::Read {
                    source: err,
                    path: path.to_path_buf(),
                })
            }
        };

        let file: ConfigFile = content.parse().map_err(|err| ConfigError::Malformed {
            source: err,
            path: path.to_path_buf(),
        })?;

        Ok(file.inherit)
    }
}

/// Exclude patterns applied after merge.
///
/// Each pattern is a glob matched against an item's logical path, or against
/// any trailing run of its components. Thus, `tmp-*` excludes
/// `commands/tmp-scratch`, and `commands/*` excludes every command.
#[derive(Debug, Default, Clone)]
pub struct ExcludeRules {
    patterns: Vec<Pattern>,
}

impl ExcludeRules {
    /// Compile exclude patterns.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Pattern`] if a pattern is invalid.
    pub fn new(patterns: impl IntoIterator<Item = impl AsRef<str>>) -> Result<Self> {
        let patterns = patterns
            .into_iter()
            .filter(|pattern| !pattern.as_ref().trim().is_empty())
            .map(|pattern| {
                let pattern = pattern.as_ref().trim().trim_matches('/');
                Pattern::new(pattern).map_err(|err| ConfigError::Pattern {
                    source: err,
                    pattern: pattern.to_string(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { patterns })
    }

    /// Check if no patterns were given.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Check if logical path should be excluded.
    pub fn is_excluded(&self, logical_path: &str) -> bool {
        let options = MatchOptions {
            require_literal_separator: true,
            ..MatchOptions::new()
        };
        let components: Vec<&str> = logical_path.split('/').collect();

        (0..components.len()).any(|start| {
            let suffix = components[start..].join("/");
            self.patterns
                .iter()
                .any(|pattern| pattern.matches_with(&suffix, options))
        })
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Declaration file cannot be read.
    #[error("failed to read declaration at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Declaration does not match any accepted shape.
    #[error("malformed declaration at {:?}", path.display())]
    Malformed {
        #[source]
        source: toml::de::Error,
        path: PathBuf,
    },

    /// Exclude pattern is not a valid glob.
    #[error("invalid exclude pattern {pattern:?}")]
    Pattern {
        #[source]
        source: glob::PatternError,
        pattern: String,
    },
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
