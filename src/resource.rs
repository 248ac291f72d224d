// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Manageable resources of a canonical folder.
//!
//! A canonical folder holds four kinds of __resources__: one singleton
//! instructions document, and three collections of named items (commands,
//! skills, and hooks). Each chain level may supply any of them.
//!
//! # Canonical Folder Layout
//!
//! ```text
//! .ailink/
//! ├── AGENTS.md            # generic instructions document
//! ├── AGENTS.claude.md     # client-specific document variant
//! ├── config.toml          # inheritance declaration
//! ├── commands/<name>.md   # one command per file
//! ├── skills/<name>/SKILL.md
//! └── hooks/<name>
//! ```
//!
//! Item names are unique within one level, but may repeat across levels.
//! What happens to a repeated name is decided by the merge engine.
//!
//! # See Also
//!
//! 1. [`discover`]
//! 2. [`crate::merge`]

pub mod discover;

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    str::FromStr,
};

/// File name of generic instructions document.
pub const DOCUMENT_FILE: &str = "AGENTS.md";

/// Category of manageable content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    /// Singleton instructions document.
    Instructions,

    /// Named command files.
    Commands,

    /// Named skill bundles.
    Skills,

    /// Named hook files.
    Hooks,
}

impl ResourceType {
    /// Every resource type.
    pub const ALL: [ResourceType; 4] = [
        ResourceType::Instructions,
        ResourceType::Commands,
        ResourceType::Skills,
        ResourceType::Hooks,
    ];

    /// Resource types holding named items.
    pub const COLLECTIONS: [ResourceType; 3] = [
        ResourceType::Commands,
        ResourceType::Skills,
        ResourceType::Hooks,
    ];

    /// Key used for resource type in declarations and logical paths.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Instructions => "instructions",
            Self::Commands => "commands",
            Self::Skills => "skills",
            Self::Hooks => "hooks",
        }
    }

    /// Check if resource type holds named items.
    pub fn is_collection(&self) -> bool {
        !matches!(self, Self::Instructions)
    }
}

impl Display for ResourceType {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.key())
    }
}

impl FromStr for ResourceType {
    type Err = UnknownResourceType;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        ResourceType::ALL
            .into_iter()
            .find(|kind| kind.key() == data)
            .ok_or_else(|| UnknownResourceType(data.to_string()))
    }
}

/// Resource type name is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown resource type {0:?}")]
pub struct UnknownResourceType(pub String);

/// Concrete collection item found at one chain level.
///
/// Never mutated after discovery.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DiscoveredItem {
    /// Collection the item belongs to.
    pub kind: ResourceType,

    /// Item name, unique within its level.
    pub name: String,

    /// Absolute path to item file or directory.
    pub source: PathBuf,

    /// Rank of originating chain level.
    pub rank: usize,
}

impl DiscoveredItem {
    /// Logical path of item, e.g., `commands/build`.
    ///
    /// Exclude patterns are matched against this.
    pub fn logical_path(&self) -> String {
        format!("{}/{}", self.kind.key(), self.name)
    }

    /// File name to use when linking item into a consumer directory.
    pub fn link_name(&self) -> &Path {
        self.source
            .file_name()
            .map(Path::new)
            .unwrap_or_else(|| Path::new(self.name.as_str()))
    }
}

/// Instructions document found at one chain level.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DiscoveredDocument {
    /// Absolute path to generic document.
    pub path: PathBuf,

    /// Rank of originating chain level.
    pub rank: usize,
}

impl DiscoveredDocument {
    /// Path of document variant specific to one consumer.
    pub fn variant_path(&self, consumer: &str) -> PathBuf {
        let stem = DOCUMENT_FILE.trim_end_matches(".md");
        self.path.with_file_name(format!("{stem}.{consumer}.md"))
    }

    /// Document file a consumer should read.
    ///
    /// Client-specific variant takes precedence over the generic document
    /// when it exists at the same level.
    pub fn source_for(&self, consumer: &str) -> PathBuf {
        let variant = self.variant_path(consumer);
        if variant.is_file() {
            variant
        } else {
            self.path.clone()
        }
    }
}
