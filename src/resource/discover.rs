// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Resource discovery across chain levels.
//!
//! Lists concrete items of every chain level without looking at their content
//! beyond what is needed to confirm they are valid. Invalid items are skipped
//! and reported as warnings, never as hard errors.
//!
//! # Ordering
//!
//! Items of each resource type are ordered most distant level first, current
//! level last, and by name within one level. Later stages rely on this: the
//! last occurrence of a name is always the most specific one. Every item
//! also carries the rank of its level, so the ordering can be rebuilt from
//! scratch if ever needed.

use crate::{
    chain::{Chain, ChainLevel},
    resource::{DiscoveredDocument, DiscoveredItem, ResourceType, DOCUMENT_FILE},
};

use serde::Deserialize;
use std::{
    collections::BTreeMap,
    fs::{read_dir, read_to_string},
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::{debug, instrument, warn};

/// Descriptor file every skill bundle must carry.
pub const SKILL_DESCRIPTOR: &str = "SKILL.md";

/// Everything found across a chain.
#[derive(Debug, Default, Clone)]
pub struct Discovery {
    /// Rank of current level, if chain has one.
    pub current: Option<usize>,

    /// Instructions documents, most distant level first.
    pub documents: Vec<DiscoveredDocument>,

    /// Collection items per resource type, most distant level first.
    pub items: BTreeMap<ResourceType, Vec<DiscoveredItem>>,

    /// Items skipped for failing their structural requirement.
    pub warnings: Vec<InvalidItem>,
}

impl Discovery {
    /// Items of resource type, most distant level first.
    pub fn items(&self, kind: ResourceType) -> &[DiscoveredItem] {
        self.items.get(&kind).map(Vec::as_slice).unwrap_or_default()
    }
}

/// Collection item failing its structural requirement.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("skipped invalid {kind} item at {:?}: {reason}", path.display())]
pub struct InvalidItem {
    /// Collection the item was found in.
    pub kind: ResourceType,

    /// Path of offending entry.
    pub path: PathBuf,

    /// Why item was skipped.
    pub reason: String,
}

/// Scan chain levels for concrete resources.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResourceDiscoverer;

impl ResourceDiscoverer {
    /// Construct new resource discoverer.
    pub fn new() -> Self {
        Self
    }

    /// Discover resources of every level in chain.
    ///
    /// # Errors
    ///
    /// - Return [`DiscoverError::ReadDir`] if a resource directory exists, but
    ///   cannot be listed.
    #[instrument(skip(self, chain), level = "debug")]
    pub fn discover(&self, chain: &Chain) -> Result<Discovery> {
        let mut discovery = Discovery {
            current: chain.current().map(|level| level.rank),
            ..Default::default()
        };

        for level in chain.levels() {
            if let Some(document) = self.discover_document(level) {
                discovery.documents.push(document);
            }

            for kind in ResourceType::COLLECTIONS {
                let (items, warnings) = self.discover_items(level, kind)?;
                discovery.items.entry(kind).or_default().extend(items);
                discovery.warnings.extend(warnings);
            }
        }

        for warning in &discovery.warnings {
            warn!("{warning}");
        }

        Ok(discovery)
    }

    fn discover_document(&self, level: &ChainLevel) -> Option<DiscoveredDocument> {
        let path = level.canonical_dir().join(DOCUMENT_FILE);
        path.is_file().then(|| DiscoveredDocument {
            path,
            rank: level.rank,
        })
    }

    fn discover_items(
        &self,
        level: &ChainLevel,
        kind: ResourceType,
    ) -> Result<(Vec<DiscoveredItem>, Vec<InvalidItem>)> {
        let dir = level.canonical_dir().join(kind.key());
        let entries = match read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok((Vec::new(), Vec::new())),
            Err(err) => return Err(DiscoverError::ReadDir { source: err, path: dir }),
        };

        let mut paths = entries
            .map(|entry| entry.map(|entry| entry.path()))
            .collect::<std::io::Result<Vec<_>>>()
            .map_err(|err| DiscoverError::ReadDir {
                source: err,
                path: dir.clone(),
            })?;
        paths.sort();

        let mut found: BTreeMap<String, DiscoveredItem> = BTreeMap::new();
        let mut warnings = Vec::new();
        for path in paths {
            let Some(file_name) = path.file_name().map(|name| name.to_string_lossy().into_owned())
            else {
                continue;
            };

            // INVARIANT: Hidden entries are never items.
            if file_name.starts_with('.') {
                continue;
            }

            let name = match validate(kind, &path) {
                Ok(name) => name,
                Err(reason) => {
                    warnings.push(InvalidItem { kind, path, reason });
                    continue;
                }
            };

            if found.contains_key(&name) {
                warnings.push(InvalidItem {
                    kind,
                    path,
                    reason: format!("duplicate item name {name:?} in same level"),
                });
                continue;
            }

            debug!("discovered {kind}/{name} at rank {}", level.rank);
            found.insert(
                name.clone(),
                DiscoveredItem {
                    kind,
                    name,
                    source: path,
                    rank: level.rank,
                },
            );
        }

        Ok((found.into_values().collect(), warnings))
    }
}

/// Check structural requirement of item, returning its name.
fn validate(kind: ResourceType, path: &Path) -> std::result::Result<String, String> {
    match kind {
        ResourceType::Skills => {
            if !path.is_dir() {
                return Err("skill must be a directory".into());
            }
            validate_skill_descriptor(&path.join(SKILL_DESCRIPTOR))?;
            file_name(path)
        }
        ResourceType::Commands | ResourceType::Hooks => {
            if !path.is_file() {
                return Err(format!("{kind} item must be a file"));
            }
            file_stem(path)
        }
        ResourceType::Instructions => Err("instructions document is not a collection".into()),
    }
}

fn file_name(path: &Path) -> std::result::Result<String, String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_owned)
        .ok_or_else(|| "item name is not valid UTF-8".into())
}

fn file_stem(path: &Path) -> std::result::Result<String, String> {
    path.file_stem()
        .and_then(|name| name.to_str())
        .map(str::to_owned)
        .ok_or_else(|| "item name is not valid UTF-8".into())
}

#[derive(Debug, Default, Deserialize)]
struct SkillFrontmatter {
    name: Option<String>,
    description: Option<String>,
}

/// Skill descriptor must open with YAML frontmatter naming and describing the
/// skill.
fn validate_skill_descriptor(path: &Path) -> std::result::Result<(), String> {
    let content = read_to_string(path).map_err(|err| match err.kind() {
        ErrorKind::NotFound => format!("missing {SKILL_DESCRIPTOR}"),
        _ => format!("cannot read {SKILL_DESCRIPTOR}: {err}"),
    })?;

    let frontmatter = extract_frontmatter(&content)
        .ok_or_else(|| format!("{SKILL_DESCRIPTOR} has no frontmatter block"))?;
    let fields: SkillFrontmatter = serde_yaml::from_str(frontmatter)
        .map_err(|err| format!("{SKILL_DESCRIPTOR} frontmatter is invalid: {err}"))?;

    for (field, value) in [("name", &fields.name), ("description", &fields.description)] {
        if value.as_deref().map(str::trim).unwrap_or_default().is_empty() {
            return Err(format!("{SKILL_DESCRIPTOR} frontmatter lacks {field:?}"));
        }
    }

    Ok(())
}

fn extract_frontmatter(content: &str) -> Option<&str> {
    let rest = content
        .strip_prefix("---\n")
        .or_else(|| content.strip_prefix("---\r\n"))?;

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            return Some(&rest[..offset]);
        }
        offset += line.len();
    }

    None
}

/// Resource discovery error types.
#[derive(Debug, thiserror::Error)]
pub enum DiscoverError {
    /// Resource directory cannot be listed.
    #[error("failed to list resource directory {:?}", path.display())]
    ReadDir {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
type Result<T, E = DiscoverError> = std::result::Result<T, E>;
