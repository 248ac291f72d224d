// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Combine discovered resources into one effective set.
//!
//! The merge engine takes everything discovered across a chain, and the
//! current level's [`ResolvedConfig`], and decides which item wins for every
//! name of every resource type.
//!
//! # Behaviors
//!
//! - `inherit`: only the nearest ancestor that has items of the type.
//! - `override`: only the current level.
//! - `extend`: union of ancestors, current level overlaid on top. Documents
//!   are concatenated, ancestor first.
//! - `compose`: current level, plus ancestor items named in the include list.
//!   Documents behave exactly like `extend`.
//!
//! Exclude patterns are applied last, whatever behavior produced an item.

use crate::{
    config::{ExtendBehavior, ResolvedConfig},
    resource::{
        discover::Discovery, DiscoveredDocument, DiscoveredItem, ResourceType, DOCUMENT_FILE,
    },
};

use std::{
    collections::BTreeMap,
    fs::read_to_string,
    path::PathBuf,
};
use tracing::{debug, instrument, warn};

/// Separator placed between concatenated document bodies.
pub const DOCUMENT_SEPARATOR: &str = "\n\n";

/// Final resources of current level.
///
/// Owned by one resolution run, never cached.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ResolvedResourceSet {
    /// Resolved instructions document.
    pub document: ResolvedDocument,

    /// Winning item per name, per collection resource type.
    pub collections: BTreeMap<ResourceType, BTreeMap<String, DiscoveredItem>>,

    /// Include list entries no ancestor could satisfy.
    pub dropped_includes: Vec<(ResourceType, String)>,
}

impl ResolvedResourceSet {
    /// Winning items of collection resource type, ordered by name.
    pub fn items(&self, kind: ResourceType) -> impl Iterator<Item = &DiscoveredItem> {
        self.collections
            .get(&kind)
            .into_iter()
            .flat_map(|items| items.values())
    }

    /// Winning item by name.
    pub fn item(&self, kind: ResourceType, name: &str) -> Option<&DiscoveredItem> {
        self.collections.get(&kind).and_then(|items| items.get(name))
    }
}

/// Resolved instructions document.
///
/// Keeps references to the supplying files instead of their content. Which
/// file a consumer reads is only known once its client-specific variant has
/// been checked, so content is rendered per consumer.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub enum ResolvedDocument {
    /// No level supplies a document.
    #[default]
    Absent,

    /// One level supplies the whole document.
    Single(DiscoveredDocument),

    /// Ancestor body followed by current level body.
    Concatenated {
        parent: DiscoveredDocument,
        child: DiscoveredDocument,
    },
}

impl ResolvedDocument {
    /// Render document for one consumer.
    ///
    /// A single supplying file is returned as a path, so it can be linked
    /// directly without writing anything.
    ///
    /// # Errors
    ///
    /// - Return [`std::io::Error`] if a concatenated part cannot be read.
    pub fn render(&self, consumer: &str) -> std::io::Result<Option<RenderedDocument>> {
        match self {
            Self::Absent => Ok(None),
            Self::Single(document) => Ok(Some(RenderedDocument::File(
                document.source_for(consumer),
            ))),
            Self::Concatenated { parent, child } => {
                let parent = read_to_string(parent.source_for(consumer))?;
                let child = read_to_string(child.source_for(consumer))?;
                Ok(Some(RenderedDocument::Content(concatenate(&parent, &child))))
            }
        }
    }
}

/// Document as one consumer should see it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderedDocument {
    /// Link straight to existing file.
    File(PathBuf),

    /// Generated content that must be written first.
    Content(String),
}

/// Concatenate parent and child document bodies.
///
/// Trailing newlines of the parent are folded into the separator, so repeated
/// resolution of unchanged inputs always yields the same bytes.
pub fn concatenate(parent: &str, child: &str) -> String {
    let parent = parent.trim_end_matches(['\n', '\r']);
    let mut out = String::with_capacity(parent.len() + DOCUMENT_SEPARATOR.len() + child.len());
    out.push_str(parent);
    out.push_str(DOCUMENT_SEPARATOR);
    out.push_str(child);
    out
}

/// Merge discovered resources according to resolved behaviors.
#[derive(Debug, Default, Clone, Copy)]
pub struct MergeEngine;

impl MergeEngine {
    /// Construct new merge engine.
    pub fn new() -> Self {
        Self
    }

    /// Produce final resource set of current level.
    #[instrument(skip(self, discovery, config), level = "debug")]
    pub fn merge(&self, discovery: &Discovery, config: &ResolvedConfig) -> ResolvedResourceSet {
        let mut set = ResolvedResourceSet {
            document: self.merge_document(discovery, config.behavior(ResourceType::Instructions)),
            ..Default::default()
        };

        for kind in ResourceType::COLLECTIONS {
            let items = discovery.items(kind);
            let (ancestors, current) = split_by_rank(items, discovery.current);
            let behavior = config.behavior(kind);
            debug!("merge {kind} with {behavior}");

            let merged = match behavior {
                ExtendBehavior::Inherit => nearest_level(&ancestors),
                ExtendBehavior::Override => by_name(&current),
                ExtendBehavior::Extend => {
                    let mut merged = by_name(&ancestors);
                    merged.extend(by_name(&current));
                    merged
                }
                ExtendBehavior::Compose => {
                    let mut merged = by_name(&current);
                    for name in config.include(kind) {
                        if merged.contains_key(name) {
                            debug!("{kind}/{name} already defined by current level");
                            continue;
                        }

                        // INVARIANT: Nearest ancestor is the last occurrence.
                        match ancestors.iter().rev().find(|item| item.name == name) {
                            Some(item) => {
                                merged.insert(name.to_string(), (*item).clone());
                            }
                            None => {
                                warn!("{kind}/{name} is not defined by any ancestor, dropping it");
                                set.dropped_includes.push((kind, name.to_string()));
                            }
                        }
                    }
                    merged
                }
            };

            set.collections.insert(kind, merged);
        }

        self.apply_excludes(&mut set, config);
        set
    }

    fn merge_document(&self, discovery: &Discovery, behavior: ExtendBehavior) -> ResolvedDocument {
        let (ancestors, current) = match discovery.current {
            Some(rank) => (
                discovery
                    .documents
                    .iter()
                    .filter(|doc| doc.rank < rank)
                    .collect::<Vec<_>>(),
                discovery.documents.iter().find(|doc| doc.rank == rank),
            ),
            None => (discovery.documents.iter().collect(), None),
        };
        let nearest = ancestors.last().copied();

        match behavior {
            ExtendBehavior::Inherit => nearest.cloned().into(),
            ExtendBehavior::Override => current.cloned().into(),
            ExtendBehavior::Extend | ExtendBehavior::Compose => match (nearest, current) {
                (Some(parent), Some(child)) => ResolvedDocument::Concatenated {
                    parent: parent.clone(),
                    child: child.clone(),
                },
                (parent, child) => parent.or(child).cloned().into(),
            },
        }
    }

    fn apply_excludes(&self, set: &mut ResolvedResourceSet, config: &ResolvedConfig) {
        let rules = config.exclude();
        if rules.is_empty() {
            return;
        }

        if set.document != ResolvedDocument::Absent && rules.is_excluded(DOCUMENT_FILE) {
            debug!("exclude {DOCUMENT_FILE}");
            set.document = ResolvedDocument::Absent;
        }

        for items in set.collections.values_mut() {
            items.retain(|_, item| {
                let excluded = rules.is_excluded(&item.logical_path());
                if excluded {
                    debug!("exclude {}", item.logical_path());
                }
                !excluded
            });
        }
    }
}

impl From<Option<DiscoveredDocument>> for ResolvedDocument {
    fn from(document: Option<DiscoveredDocument>) -> Self {
        match document {
            Some(document) => Self::Single(document),
            None => Self::Absent,
        }
    }
}

fn split_by_rank(
    items: &[DiscoveredItem],
    current: Option<usize>,
) -> (Vec<&DiscoveredItem>, Vec<&DiscoveredItem>) {
    items
        .iter()
        .partition(|item| current.is_none_or(|rank| item.rank < rank))
}

/// Later items win on name collision.
fn by_name(items: &[&DiscoveredItem]) -> BTreeMap<String, DiscoveredItem> {
    items
        .iter()
        .map(|item| (item.name.clone(), (*item).clone()))
        .collect()
}

/// Items of nearest level that has any.
fn nearest_level(items: &[&DiscoveredItem]) -> BTreeMap<String, DiscoveredItem> {
    match items.iter().map(|item| item.rank).max() {
        Some(rank) => items
            .iter()
            .filter(|item| item.rank == rank)
            .map(|item| (item.name.clone(), (*item).clone()))
            .collect(),
        None => BTreeMap::new(),
    }
}
