// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Diff resolved resources against live filesystem state.

use crate::{
    chain::ChainLevel,
    link::{
        inspect, link_destination, Conflict, ConflictReason, Consumer, GeneratedDocument,
        LinkTask, Plan, PlanError, Result, TargetState, TaskKind,
    },
    merge::{RenderedDocument, ResolvedResourceSet},
    path::GENERATED_DIR,
    resource::ResourceType,
};

use std::{
    collections::{BTreeMap, BTreeSet},
    fs::{read_dir, read_to_string},
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::{debug, instrument, warn};

/// Compute link plans for one chain level.
#[derive(Debug, Clone)]
pub struct LinkPlanner {
    root: PathBuf,
    global: bool,
    generated_dir: PathBuf,
    managed: Vec<PathBuf>,
}

impl LinkPlanner {
    /// Construct new link planner for level.
    ///
    /// Symlinks pointing into any of the `managed` canonical folders are
    /// considered owned by this tool, so stale ones can be pruned.
    pub fn new(level: &ChainLevel, managed: Vec<PathBuf>) -> Self {
        Self {
            root: level.root.clone(),
            global: level.global,
            generated_dir: level.canonical_dir().join(GENERATED_DIR),
            managed,
        }
    }

    /// Plan links of resource set for active consumers.
    ///
    /// # Errors
    ///
    /// - Return [`PlanError::Render`] if a concatenated document cannot be
    ///   read.
    /// - Return [`PlanError::Inspect`] if target state cannot be inspected.
    #[instrument(skip(self, set, consumers), fields(root = %self.root.display()), level = "debug")]
    pub fn plan(&self, set: &ResolvedResourceSet, consumers: &[&Consumer]) -> Result<Plan> {
        let mut plan = Plan {
            scope: self.root.clone(),
            ..Default::default()
        };

        let desired = self.desired_links(set, consumers, &mut plan.generated)?;
        for (target, source) in &desired {
            let state = inspect(target).map_err(|err| PlanError::Inspect {
                source: err,
                path: target.clone(),
            })?;

            let kind = match state {
                TargetState::Absent => TaskKind::Create,
                TargetState::Symlink(destination) if destination == *source => TaskKind::Noop,
                TargetState::Symlink(_) | TargetState::EmptyDir => TaskKind::Replace,
                TargetState::File => {
                    plan.conflicts.push(conflict(target, source, ConflictReason::ExistingFile));
                    continue;
                }
                TargetState::Dir => {
                    plan.conflicts.push(conflict(target, source, ConflictReason::ExistingDirectory));
                    continue;
                }
            };

            debug!("{kind} {:?} -> {:?}", target.display(), source.display());
            plan.tasks.push(LinkTask {
                target: target.clone(),
                source: source.clone(),
                kind,
            });
        }

        for task in self.stale_links(&desired, consumers)? {
            debug!("remove-stale {:?}", task.target.display());
            plan.tasks.push(task);
        }

        Ok(plan)
    }

    fn desired_links(
        &self,
        set: &ResolvedResourceSet,
        consumers: &[&Consumer],
        generated: &mut Vec<GeneratedDocument>,
    ) -> Result<BTreeMap<PathBuf, PathBuf>> {
        let mut desired = BTreeMap::new();
        for consumer in consumers {
            if let Some(target) = consumer.target(&self.root, self.global, ResourceType::Instructions)
            {
                let rendered = set.document.render(consumer.name).map_err(|err| {
                    PlanError::Render {
                        source: err,
                        consumer: consumer.name.to_string(),
                    }
                })?;

                let source = match rendered {
                    None => None,
                    Some(RenderedDocument::File(path)) => Some(path),
                    Some(RenderedDocument::Content(content)) => {
                        let path = self.generated_path(consumer, &target);
                        let up_to_date = read_to_string(&path)
                            .map(|existing| existing == content)
                            .unwrap_or(false);
                        generated.push(GeneratedDocument {
                            path: path.clone(),
                            content,
                            up_to_date,
                        });
                        Some(path)
                    }
                };

                if let Some(source) = source {
                    insert_desired(&mut desired, target, source);
                }
            }

            for kind in ResourceType::COLLECTIONS {
                let Some(dir) = consumer.target(&self.root, self.global, kind) else {
                    continue;
                };

                for item in set.items(kind) {
                    insert_desired(&mut desired, dir.join(item.link_name()), item.source.clone());
                }
            }
        }

        Ok(desired)
    }

    fn generated_path(&self, consumer: &Consumer, target: &Path) -> PathBuf {
        let file_name = target
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(crate::resource::DOCUMENT_FILE));
        self.generated_dir.join(consumer.name).join(file_name)
    }

    /// Managed symlinks at consumer targets that are no longer desired.
    fn stale_links(
        &self,
        desired: &BTreeMap<PathBuf, PathBuf>,
        consumers: &[&Consumer],
    ) -> Result<Vec<LinkTask>> {
        let mut candidates = BTreeSet::new();
        for consumer in consumers {
            if let Some(target) = consumer.target(&self.root, self.global, ResourceType::Instructions)
            {
                candidates.insert(target);
            }

            for kind in ResourceType::COLLECTIONS {
                let Some(dir) = consumer.target(&self.root, self.global, kind) else {
                    continue;
                };

                let entries = match read_dir(&dir) {
                    Ok(entries) => entries,
                    Err(err) if err.kind() == ErrorKind::NotFound || !dir.is_dir() => continue,
                    Err(err) => return Err(PlanError::Inspect { source: err, path: dir }),
                };

                for entry in entries {
                    let entry = entry.map_err(|err| PlanError::Inspect {
                        source: err,
                        path: dir.clone(),
                    })?;
                    candidates.insert(entry.path());
                }
            }
        }

        let mut stale = Vec::new();
        for candidate in candidates {
            if desired.contains_key(&candidate) || !candidate.is_symlink() {
                continue;
            }

            let destination = link_destination(&candidate).map_err(|err| PlanError::Inspect {
                source: err,
                path: candidate.clone(),
            })?;

            if self.is_managed(&destination) {
                stale.push(LinkTask {
                    target: candidate,
                    source: destination,
                    kind: TaskKind::RemoveStale,
                });
            }
        }

        Ok(stale)
    }

    fn is_managed(&self, destination: &Path) -> bool {
        self.managed.iter().any(|dir| destination.starts_with(dir))
    }
}

fn insert_desired(desired: &mut BTreeMap<PathBuf, PathBuf>, target: PathBuf, source: PathBuf) {
    match desired.get(&target) {
        Some(existing) if *existing != source => {
            warn!(
                "{:?} wanted by several consumers with different sources, keeping {:?}",
                target.display(),
                existing.display()
            );
        }
        Some(_) => {}
        None => {
            desired.insert(target, source);
        }
    }
}

fn conflict(target: &Path, source: &Path, reason: ConflictReason) -> Conflict {
    warn!("conflict at {:?}: {reason}", target.display());
    Conflict {
        target: target.to_path_buf(),
        source: source.to_path_buf(),
        reason,
    }
}
