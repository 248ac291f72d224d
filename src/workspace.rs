// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Resolution pipeline of one starting directory.
//!
//! A __workspace__ ties every stage together for the directory a command was
//! started from. The pipeline only ever moves forward:
//!
//! ```text
//! ChainResolver -> ConfigResolver -> ResourceDiscoverer -> MergeEngine
//!               -> LinkPlanner -> TransactionManager
//! ```
//!
//! Nothing is cached between calls. Every [`Workspace::resolve`] rescans the
//! filesystem, because resources may change between runs.

use crate::{
    chain::{Chain, ChainError, ChainLevel, ChainResolver},
    config::{ConfigError, ConfigResolver, ResolvedConfig},
    link::{find_consumer, registry, Consumer, LinkPlanner, Plan, PlanError},
    merge::{MergeEngine, ResolvedResourceSet},
    resource::discover::{DiscoverError, Discovery, ResourceDiscoverer},
    transaction::{
        ApplyReport, ForcePolicy, SessionManifest, TransactionError, TransactionManager,
        UndoReport,
    },
};

use std::path::{Path, PathBuf};
use tracing::{info, instrument};

/// Resources of current level along with how they were found.
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Raw discovery across the chain.
    pub discovery: Discovery,

    /// Merged resources of current level.
    pub set: ResolvedResourceSet,
}

/// Outcome of syncing current level.
#[derive(Debug)]
pub struct SyncReport {
    /// Plan that was applied.
    pub plan: Plan,

    /// What applying the plan did.
    pub apply: ApplyReport,

    /// Id of finalized backup session, if anything changed.
    pub session: Option<String>,
}

/// Starting directory with its resolved chain and configuration.
#[derive(Debug, Clone)]
pub struct Workspace {
    chain: Chain,
    config: ResolvedConfig,
}

impl Workspace {
    /// Open workspace at starting directory.
    ///
    /// # Errors
    ///
    /// - Return [`WorkspaceError::NotInitialized`] if starting directory does
    ///   not host a canonical folder.
    /// - Return [`WorkspaceError::Chain`] if chain cannot be resolved.
    /// - Return [`WorkspaceError::Config`] if declaration of current level is
    ///   malformed.
    #[instrument(skip(start, global_root), level = "debug")]
    pub fn open(start: impl AsRef<Path>, global_root: Option<PathBuf>) -> Result<Self> {
        let chain = ChainResolver::new(global_root).resolve(start.as_ref())?;
        let current = chain.current().ok_or_else(|| WorkspaceError::NotInitialized {
            path: start.as_ref().to_path_buf(),
        })?;
        let config = ConfigResolver::new().resolve(current)?;

        Ok(Self { chain, config })
    }

    /// Resolved inheritance chain.
    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    /// Level being resolved.
    pub fn current(&self) -> &ChainLevel {
        // INVARIANT: Construction guarantees a current level.
        &self.chain.levels()[self.chain.levels().len() - 1]
    }

    /// Resolved configuration of current level.
    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    /// Discover and merge resources of current level.
    ///
    /// # Errors
    ///
    /// - Return [`WorkspaceError::Discover`] if a resource directory cannot be
    ///   listed.
    pub fn resolve(&self) -> Result<Resolution> {
        let discovery = ResourceDiscoverer::new().discover(&self.chain)?;
        let set = MergeEngine::new().merge(&discovery, &self.config);
        Ok(Resolution { discovery, set })
    }

    /// Plan links of current level for consumers.
    ///
    /// # Errors
    ///
    /// - Return [`WorkspaceError::Discover`] if resources cannot be found.
    /// - Return [`WorkspaceError::Plan`] if target state cannot be inspected.
    pub fn plan(&self, consumers: &[&Consumer]) -> Result<Plan> {
        let resolution = self.resolve()?;
        let planner = LinkPlanner::new(self.current(), self.chain.canonical_dirs());
        Ok(planner.plan(&resolution.set, consumers)?)
    }

    /// Apply previously computed plan inside new backup session.
    ///
    /// # Errors
    ///
    /// - Return [`WorkspaceError::Transaction`] if backup session cannot be
    ///   opened or finalized.
    #[instrument(skip(self, plan), level = "debug")]
    pub fn apply(&self, plan: Plan, force: ForcePolicy) -> Result<SyncReport> {
        let manager = TransactionManager::new(self.current());
        let mut session = manager.begin()?;
        let apply = manager.apply(&plan, &mut session, force);
        let session = manager.finalize(session)?;

        info!(
            "{} linked, {} pruned, {} forced, {} unchanged, {} conflicts",
            apply.linked,
            apply.pruned,
            apply.forced,
            apply.unchanged,
            apply.conflicts.len()
        );

        Ok(SyncReport {
            plan,
            apply,
            session,
        })
    }

    /// Plan and apply links of current level for consumers.
    ///
    /// # Errors
    ///
    /// - Return [`WorkspaceError`] if planning or applying fails.
    pub fn sync(&self, consumers: &[&Consumer], force: ForcePolicy) -> Result<SyncReport> {
        let plan = self.plan(consumers)?;
        self.apply(plan, force)
    }

    /// Undo most recent sync of current level.
    ///
    /// # Errors
    ///
    /// - Return [`WorkspaceError::Transaction`] if there is nothing to undo,
    ///   or the session record is unusable.
    pub fn undo(&self) -> Result<UndoReport> {
        Ok(TransactionManager::new(self.current()).undo()?)
    }

    /// Backup sessions of current level, oldest first.
    ///
    /// # Errors
    ///
    /// - Return [`WorkspaceError::Transaction`] if backups cannot be listed.
    pub fn sessions(&self) -> Result<Vec<SessionManifest>> {
        Ok(TransactionManager::new(self.current()).sessions()?)
    }
}

/// Select consumers by name.
///
/// Every registered consumer is selected when `names` is empty.
///
/// # Errors
///
/// - Return [`WorkspaceError::UnknownConsumer`] if a name is not registered.
pub fn select_consumers(names: &[impl AsRef<str>]) -> Result<Vec<&'static Consumer>> {
    if names.is_empty() {
        return Ok(registry().iter().collect());
    }

    names
        .iter()
        .map(|name| {
            find_consumer(name.as_ref())
                .ok_or_else(|| WorkspaceError::UnknownConsumer(name.as_ref().to_string()))
        })
        .collect()
}

/// Workspace error types.
#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    /// Starting directory hosts no canonical folder.
    #[error("{:?} is not initialized, create a {} folder first", path.display(), crate::path::CANONICAL_DIR)]
    NotInitialized { path: PathBuf },

    /// Consumer name is not registered.
    #[error("unknown consumer {0:?}")]
    UnknownConsumer(String),

    /// Chain resolution fails.
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// Declaration cannot be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Resource discovery fails.
    #[error(transparent)]
    Discover(#[from] DiscoverError),

    /// Link planning fails.
    #[error(transparent)]
    Plan(#[from] PlanError),

    /// Backup transaction fails.
    #[error(transparent)]
    Transaction(#[from] TransactionError),
}

/// Friendly result alias :3
pub type Result<T, E = WorkspaceError> = std::result::Result<T, E>;
