//! Sequences init, pull, commit and push for one user action.
//!
//! Every entry point takes a fresh configuration snapshot, so settings
//! changed between actions apply to the next one and never mid-operation.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::backend::{self, VcsBackend};
use crate::config::{ConfigProvider, RepositorySnapshot};
use crate::error::Result;
use crate::identity::IdentityResolver;
use crate::models::{ChangeSet, ContributorSet, HistoryEntry, Identity, OperationOutcome};
use crate::process::{CommandRunner, SystemRunner};

pub struct Orchestrator {
    config: Arc<dyn ConfigProvider>,
    runner: Arc<dyn CommandRunner>,
}

impl Orchestrator {
    pub fn new(config: Arc<dyn ConfigProvider>, runner: Arc<dyn CommandRunner>) -> Self {
        Self { config, runner }
    }

    pub fn with_system_runner(config: Arc<dyn ConfigProvider>) -> Self {
        Self::new(config, Arc::new(SystemRunner::new()))
    }

    /// Current repository state, read from configuration and disk.
    pub fn snapshot(&self) -> Result<RepositorySnapshot> {
        RepositorySnapshot::capture(self.config.snapshot()?)
    }

    fn open(&self) -> Result<(RepositorySnapshot, Box<dyn VcsBackend>)> {
        let repo = self.snapshot()?;
        let backend = backend::open(&repo, Arc::clone(&self.runner));
        Ok((repo, backend))
    }

    /// `Some(outcome)` when initialization failed and the operation must stop.
    fn ensure_initialized(
        repo: &RepositorySnapshot,
        backend: &dyn VcsBackend,
    ) -> Result<Option<OperationOutcome>> {
        if repo.initialized {
            return Ok(None);
        }
        match backend.init()? {
            OperationOutcome::Done => Ok(None),
            failed => Ok(Some(failed)),
        }
    }

    pub fn init(&self) -> Result<OperationOutcome> {
        let (_, backend) = self.open()?;
        backend.init()
    }

    /// Records one user action: init if needed, pull when a remote is
    /// enabled, commit, then push when configured.
    ///
    /// A push failure leaves the commit in place and is reported with
    /// `Stage::Push`.
    pub fn commit(&self, changes: &ChangeSet) -> Result<OperationOutcome> {
        let (repo, backend) = self.open()?;

        if let Some(failed) = Self::ensure_initialized(&repo, backend.as_ref())? {
            return Ok(failed);
        }

        if repo.remote_enabled {
            let pulled = backend.pull()?;
            if !pulled.is_done() {
                return Ok(pulled);
            }
        }

        let committed = backend.commit(changes)?;
        if !committed.is_done() {
            return Ok(committed);
        }

        if repo.should_push() {
            let pushed = backend.push()?;
            if let Some(failure) = pushed.failure() {
                warn!("Committed locally but not published: {}", failure.cause);
            }
            return Ok(pushed);
        }

        info!("Recorded {:?}", changes.message());
        Ok(OperationOutcome::Done)
    }

    pub fn pull(&self) -> Result<OperationOutcome> {
        let (repo, backend) = self.open()?;
        if !repo.remote_enabled {
            debug!("Remote disabled, skipping pull");
            return Ok(OperationOutcome::Done);
        }
        if let Some(failed) = Self::ensure_initialized(&repo, backend.as_ref())? {
            return Ok(failed);
        }
        backend.pull()
    }

    pub fn push(&self) -> Result<OperationOutcome> {
        let (repo, backend) = self.open()?;
        if !repo.remote_enabled {
            debug!("Remote disabled, skipping push");
            return Ok(OperationOutcome::Done);
        }
        if let Some(failed) = Self::ensure_initialized(&repo, backend.as_ref())? {
            return Ok(failed);
        }
        backend.push()
    }

    /// Never fails: an unreadable configuration yields an unknown identity.
    pub fn identity(&self) -> IdentityResolver {
        match self.open() {
            Ok((_, backend)) => IdentityResolver::resolve(backend.as_ref()),
            Err(e) => {
                warn!("Cannot resolve identity: {}", e);
                IdentityResolver::default()
            }
        }
    }

    pub fn current_user(&self) -> Identity {
        self.identity().current_user().clone()
    }

    pub fn all_contributors(&self) -> ContributorSet {
        match self.open() {
            Ok((_, backend)) => backend.all_contributors(),
            Err(e) => {
                warn!("Cannot list contributors: {}", e);
                ContributorSet::new()
            }
        }
    }

    pub fn history(&self, limit: usize) -> Result<Vec<HistoryEntry>> {
        let (_, backend) = self.open()?;
        Ok(backend.history(limit))
    }
}
