//! Version-control adapters.
//!
//! Each adapter speaks its tool's own command vocabulary but reports through
//! the same [`OperationOutcome`]. Nothing outside this module branches on the
//! configured [`Backend`].

mod git;
mod jj;

pub use git::GitBackend;
pub use jj::JjBackend;

use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::RepositorySnapshot;
use crate::error::{Error, Result};
use crate::models::{
    Backend, ChangeSet, ContributorSet, HistoryEntry, Identity, OperationOutcome, Stage,
    StageFailure,
};
use crate::process::{CommandOutput, CommandRunner};

/// Message of the bootstrap commit that records the sentinel.
pub const INIT_MESSAGE: &str = "Initialize task storage";

pub trait VcsBackend: Send + Sync {
    fn kind(&self) -> Backend;

    /// Bootstraps the storage root unless the sentinel is already present,
    /// in which case no command is run.
    fn init(&self) -> Result<OperationOutcome>;

    /// Stages and commits the change set. No effective diff is `Done`.
    fn commit(&self, changes: &ChangeSet) -> Result<OperationOutcome>;

    /// Replays local commits on top of the remote branch.
    fn pull(&self) -> Result<OperationOutcome>;

    /// Publishes local history, creating the remote ref if needed.
    fn push(&self) -> Result<OperationOutcome>;

    /// Empty identity when the tool has none configured.
    fn current_user(&self) -> Identity;

    fn all_contributors(&self) -> ContributorSet;

    /// Most recent entries first. Empty when history cannot be read.
    fn history(&self, limit: usize) -> Vec<HistoryEntry>;
}

/// Builds the adapter for the snapshot's backend.
pub fn open(repo: &RepositorySnapshot, runner: Arc<dyn CommandRunner>) -> Box<dyn VcsBackend> {
    match repo.backend {
        Backend::Git => Box::new(GitBackend::new(repo.clone(), runner)),
        Backend::Jj => Box::new(JjBackend::new(repo.clone(), runner)),
    }
}

/// Why a sequence of commands stopped early.
#[derive(Debug)]
pub(crate) enum StepError {
    Failed(StageFailure),
    Fatal(Error),
}

impl From<StageFailure> for StepError {
    fn from(failure: StageFailure) -> Self {
        StepError::Failed(failure)
    }
}

impl From<Error> for StepError {
    fn from(error: Error) -> Self {
        StepError::Fatal(error)
    }
}

pub(crate) type StepResult<T> = std::result::Result<T, StepError>;

/// Turns a command sequence's result into the uniform outcome.
pub(crate) fn conclude(stage: Stage, result: StepResult<()>) -> Result<OperationOutcome> {
    match result {
        Ok(()) => {
            debug!("{} finished", stage);
            Ok(OperationOutcome::Done)
        }
        Err(StepError::Failed(failure)) => {
            warn!("{}: {}", failure, failure.raw_output.trim());
            Ok(OperationOutcome::Failed(failure))
        }
        Err(StepError::Fatal(error)) => Err(error),
    }
}

/// Runs one program inside the storage root.
pub(crate) struct Exec<'a> {
    pub runner: &'a dyn CommandRunner,
    pub root: &'a Path,
    pub program: &'static str,
}

impl Exec<'_> {
    fn describe(&self, args: &[String]) -> String {
        match args.first() {
            Some(sub) if !sub.starts_with('-') => format!("{} {}", self.program, sub),
            _ => self.program.to_string(),
        }
    }

    /// Runs and returns the output whatever the exit status.
    pub fn probe(&self, stage: Stage, args: &[String]) -> StepResult<CommandOutput> {
        self.runner
            .run(self.root, self.program, args)
            .map_err(|e| {
                StageFailure::new(
                    stage,
                    e.to_string(),
                    format!("could not run `{}`: {}", self.describe(args), e),
                )
                .into()
            })
    }

    /// Runs and fails the stage on a non-zero exit.
    pub fn step(&self, stage: Stage, args: &[String]) -> StepResult<CommandOutput> {
        let output = self.probe(stage, args)?;
        if output.is_success() {
            Ok(output)
        } else {
            Err(self.failure(stage, args, &output).into())
        }
    }

    pub fn failure(&self, stage: Stage, args: &[String], output: &CommandOutput) -> StageFailure {
        let status = output
            .exit_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string());
        StageFailure::new(
            stage,
            output.combined(),
            format!("`{}` exited with status {}", self.describe(args), status),
        )
    }

    /// Stdout of a read-only command, `None` on any failure.
    pub fn query(&self, args: &[String]) -> Option<String> {
        match self.runner.run(self.root, self.program, args) {
            Ok(output) if output.is_success() => Some(output.stdout),
            Ok(output) => {
                debug!(
                    "`{}` exited with {:?}: {}",
                    self.describe(args),
                    output.exit_code,
                    output.stderr.trim()
                );
                None
            }
            Err(e) => {
                debug!("could not run `{}`: {}", self.describe(args), e);
                None
            }
        }
    }
}

pub(crate) fn argv(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

/// Relative path with `/` separators regardless of platform.
pub(crate) fn slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .filter(|c| c != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// Parses `name \t email` lines.
pub(crate) fn parse_identities(stdout: &str) -> ContributorSet {
    stdout
        .lines()
        .filter_map(|line| {
            let (name, email) = line.split_once('\t')?;
            Some(Identity::new(name, email))
        })
        .collect()
}

pub(crate) fn parse_history(stdout: &str) -> Vec<HistoryEntry> {
    stdout.lines().filter_map(HistoryEntry::parse_line).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_open_selects_adapter() {
        let dir = TempDir::new().unwrap();
        let runner: Arc<dyn CommandRunner> = Arc::new(crate::process::ScriptedRunner::new());

        for backend in [Backend::Git, Backend::Jj] {
            let repo = RepositorySnapshot::capture(Settings::new(dir.path(), backend)).unwrap();
            assert_eq!(open(&repo, Arc::clone(&runner)).kind(), backend);
        }
    }

    #[test]
    fn test_slash_path() {
        assert_eq!(slash_path(&PathBuf::from("./tasks/a.json")), "tasks/a.json");
        assert_eq!(slash_path(&PathBuf::from("a.json")), "a.json");
    }

    #[test]
    fn test_parse_identities_skips_malformed() {
        let set = parse_identities("Ada\tada@example.com\nnot a pair\n\t\nBob\tBOB@example.com\nBob\tbob@example.com\n");
        assert_eq!(set.len(), 2);
    }
}
