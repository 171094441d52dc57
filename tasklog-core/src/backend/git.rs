use std::sync::Arc;
use tracing::{debug, info};

use super::{
    argv, conclude, parse_history, parse_identities, slash_path, Exec, StepResult, VcsBackend,
    INIT_MESSAGE,
};
use crate::config::RepositorySnapshot;
use crate::error::Result;
use crate::models::{
    Backend, ChangeSet, ContributorSet, HistoryEntry, Identity, OperationOutcome, Stage,
};
use crate::process::CommandRunner;
use crate::sentinel::{Sentinel, SENTINEL_FILE};

/// Drives the `git` CLI: explicit index, linear history on a branch.
pub struct GitBackend {
    repo: RepositorySnapshot,
    runner: Arc<dyn CommandRunner>,
}

impl GitBackend {
    pub fn new(repo: RepositorySnapshot, runner: Arc<dyn CommandRunner>) -> Self {
        Self { repo, runner }
    }

    fn exec(&self) -> Exec<'_> {
        Exec {
            runner: self.runner.as_ref(),
            root: &self.repo.root,
            program: "git",
        }
    }

    fn bootstrap(&self) -> StepResult<()> {
        let exec = self.exec();
        exec.step(
            Stage::Init,
            &argv(&["init", "--initial-branch", &self.repo.default_branch]),
        )?;

        if let Some(url) = &self.repo.remote_url {
            let existing = exec.query(&argv(&["remote", "get-url", &self.repo.remote_name]));
            if existing.is_none() {
                exec.step(
                    Stage::Init,
                    &argv(&["remote", "add", &self.repo.remote_name, url]),
                )?;
            }
        }

        if self.repo.remote_enabled && self.adopt_remote_branch()? {
            if Sentinel::exists(&self.repo.root) {
                info!(
                    "Joined existing storage on {}/{}",
                    self.repo.remote_name, self.repo.default_branch
                );
                return Ok(());
            }
            debug!("Remote branch has no sentinel, recording one");
        }

        Sentinel::create(&self.repo.root, Backend::Git)?;
        let recorded = exec
            .step(Stage::Init, &argv(&["add", "--", SENTINEL_FILE]))
            .and_then(|_| {
                exec.step(
                    Stage::Init,
                    &argv(&["commit", "-m", INIT_MESSAGE, "--", SENTINEL_FILE]),
                )
            });
        if recorded.is_err() {
            Sentinel::discard(&self.repo.root);
        }
        recorded.map(|_| ())
    }

    /// Checks out the remote branch when it already has history, so a new
    /// root builds on it instead of starting a divergent one.
    fn adopt_remote_branch(&self) -> StepResult<bool> {
        let exec = self.exec();
        let remote = &self.repo.remote_name;
        let branch = &self.repo.default_branch;

        let args = argv(&["ls-remote", "--exit-code", "--heads", remote, branch]);
        let probe = exec.probe(Stage::Init, &args)?;
        match probe.exit_code {
            Some(0) => {}
            Some(2) => return Ok(false),
            _ => return Err(exec.failure(Stage::Init, &args, &probe).into()),
        }

        exec.step(Stage::Init, &argv(&["fetch", remote, branch]))?;
        exec.step(Stage::Init, &argv(&["checkout", "-B", branch, "FETCH_HEAD"]))?;
        Ok(true)
    }

    fn commit_steps(&self, changes: &ChangeSet) -> StepResult<()> {
        let exec = self.exec();
        let mut present = Vec::new();
        let mut missing = Vec::new();
        for path in changes.paths() {
            if self.repo.root.join(path).exists() {
                present.push(slash_path(path));
            } else {
                missing.push(slash_path(path));
            }
        }

        if !present.is_empty() {
            let mut args = argv(&["add", "--all", "--"]);
            args.extend(present.iter().cloned());
            exec.step(Stage::Commit, &args)?;
        }
        if !missing.is_empty() {
            let mut args = argv(&["rm", "--cached", "-r", "--quiet", "--ignore-unmatch", "--"]);
            args.extend(missing.iter().cloned());
            exec.step(Stage::Commit, &args)?;
        }

        let mut args = argv(&["diff", "--cached", "--name-only", "-z", "--"]);
        args.extend(present.into_iter().chain(missing));
        let staged = exec.step(Stage::Commit, &args)?;
        let changed: Vec<String> = staged
            .stdout
            .split('\0')
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();
        if changed.is_empty() {
            info!("Nothing to commit for {:?}", changes.message());
            return Ok(());
        }

        // Limited to the change set: anything else staged stays staged.
        let mut args = argv(&["commit", "-m", changes.message(), "--"]);
        args.extend(changed);
        exec.step(Stage::Commit, &args)?;
        info!("Committed {:?}", changes.message());
        Ok(())
    }

    fn pull_steps(&self) -> StepResult<()> {
        let exec = self.exec();
        let remote = &self.repo.remote_name;
        let branch = &self.repo.default_branch;

        let args = argv(&["ls-remote", "--exit-code", "--heads", remote, branch]);
        let probe = exec.probe(Stage::Pull, &args)?;
        match probe.exit_code {
            Some(0) => {}
            Some(2) => {
                debug!("{}/{} does not exist yet, nothing to pull", remote, branch);
                return Ok(());
            }
            _ => return Err(exec.failure(Stage::Pull, &args, &probe).into()),
        }

        exec.step(
            Stage::Pull,
            &argv(&["pull", "--rebase", "--autostash", remote, branch]),
        )?;
        Ok(())
    }
}

impl VcsBackend for GitBackend {
    fn kind(&self) -> Backend {
        Backend::Git
    }

    fn init(&self) -> Result<OperationOutcome> {
        if Sentinel::exists(&self.repo.root) {
            debug!("{:?} already initialized", self.repo.root);
            return Ok(OperationOutcome::Done);
        }
        info!("Initializing git storage at {:?}", self.repo.root);
        conclude(Stage::Init, self.bootstrap())
    }

    fn commit(&self, changes: &ChangeSet) -> Result<OperationOutcome> {
        conclude(Stage::Commit, self.commit_steps(changes))
    }

    fn pull(&self) -> Result<OperationOutcome> {
        conclude(Stage::Pull, self.pull_steps())
    }

    fn push(&self) -> Result<OperationOutcome> {
        let refspec = format!("HEAD:refs/heads/{}", self.repo.default_branch);
        let result = self
            .exec()
            .step(
                Stage::Push,
                &argv(&["push", "--set-upstream", &self.repo.remote_name, &refspec]),
            )
            .map(|_| ());
        conclude(Stage::Push, result)
    }

    fn current_user(&self) -> Identity {
        let exec = self.exec();
        let name = exec.query(&argv(&["config", "--get", "user.name"]));
        let email = exec.query(&argv(&["config", "--get", "user.email"]));
        Identity::new(name.unwrap_or_default(), email.unwrap_or_default())
    }

    fn all_contributors(&self) -> ContributorSet {
        self.exec()
            .query(&argv(&["log", "--format=%an%x09%ae%n%cn%x09%ce"]))
            .map(|out| parse_identities(&out))
            .unwrap_or_default()
    }

    fn history(&self, limit: usize) -> Vec<HistoryEntry> {
        let limit = limit.to_string();
        self.exec()
            .query(&argv(&[
                "log",
                "-n",
                &limit,
                "--format=%H%x09%an%x09%ae%x09%aI%x09%s",
            ]))
            .map(|out| parse_history(&out))
            .unwrap_or_default()
    }
}
