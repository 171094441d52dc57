use std::path::Path;
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

const CONTRIBUTORS_TEMPLATE: &str = r#"author.name() ++ "\t" ++ author.email() ++ "\n" ++ committer.name() ++ "\t" ++ committer.email() ++ "\n""#;

const HISTORY_TEMPLATE: &str = r#"commit_id ++ "\t" ++ author.name() ++ "\t" ++ author.email() ++ "\t" ++ author.timestamp().format("%Y-%m-%dT%H:%M:%S%:z") ++ "\t" ++ description.first_line() ++ "\n""#;

/// Drives the `jj` CLI. The working copy is itself a commit (`@`), so there
/// is no staging step: committing splits the listed paths out of `@`.
pub struct JjBackend {
    repo: RepositorySnapshot,
    runner: Arc<dyn CommandRunner>,
}

/// Workspace-relative fileset naming exactly `path`.
fn fileset(path: &Path) -> String {
    let escaped = slash_path(path).replace('\\', "\\\\").replace('"', "\\\"");
    format!("root:\"{}\"", escaped)
}

impl JjBackend {
    pub fn new(repo: RepositorySnapshot, runner: Arc<dyn CommandRunner>) -> Self {
        Self { repo, runner }
    }

    fn exec(&self) -> Exec<'_> {
        Exec {
            runner: self.runner.as_ref(),
            root: &self.repo.root,
            program: "jj",
        }
    }

    fn remote_bookmark(&self) -> String {
        format!("{}@{}", self.repo.default_branch, self.repo.remote_name)
    }

    /// Points the bookmark at the last committed change.
    fn advance_bookmark(&self, stage: Stage) -> StepResult<()> {
        self.exec().step(
            stage,
            &argv(&[
                "bookmark",
                "set",
                &self.repo.default_branch,
                "-r",
                "@-",
                "--allow-backwards",
            ]),
        )?;
        Ok(())
    }

    fn bootstrap(&self) -> StepResult<()> {
        let exec = self.exec();
        if self.repo.root.join(".jj").is_dir() {
            debug!("jj repository already present at {:?}", self.repo.root);
        } else {
            exec.step(Stage::Init, &argv(&["git", "init", "--colocate"]))?;
        }

        if let Some(url) = &self.repo.remote_url {
            let remotes = exec.step(Stage::Init, &argv(&["git", "remote", "list"]))?;
            let known = remotes
                .stdout
                .lines()
                .any(|line| line.split_whitespace().next() == Some(self.repo.remote_name.as_str()));
            if !known {
                exec.step(
                    Stage::Init,
                    &argv(&["git", "remote", "add", &self.repo.remote_name, url]),
                )?;
            }
        }

        if self.repo.remote_enabled && self.adopt_remote_bookmark()? {
            if Sentinel::exists(&self.repo.root) {
                info!("Joined existing storage on {}", self.remote_bookmark());
                return Ok(());
            }
            debug!("Remote bookmark has no sentinel, recording one");
        }

        Sentinel::create(&self.repo.root, Backend::Jj)?;
        let sentinel = fileset(Path::new(SENTINEL_FILE));
        let recorded = exec
            .step(
                Stage::Init,
                &argv(&["commit", "-m", INIT_MESSAGE, "--", &sentinel]),
            )
            .and_then(|_| self.advance_bookmark(Stage::Init));
        if recorded.is_err() {
            Sentinel::discard(&self.repo.root);
        }
        recorded
    }

    /// Moves the working copy onto the remote bookmark when it already has
    /// history. Files written before bootstrap travel along with `@`.
    fn adopt_remote_bookmark(&self) -> StepResult<bool> {
        let exec = self.exec();
        exec.step(
            Stage::Init,
            &argv(&["git", "fetch", "--remote", &self.repo.remote_name]),
        )?;

        let target = self.remote_bookmark();
        if !self.remote_bookmark_present(Stage::Init)? {
            return Ok(false);
        }
        exec.step(Stage::Init, &argv(&["rebase", "-r", "@", "-d", &target]))?;
        exec.step(Stage::Init, &argv(&["bookmark", "track", &target]))?;
        Ok(true)
    }

    fn remote_bookmark_present(&self, stage: Stage) -> StepResult<bool> {
        let revset = format!("present({})", self.remote_bookmark());
        let found = self.exec().step(
            stage,
            &argv(&["log", "--no-graph", "-r", &revset, "-T", "commit_id"]),
        )?;
        Ok(!found.stdout.trim().is_empty())
    }

    fn commit_steps(&self, changes: &ChangeSet) -> StepResult<()> {
        let exec = self.exec();
        let filesets: Vec<String> = changes.paths().iter().map(|p| fileset(p)).collect();

        // Reading the diff snapshots the working copy first.
        let mut args = argv(&["diff", "--summary", "-r", "@", "--"]);
        args.extend(filesets.iter().cloned());
        let diff = exec.step(Stage::Commit, &args)?;
        if diff.stdout.trim().is_empty() {
            info!("Nothing to commit for {:?}", changes.message());
            return Ok(());
        }

        let mut args = argv(&["commit", "-m", changes.message(), "--"]);
        args.extend(filesets);
        exec.step(Stage::Commit, &args)?;
        self.advance_bookmark(Stage::Commit)?;
        info!("Committed {:?}", changes.message());
        Ok(())
    }

    fn pull_steps(&self) -> StepResult<()> {
        let exec = self.exec();
        exec.step(
            Stage::Pull,
            &argv(&["git", "fetch", "--remote", &self.repo.remote_name]),
        )?;

        let target = self.remote_bookmark();
        if !self.remote_bookmark_present(Stage::Pull)? {
            debug!("{} does not exist yet, nothing to pull", target);
            return Ok(());
        }

        exec.step(Stage::Pull, &argv(&["rebase", "-b", "@", "-d", &target]))?;
        self.advance_bookmark(Stage::Pull)
    }
}

impl VcsBackend for JjBackend {
    fn kind(&self) -> Backend {
        Backend::Jj
    }

    fn init(&self) -> Result<OperationOutcome> {
        if Sentinel::exists(&self.repo.root) {
            debug!("{:?} already initialized", self.repo.root);
            return Ok(OperationOutcome::Done);
        }
        info!("Initializing jj storage at {:?}", self.repo.root);
        conclude(Stage::Init, self.bootstrap())
    }

    fn commit(&self, changes: &ChangeSet) -> Result<OperationOutcome> {
        conclude(Stage::Commit, self.commit_steps(changes))
    }

    fn pull(&self) -> Result<OperationOutcome> {
        conclude(Stage::Pull, self.pull_steps())
    }

    fn push(&self) -> Result<OperationOutcome> {
        let result = self
            .exec()
            .step(
                Stage::Push,
                &argv(&[
                    "git",
                    "push",
                    "--remote",
                    &self.repo.remote_name,
                    "--bookmark",
                    &self.repo.default_branch,
                    "--allow-new",
                ]),
            )
            .map(|_| ());
        conclude(Stage::Push, result)
    }

    fn current_user(&self) -> Identity {
        let exec = self.exec();
        let name = exec.query(&argv(&["config", "get", "user.name"]));
        let email = exec.query(&argv(&["config", "get", "user.email"]));
        Identity::new(name.unwrap_or_default(), email.unwrap_or_default())
    }

    fn all_contributors(&self) -> ContributorSet {
        self.exec()
            .query(&argv(&[
                "log",
                "--no-graph",
                "-r",
                "all() ~ root()",
                "-T",
                CONTRIBUTORS_TEMPLATE,
            ]))
            .map(|out| parse_identities(&out))
            .unwrap_or_default()
    }

    fn history(&self, limit: usize) -> Vec<HistoryEntry> {
        let limit = limit.to_string();
        self.exec()
            .query(&argv(&[
                "log",
                "--no-graph",
                "-r",
                "::@- ~ root()",
                "--limit",
                &limit,
                "-T",
                HISTORY_TEMPLATE,
            ]))
            .map(|out| parse_history(&out))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::process::{CommandOutput, ScriptedRunner};
    use std::fs;
    use tempfile::TempDir;

    fn backend(dir: &TempDir, settings: Settings, runner: Arc<ScriptedRunner>) -> JjBackend {
        let settings = Settings {
            storage_root: dir.path().to_path_buf(),
            backend: Backend::Jj,
            ..settings
        };
        JjBackend::new(RepositorySnapshot::capture(settings).unwrap(), runner)
    }

    fn plain(dir: &TempDir, runner: Arc<ScriptedRunner>) -> JjBackend {
        backend(dir, Settings::default(), runner)
    }

    #[test]
    fn test_fileset_quotes_path() {
        assert_eq!(fileset(Path::new("tasks/a.json")), r#"root:"tasks/a.json""#);
        assert_eq!(fileset(Path::new(r#"odd "name".json"#)), r#"root:"odd \"name\".json""#);
    }

    #[test]
    fn test_init_commits_only_sentinel() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner::new());

        assert!(plain(&dir, Arc::clone(&runner)).init().unwrap().is_done());
        assert!(Sentinel::exists(dir.path()));
        assert_eq!(
            runner.command_lines(),
            vec![
                "jj git init --colocate".to_string(),
                format!("jj commit -m {} -- root:\"{}\"", INIT_MESSAGE, SENTINEL_FILE),
                "jj bookmark set main -r @- --allow-backwards".to_string(),
            ]
        );
    }

    #[test]
    fn test_init_reuses_existing_jj_repo() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join(".jj")).unwrap();
        let runner = Arc::new(ScriptedRunner::new());

        assert!(plain(&dir, Arc::clone(&runner)).init().unwrap().is_done());
        assert!(!runner.ran("jj git init"));
    }

    #[test]
    fn test_init_is_noop_with_sentinel() {
        let dir = TempDir::new().unwrap();
        Sentinel::create(dir.path(), Backend::Jj).unwrap();
        let runner = Arc::new(ScriptedRunner::new());

        assert!(plain(&dir, Arc::clone(&runner)).init().unwrap().is_done());
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_init_adds_unknown_remote() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner::new().on(
            &["jj", "git", "remote", "list"],
            CommandOutput::success("upstream https://example.com/other.git\n"),
        ));
        let settings = Settings::default().with_remote_url("https://example.com/tasks.git");

        assert!(backend(&dir, settings, Arc::clone(&runner)).init().unwrap().is_done());
        assert!(runner.ran("jj git remote add origin https://example.com/tasks.git"));
    }

    #[test]
    fn test_init_moves_onto_existing_remote_bookmark() {
        let dir = TempDir::new().unwrap();
        let runner =
            Arc::new(ScriptedRunner::new().on(&["jj", "log"], CommandOutput::success("0123abcd")));
        let settings = Settings::default().with_remote(true);

        assert!(backend(&dir, settings, Arc::clone(&runner)).init().unwrap().is_done());
        let lines = runner.command_lines();
        let position = |prefix: &str| lines.iter().position(|l| l.starts_with(prefix)).unwrap();
        assert!(position("jj git fetch --remote origin") < position("jj rebase -r @ -d main@origin"));
        assert!(position("jj rebase") < position("jj bookmark track main@origin"));
        // Nothing on disk came with the bookmark, so the sentinel is recorded.
        assert!(position("jj bookmark track") < position("jj commit"));
    }

    #[test]
    fn test_init_without_remote_bookmark_starts_fresh() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner::new().on(&["jj", "log"], CommandOutput::success("")));
        let settings = Settings::default().with_remote(true);

        assert!(backend(&dir, settings, Arc::clone(&runner)).init().unwrap().is_done());
        assert!(!runner.ran("jj rebase"));
        assert!(!runner.ran("jj bookmark track"));
        assert!(runner.ran("jj commit -m"));
    }

    #[test]
    fn test_init_fetch_failure_leaves_no_sentinel() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner::new().on(
            &["jj", "git", "fetch"],
            CommandOutput::failure(1, "Error: Could not read from remote repository."),
        ));
        let settings = Settings::default().with_remote(true);

        let outcome = backend(&dir, settings, runner).init().unwrap();
        assert_eq!(outcome.failure().unwrap().stage, Stage::Init);
        assert!(!Sentinel::exists(dir.path()));
    }

    #[test]
    fn test_empty_working_copy_diff_is_done() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner::new().on(&["jj", "diff"], CommandOutput::success("\n")));
        let changes = ChangeSet::new(["a.json"], "update: A").unwrap();

        assert!(plain(&dir, Arc::clone(&runner)).commit(&changes).unwrap().is_done());
        assert!(!runner.ran("jj commit"));
        assert!(!runner.ran("jj bookmark"));
    }

    #[test]
    fn test_commit_splits_listed_paths() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner::new().on(
            &["jj", "diff"],
            CommandOutput::success("A tasks/a.json\nD tasks/b.json\n"),
        ));
        let changes = ChangeSet::new(["tasks/a.json", "tasks/b.json"], "update: 2 items").unwrap();

        assert!(plain(&dir, Arc::clone(&runner)).commit(&changes).unwrap().is_done());
        assert!(runner.ran(
            r#"jj commit -m update: 2 items -- root:"tasks/a.json" root:"tasks/b.json""#
        ));
        assert!(runner.ran("jj bookmark set main -r @-"));
    }

    #[test]
    fn test_commit_failure_keeps_raw_output() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(
            ScriptedRunner::new()
                .on(&["jj", "diff"], CommandOutput::success("M a.json\n"))
                .on(&["jj", "commit"], CommandOutput::failure(1, "Error: concurrent operation")),
        );
        let changes = ChangeSet::new(["a.json"], "update: A").unwrap();

        let outcome = plain(&dir, runner).commit(&changes).unwrap();
        let failure = outcome.failure().unwrap();
        assert_eq!(failure.stage, Stage::Commit);
        assert_eq!(failure.raw_output, "Error: concurrent operation");
        assert!(failure.cause.contains("jj commit"));
    }

    #[test]
    fn test_pull_without_remote_bookmark_skips_rebase() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner::new().on(&["jj", "log"], CommandOutput::success("")));

        assert!(plain(&dir, Arc::clone(&runner)).pull().unwrap().is_done());
        assert!(runner.ran("jj git fetch --remote origin"));
        assert!(!runner.ran("jj rebase"));
    }

    #[test]
    fn test_pull_rebases_onto_remote_bookmark() {
        let dir = TempDir::new().unwrap();
        let runner =
            Arc::new(ScriptedRunner::new().on(&["jj", "log"], CommandOutput::success("0123abcd")));

        assert!(plain(&dir, Arc::clone(&runner)).pull().unwrap().is_done());
        assert!(runner.ran("jj rebase -b @ -d main@origin"));
    }

    #[test]
    fn test_fetch_failure_is_pull_failure() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(
            ScriptedRunner::new().on(&["jj", "git", "fetch"], CommandOutput::failure(1, "Error: No git remote named 'origin'")),
        );

        let outcome = plain(&dir, Arc::clone(&runner)).pull().unwrap();
        assert_eq!(outcome.failure().unwrap().stage, Stage::Pull);
        assert!(!runner.ran("jj rebase"));
    }

    #[test]
    fn test_push_allows_new_bookmark() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner::new());

        assert!(plain(&dir, Arc::clone(&runner)).push().unwrap().is_done());
        assert!(runner.ran("jj git push --remote origin --bookmark main --allow-new"));
    }

    #[test]
    fn test_missing_binary_is_failure_not_error() {
        let dir = TempDir::new().unwrap();
        let repo = RepositorySnapshot::capture(Settings::new(dir.path(), Backend::Jj)).unwrap();
        let jj = JjBackend::new(
            repo,
            Arc::new(crate::process::SystemRunner::new().with_env("PATH", "")),
        );

        let outcome = jj.push().unwrap();
        let failure = outcome.failure().unwrap();
        assert_eq!(failure.stage, Stage::Push);
        assert!(failure.cause.contains("could not run"));
        assert!(jj.current_user().is_empty());
    }

    #[test]
    fn test_history_parses_template_output() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner::new().on(
            &["jj", "log"],
            CommandOutput::success(
                "c2\tAda\tada@example.com\t2024-05-02T09:00:00+00:00\tcreate: A\nc1\tAda\tada@example.com\t2024-05-01T09:00:00+00:00\tInitialize task storage\n",
            ),
        ));

        let history = plain(&dir, runner).history(10);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].summary, "create: A");
    }
}
