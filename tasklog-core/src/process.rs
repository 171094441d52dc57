//! External command execution.
//!
//! Backends never call `std::process` directly; they go through a
//! [`CommandRunner`] so command sequences can be scripted in tests.

use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;
use tracing::debug;

/// Captured result of one external command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Stdout followed by stderr, as shown to the user on failure.
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (true, _) => self.stderr.clone(),
            (false, true) => self.stdout.clone(),
            (false, false) => {
                let mut out = self.stdout.clone();
                if !out.ends_with('\n') {
                    out.push('\n');
                }
                out.push_str(&self.stderr);
                out
            }
        }
    }
}

pub trait CommandRunner: Send + Sync {
    /// Runs `program args..` in `cwd` to completion.
    ///
    /// Returns `Err` only when the process could not be started.
    fn run(&self, cwd: &Path, program: &str, args: &[String]) -> io::Result<CommandOutput>;
}

/// Runs real processes.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    env: Vec<(String, String)>,
}

impl SystemRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, cwd: &Path, program: &str, args: &[String]) -> io::Result<CommandOutput> {
        debug!("running {} {:?} in {:?}", program, args, cwd);
        let output = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .output()?;

        let result = CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        debug!("{} exited with {:?}", program, result.exit_code);
        Ok(result)
    }
}

/// One recorded invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub cwd: PathBuf,
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    /// `program arg1 arg2 ...`
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

struct Rule {
    prefix: Vec<String>,
    responses: VecDeque<CommandOutput>,
}

/// Replays canned outputs and records every invocation.
///
/// Rules match on `program` plus a leading slice of the arguments; the first
/// matching rule answers. A rule with several responses hands them out in
/// order and repeats the last one. Unmatched commands succeed with empty
/// output.
#[derive(Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<Invocation>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers commands whose words start with `prefix` (program first).
    pub fn on(self, prefix: &[&str], output: CommandOutput) -> Self {
        self.on_sequence(prefix, vec![output])
    }

    pub fn on_sequence(self, prefix: &[&str], outputs: Vec<CommandOutput>) -> Self {
        if let Ok(mut rules) = self.rules.lock() {
            rules.push(Rule {
                prefix: prefix.iter().map(|s| s.to_string()).collect(),
                responses: outputs.into(),
            });
        }
        self
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Command lines of every invocation so far.
    pub fn command_lines(&self) -> Vec<String> {
        self.calls().iter().map(Invocation::command_line).collect()
    }

    /// True when some invocation's command line starts with `prefix`.
    pub fn ran(&self, prefix: &str) -> bool {
        self.command_lines().iter().any(|line| line.starts_with(prefix))
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, cwd: &Path, program: &str, args: &[String]) -> io::Result<CommandOutput> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(Invocation {
                cwd: cwd.to_path_buf(),
                program: program.to_string(),
                args: args.to_vec(),
            });
        }

        let mut words = Vec::with_capacity(args.len() + 1);
        words.push(program);
        words.extend(args.iter().map(String::as_str));

        let mut rules = self
            .rules
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "scripted runner poisoned"))?;
        for rule in rules.iter_mut() {
            let matches = rule.prefix.len() <= words.len()
                && rule.prefix.iter().zip(&words).all(|(p, w)| p == w);
            if !matches {
                continue;
            }
            let output = if rule.responses.len() > 1 {
                rule.responses.pop_front()
            } else {
                rule.responses.front().cloned()
            };
            return Ok(output.unwrap_or_default());
        }
        Ok(CommandOutput::success(""))
    }
}
