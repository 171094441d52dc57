use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

/// The version-control tool driving a storage root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Linear history: explicit staging, branches.
    #[default]
    Git,
    /// Working-copy model: automatic snapshots, bookmarks.
    Jj,
}

impl Backend {
    pub fn as_str(&self) -> &str {
        match self {
            Backend::Git => "git",
            Backend::Jj => "jj",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "git" => Some(Backend::Git),
            "jj" => Some(Backend::Jj),
            _ => None,
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The step of an orchestrated operation that produced a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Init,
    Pull,
    Commit,
    Push,
}

impl Stage {
    pub fn as_str(&self) -> &str {
        match self {
            Stage::Init => "init",
            Stage::Pull => "pull",
            Stage::Commit => "commit",
            Stage::Push => "push",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFailure {
    pub stage: Stage,
    /// Verbatim combined output of the failing command.
    pub raw_output: String,
    pub cause: String,
}

impl StageFailure {
    pub fn new(stage: Stage, raw_output: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            stage,
            raw_output: raw_output.into(),
            cause: cause.into(),
        }
    }

    /// True when the change is recorded in local history despite the failure.
    pub fn committed_locally(&self) -> bool {
        self.stage == Stage::Push
    }

    /// Instruction shown to the user next to the raw output.
    pub fn recovery_hint(&self) -> &'static str {
        match self.stage {
            Stage::Init => {
                "The storage directory could not be initialized. Fix the repository by hand and retry."
            }
            Stage::Pull => {
                "Could not sync with the remote, so your change was not recorded. Resolve the repository state manually, then retry."
            }
            Stage::Commit => {
                "Your files were saved but not committed. Commit them manually."
            }
            Stage::Push => {
                "Your change is committed locally but was not published. Push manually once the remote is reachable."
            }
        }
    }
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.stage, self.cause)
    }
}

/// Uniform result of every adapter and orchestrator operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationOutcome {
    /// Succeeded, possibly without changing anything.
    Done,
    Failed(StageFailure),
}

impl OperationOutcome {
    pub fn failed(stage: Stage, raw_output: impl Into<String>, cause: impl Into<String>) -> Self {
        OperationOutcome::Failed(StageFailure::new(stage, raw_output, cause))
    }

    pub fn is_done(&self) -> bool {
        matches!(self, OperationOutcome::Done)
    }

    pub fn failure(&self) -> Option<&StageFailure> {
        match self {
            OperationOutcome::Done => None,
            OperationOutcome::Failed(failure) => Some(failure),
        }
    }
}

/// A contributor's display identity. Either field may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    pub email: String,
}

impl Identity {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into().trim().to_string(),
            email: email.into().trim().to_string(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_empty() && self.email.is_empty()
    }

    /// `Name <email>`, or whichever half is known.
    pub fn display(&self) -> String {
        match (self.name.is_empty(), self.email.is_empty()) {
            (false, false) => format!("{} <{}>", self.name, self.email),
            (false, true) => self.name.clone(),
            (true, false) => self.email.clone(),
            (true, true) => String::new(),
        }
    }

    fn dedup_key(&self) -> String {
        if self.email.is_empty() {
            format!("name:{}", self.name.to_lowercase())
        } else {
            self.email.to_lowercase()
        }
    }
}

/// Identities mined from history, unique by case-insensitive email.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributorSet {
    entries: BTreeMap<String, Identity>,
}

impl ContributorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalizes and inserts. The first name seen for an email wins; blank
    /// identities are dropped.
    pub fn insert(&mut self, identity: Identity) {
        let identity = Identity::new(identity.name, identity.email);
        if identity.is_empty() {
            return;
        }
        let key = identity.dedup_key();
        match self.entries.get_mut(&key) {
            Some(existing) => {
                if existing.name.is_empty() && !identity.name.is_empty() {
                    existing.name = identity.name;
                }
            }
            None => {
                self.entries.insert(key, identity);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_email(&self, email: &str) -> bool {
        self.entries.contains_key(&email.trim().to_lowercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Identity> {
        self.entries.values()
    }
}

impl FromIterator<Identity> for ContributorSet {
    fn from_iter<T: IntoIterator<Item = Identity>>(iter: T) -> Self {
        let mut set = ContributorSet::new();
        for identity in iter {
            set.insert(identity);
        }
        set
    }
}

/// What a user action did to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    Create,
    Update,
    Delete,
}

impl ChangeKind {
    pub fn as_str(&self) -> &str {
        match self {
            ChangeKind::Create => "create",
            ChangeKind::Update => "update",
            ChangeKind::Delete => "delete",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "create" => Some(ChangeKind::Create),
            "update" => Some(ChangeKind::Update),
            "delete" => Some(ChangeKind::Delete),
            _ => None,
        }
    }
}

/// One file already written (or removed) by the file-mutation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mutation {
    pub kind: ChangeKind,
    pub path: PathBuf,
    /// Human-readable name of the affected item.
    pub label: String,
}

impl Mutation {
    pub fn new(kind: ChangeKind, path: impl Into<PathBuf>, label: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
            label: label.into(),
        }
    }
}

/// One logical mutation: the paths it touched and its commit message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    paths: Vec<PathBuf>,
    message: String,
}

impl ChangeSet {
    pub fn new<P: Into<PathBuf>>(
        paths: impl IntoIterator<Item = P>,
        message: impl Into<String>,
    ) -> Result<Self> {
        let paths: Vec<PathBuf> = paths.into_iter().map(Into::into).collect();
        if paths.is_empty() {
            return Err(Error::EmptyChangeSet);
        }
        for path in &paths {
            validate_relative(path)?;
        }
        Ok(Self {
            paths,
            message: message.into(),
        })
    }

    pub fn single(mutation: Mutation) -> Result<Self> {
        let message = format!("{}: {}", mutation.kind.as_str(), mutation.label);
        Self::new([mutation.path], message)
    }

    /// One change set for a bulk action; the message names every item.
    pub fn batch(kind: ChangeKind, mutations: Vec<Mutation>) -> Result<Self> {
        if mutations.len() == 1 {
            let mut mutations = mutations;
            let only = mutations.remove(0);
            return Self::single(Mutation { kind, ..only });
        }

        let mut message = format!("{}: {} items\n", kind.as_str(), mutations.len());
        for mutation in &mutations {
            message.push_str(&format!("\n- {}", mutation.label));
        }
        Self::new(mutations.into_iter().map(|m| m.path), message)
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

fn validate_relative(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(Error::InvalidPath("empty path".to_string()));
    }
    for component in path.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => return Err(Error::InvalidPath(path.display().to_string())),
        }
    }
    Ok(())
}

/// One committed entry, newest first when listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub author: Identity,
    pub timestamp: Option<DateTime<FixedOffset>>,
    pub summary: String,
}

impl HistoryEntry {
    /// Parses `id \t name \t email \t rfc3339 \t summary`.
    pub(crate) fn parse_line(line: &str) -> Option<Self> {
        let mut fields = line.splitn(5, '\t');
        let id = fields.next()?.trim();
        if id.is_empty() {
            return None;
        }
        let name = fields.next()?;
        let email = fields.next()?;
        let timestamp = fields
            .next()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw.trim()).ok());
        let summary = fields.next().unwrap_or_default().trim().to_string();
        Some(Self {
            id: id.to_string(),
            author: Identity::new(name, email),
            timestamp,
            summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_parse() {
        assert_eq!(Backend::parse("git"), Some(Backend::Git));
        assert_eq!(Backend::parse("jj"), Some(Backend::Jj));
        assert_eq!(Backend::parse("hg"), None);
        assert_eq!(Backend::Jj.to_string(), "jj");
    }

    #[test]
    fn test_push_failure_is_committed_locally() {
        let push = StageFailure::new(Stage::Push, "rejected", "push failed");
        let commit = StageFailure::new(Stage::Commit, "no identity", "commit failed");

        assert!(push.committed_locally());
        assert!(!commit.committed_locally());
        assert_ne!(push.recovery_hint(), commit.recovery_hint());
    }

    #[test]
    fn test_identity_display() {
        assert_eq!(Identity::new(" Ada ", "ada@example.com ").display(), "Ada <ada@example.com>");
        assert_eq!(Identity::new("", "ada@example.com").display(), "ada@example.com");
        assert!(Identity::default().is_empty());
    }

    #[test]
    fn test_contributors_dedup_case_insensitive() {
        let set: ContributorSet = vec![
            Identity::new("Ada", "Ada@Example.com"),
            Identity::new("Ada L.", "ada@example.com "),
            Identity::new("", ""),
            Identity::new("Bob", "bob@example.com"),
        ]
        .into_iter()
        .collect();

        assert_eq!(set.len(), 2);
        assert!(set.contains_email("ADA@example.com"));
        let ada = set.iter().find(|i| i.email.eq_ignore_ascii_case("ada@example.com")).unwrap();
        assert_eq!(ada.name, "Ada");
    }

    #[test]
    fn test_contributors_fill_missing_name() {
        let mut set = ContributorSet::new();
        set.insert(Identity::new("", "ada@example.com"));
        set.insert(Identity::new("Ada", "ada@example.com"));

        assert_eq!(set.iter().next().unwrap().name, "Ada");
    }

    #[test]
    fn test_changeset_rejects_empty_and_escaping_paths() {
        assert!(matches!(
            ChangeSet::new(Vec::<PathBuf>::new(), "nothing"),
            Err(Error::EmptyChangeSet)
        ));
        assert!(matches!(
            ChangeSet::new(["../outside.json"], "escape"),
            Err(Error::InvalidPath(_))
        ));
        assert!(matches!(
            ChangeSet::new(["/etc/passwd"], "absolute"),
            Err(Error::InvalidPath(_))
        ));
    }

    #[test]
    fn test_single_mutation_message() {
        let set = ChangeSet::single(Mutation::new(ChangeKind::Create, "tasks/a.json", "A")).unwrap();

        assert_eq!(set.message(), "create: A");
        assert_eq!(set.paths(), &[PathBuf::from("tasks/a.json")]);
    }

    #[test]
    fn test_batch_message_lists_every_item() {
        let mutations = vec![
            Mutation::new(ChangeKind::Delete, "tasks/a.json", "Write docs"),
            Mutation::new(ChangeKind::Delete, "tasks/b.json", "Fix bug"),
            Mutation::new(ChangeKind::Delete, "tasks/c.json", "Ship it"),
        ];
        let set = ChangeSet::batch(ChangeKind::Delete, mutations).unwrap();

        assert_eq!(set.paths().len(), 3);
        assert!(set.message().starts_with("delete: 3 items"));
        for label in ["Write docs", "Fix bug", "Ship it"] {
            assert!(set.message().contains(label));
        }
    }

    #[test]
    fn test_history_entry_parse() {
        let entry = HistoryEntry::parse_line(
            "abc123\tAda\tada@example.com\t2024-05-01T10:00:00+02:00\tcreate: A",
        )
        .unwrap();

        assert_eq!(entry.id, "abc123");
        assert_eq!(entry.author.email, "ada@example.com");
        assert!(entry.timestamp.is_some());
        assert_eq!(entry.summary, "create: A");
        assert!(HistoryEntry::parse_line("").is_none());
    }
}
