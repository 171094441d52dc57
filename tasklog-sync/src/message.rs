use chrono::{DateTime, Utc};
use std::fmt;
use tasklog_core::{ChangeSet, ContributorSet, HistoryEntry, Identity, OperationOutcome};
use uuid::Uuid;

/// Identifies one dispatched request and its reply.
pub type Ticket = Uuid;

#[derive(Debug, Clone)]
pub enum SyncRequest {
    Init,
    Commit(ChangeSet),
    Pull,
    Push,
    CurrentUser,
    AllContributors,
    History(usize),
}

impl SyncRequest {
    pub fn kind(&self) -> RequestKind {
        match self {
            SyncRequest::Init => RequestKind::Init,
            SyncRequest::Commit(_) => RequestKind::Commit,
            SyncRequest::Pull => RequestKind::Pull,
            SyncRequest::Push => RequestKind::Push,
            SyncRequest::CurrentUser => RequestKind::CurrentUser,
            SyncRequest::AllContributors => RequestKind::AllContributors,
            SyncRequest::History(_) => RequestKind::History,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Init,
    Commit,
    Pull,
    Push,
    CurrentUser,
    AllContributors,
    History,
}

impl RequestKind {
    pub fn as_str(&self) -> &str {
        match self {
            RequestKind::Init => "init",
            RequestKind::Commit => "commit",
            RequestKind::Pull => "pull",
            RequestKind::Push => "push",
            RequestKind::CurrentUser => "current-user",
            RequestKind::AllContributors => "contributors",
            RequestKind::History => "history",
        }
    }
}

impl RequestKind {
    /// Orchestrated operations that touch the repository. Only these are
    /// refused by [`SyncService::try_dispatch`](crate::SyncService::try_dispatch)
    /// while another is outstanding.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            RequestKind::Init | RequestKind::Commit | RequestKind::Pull | RequestKind::Push
        )
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Outcome(OperationOutcome),
    Identity(Identity),
    Contributors(ContributorSet),
    History(Vec<HistoryEntry>),
    /// Unrecoverable error, e.g. the storage root disappeared.
    Fatal(String),
}

/// Posted to the inbox exactly once per dispatched request.
#[derive(Debug, Clone)]
pub struct SyncMessage {
    pub ticket: Ticket,
    pub kind: RequestKind,
    pub reply: Reply,
    pub finished_at: DateTime<Utc>,
}

impl SyncMessage {
    pub fn outcome(&self) -> Option<&OperationOutcome> {
        match &self.reply {
            Reply::Outcome(outcome) => Some(outcome),
            _ => None,
        }
    }
}
