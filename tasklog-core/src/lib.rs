//! # tasklog-core
//!
//! Core library for tasklog - version-controlled storage for task records.
//!
//! This crate turns each record mutation into a commit through one of two
//! interchangeable backends (`git` or `jj`), keeps an optional remote in sync,
//! and resolves contributor identities from the backend's configuration and
//! history.

pub mod backend;
pub mod config;
pub mod error;
pub mod identity;
pub mod models;
pub mod orchestrator;
pub mod process;
pub mod sentinel;

pub use backend::VcsBackend;
pub use config::{ConfigProvider, FileConfig, RepositorySnapshot, Settings, StaticConfig};
pub use error::{Error, Result};
pub use identity::{AssigneeSuggestion, IdentityResolver};
pub use models::{
    Backend, ChangeKind, ChangeSet, ContributorSet, HistoryEntry, Identity, Mutation,
    OperationOutcome, Stage, StageFailure,
};
pub use orchestrator::Orchestrator;
pub use process::{CommandOutput, CommandRunner, ScriptedRunner, SystemRunner};
pub use sentinel::{Sentinel, SENTINEL_FILE};
