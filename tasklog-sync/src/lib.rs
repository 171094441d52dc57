//! # tasklog-sync
//!
//! Async dispatch boundary for tasklog: storage operations are queued to a
//! background worker and each completes with one message in the caller's
//! inbox.

pub mod message;
pub mod service;

pub use message::{Reply, RequestKind, SyncMessage, SyncRequest, Ticket};
pub use service::{Inbox, SyncService};
