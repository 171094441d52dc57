//! # tasklog
//!
//! Umbrella crate re-exporting the storage synchronization layer and its
//! async dispatch boundary.

pub use tasklog_core as core;
pub use tasklog_sync as sync;
