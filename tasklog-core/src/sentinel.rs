//! Marker file recording that a storage root has been bootstrapped.

use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::Result;
use crate::models::Backend;

/// Fixed path of the sentinel, relative to the storage root.
pub const SENTINEL_FILE: &str = ".tasklog-initialized";

pub struct Sentinel;

impl Sentinel {
    pub fn path(root: &Path) -> PathBuf {
        root.join(SENTINEL_FILE)
    }

    pub fn exists(root: &Path) -> bool {
        Self::path(root).is_file()
    }

    pub fn create(root: &Path, backend: Backend) -> Result<PathBuf> {
        let path = Self::path(root);
        let contents = format!(
            "backend = \"{}\"\ninitialized = \"{}\"\n",
            backend.as_str(),
            Utc::now().to_rfc3339()
        );
        fs::write(&path, contents)?;
        Ok(path)
    }

    /// Undo a bootstrap that never reached its first commit.
    pub(crate) fn discard(root: &Path) {
        if let Err(e) = fs::remove_file(Self::path(root)) {
            warn!("Could not remove sentinel after failed init: {}", e);
        }
    }
}
