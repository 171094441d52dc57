use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::Backend;
use crate::sentinel::Sentinel;

/// User-editable configuration for one storage root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub storage_root: PathBuf,
    pub backend: Backend,
    pub remote_enabled: bool,
    pub push_on_commit: bool,
    /// Branch (git) or bookmark (jj) that is pulled and pushed.
    pub default_branch: String,
    pub remote_name: String,
    /// Registered under `remote_name` when the root is bootstrapped.
    pub remote_url: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from("."),
            backend: Backend::Git,
            remote_enabled: false,
            push_on_commit: true,
            default_branch: "main".to_string(),
            remote_name: "origin".to_string(),
            remote_url: None,
        }
    }
}

impl Settings {
    pub fn new(storage_root: impl Into<PathBuf>, backend: Backend) -> Self {
        Self {
            storage_root: storage_root.into(),
            backend,
            ..Self::default()
        }
    }

    pub fn with_remote(mut self, push_on_commit: bool) -> Self {
        self.remote_enabled = true;
        self.push_on_commit = push_on_commit;
        self
    }

    pub fn with_remote_url(mut self, url: impl Into<String>) -> Self {
        self.remote_url = Some(url.into());
        self
    }

    pub fn with_default_branch(mut self, branch: impl Into<String>) -> Self {
        self.default_branch = branch.into();
        self
    }
}

/// Source of configuration, consulted once per orchestrated operation.
pub trait ConfigProvider: Send + Sync {
    fn snapshot(&self) -> Result<Settings>;
}

/// Reads a TOML file on every snapshot.
pub struct FileConfig {
    path: PathBuf,
}

impl FileConfig {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self, settings: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, toml::to_string_pretty(settings)?)?;
        Ok(())
    }
}

impl ConfigProvider for FileConfig {
    fn snapshot(&self) -> Result<Settings> {
        let mut settings = if self.path.exists() {
            let raw = fs::read_to_string(&self.path)?;
            toml::from_str::<Settings>(&raw)?
        } else {
            debug!("No config at {:?}, using defaults", self.path);
            Settings::default()
        };

        if settings.storage_root.is_relative() {
            let base = self
                .path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."));
            settings.storage_root = base.join(&settings.storage_root);
        }
        Ok(settings)
    }
}

/// In-memory configuration that can be swapped between operations.
pub struct StaticConfig {
    settings: RwLock<Settings>,
}

impl StaticConfig {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: RwLock::new(settings),
        }
    }

    pub fn replace(&self, settings: Settings) {
        let mut guard = self.settings.write().unwrap_or_else(|p| p.into_inner());
        *guard = settings;
    }
}

impl ConfigProvider for StaticConfig {
    fn snapshot(&self) -> Result<Settings> {
        let guard = self.settings.read().unwrap_or_else(|p| p.into_inner());
        Ok(guard.clone())
    }
}

/// Immutable view of a storage root for the duration of one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositorySnapshot {
    pub root: PathBuf,
    pub backend: Backend,
    pub initialized: bool,
    pub remote_enabled: bool,
    pub push_on_commit: bool,
    pub default_branch: String,
    pub remote_name: String,
    pub remote_url: Option<String>,
}

impl RepositorySnapshot {
    /// Fails when the storage root does not exist.
    pub fn capture(settings: Settings) -> Result<Self> {
        if !settings.storage_root.is_dir() {
            return Err(Error::StorageRootMissing(settings.storage_root));
        }
        Ok(Self {
            initialized: Sentinel::exists(&settings.storage_root),
            root: settings.storage_root,
            backend: settings.backend,
            remote_enabled: settings.remote_enabled,
            push_on_commit: settings.push_on_commit,
            default_branch: settings.default_branch,
            remote_name: settings.remote_name,
            remote_url: settings.remote_url,
        })
    }

    pub fn should_push(&self) -> bool {
        self.remote_enabled && self.push_on_commit
    }
}
