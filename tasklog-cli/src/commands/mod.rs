pub mod add;
pub mod contributors;
pub mod init;
pub mod log;
pub mod remote;
pub mod rm;
pub mod status;
pub mod whoami;

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tasklog_core::{ConfigProvider, FileConfig, Identity, Orchestrator, Settings};
use tasklog_sync::{Inbox, Reply, SyncMessage, SyncRequest, SyncService};
use tracing::debug;

use crate::display;

pub fn get_config_path(custom_path: Option<PathBuf>) -> PathBuf {
    custom_path.unwrap_or_else(|| PathBuf::from("tasklog.toml"))
}

/// A running sync worker plus the configuration it reads.
pub struct Session {
    config: Arc<FileConfig>,
    service: SyncService,
    inbox: Inbox,
}

impl Session {
    pub fn open(config_path: Option<PathBuf>) -> Self {
        let path = get_config_path(config_path);
        debug!("Using config {}", path.display());
        let config = Arc::new(FileConfig::new(path));
        let orchestrator =
            Orchestrator::with_system_runner(Arc::clone(&config) as Arc<dyn ConfigProvider>);
        let (service, inbox) = SyncService::start(orchestrator);
        Self {
            config,
            service,
            inbox,
        }
    }

    pub fn config(&self) -> &FileConfig {
        &self.config
    }

    pub fn settings(&self) -> Result<Settings> {
        self.config
            .snapshot()
            .with_context(|| format!("Could not read {}", self.config.path().display()))
    }

    /// Dispatches and waits for the matching message, spinning meanwhile.
    pub async fn request(&mut self, request: SyncRequest, waiting: &str) -> Result<SyncMessage> {
        let ticket = self.service.dispatch(request)?;
        let pb = display::spinner(waiting);
        let result: Result<SyncMessage> = loop {
            match self.inbox.recv().await {
                Some(message) if message.ticket == ticket => break Ok(message),
                Some(_) => continue,
                None => break Err(tasklog_core::Error::WorkerClosed.into()),
            }
        };
        pb.finish_and_clear();
        result
    }

    pub async fn current_user(&mut self) -> Result<Identity> {
        let message = self
            .request(SyncRequest::CurrentUser, "Reading identity...")
            .await?;
        match message.reply {
            Reply::Identity(identity) => Ok(identity),
            Reply::Fatal(error) => anyhow::bail!(error),
            other => anyhow::bail!("Unexpected reply: {:?}", other),
        }
    }
}
