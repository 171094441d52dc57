use anyhow::Result;
use colored::Colorize;
use std::path::PathBuf;
use tasklog_sync::SyncRequest;

use super::Session;
use crate::display;

pub async fn pull(config: Option<PathBuf>) -> Result<()> {
    let mut session = Session::open(config);
    if !session.settings()?.remote_enabled {
        println!("{}", "Remote sync is disabled, nothing to pull".yellow());
        return Ok(());
    }
    let message = session
        .request(SyncRequest::Pull, "Pulling from remote...")
        .await?;
    display::outcome("Up to date with remote", &message)?;
    Ok(())
}

pub async fn push(config: Option<PathBuf>) -> Result<()> {
    let mut session = Session::open(config);
    if !session.settings()?.remote_enabled {
        println!("{}", "Remote sync is disabled, nothing to push".yellow());
        return Ok(());
    }
    let message = session
        .request(SyncRequest::Push, "Pushing to remote...")
        .await?;
    display::outcome("Published", &message)?;
    Ok(())
}
