use anyhow::Result;
use colored::Colorize;
use std::path::PathBuf;
use tasklog_core::{Backend, Settings};
use tasklog_sync::SyncRequest;

use super::Session;
use crate::display;

pub struct InitOptions {
    pub backend: Option<Backend>,
    pub remote: Option<String>,
    pub branch: Option<String>,
    pub no_push: bool,
}

pub async fn run(options: InitOptions, config: Option<PathBuf>) -> Result<()> {
    let mut session = Session::open(config);

    if !session.config().path().exists() {
        let mut settings = Settings::default();
        if let Some(backend) = options.backend {
            settings.backend = backend;
        }
        if let Some(branch) = options.branch {
            settings.default_branch = branch;
        }
        if let Some(url) = options.remote {
            settings = settings.with_remote(!options.no_push).with_remote_url(url);
        }
        session.config().save(&settings)?;
        println!(
            "{} {}",
            "Wrote".bold(),
            session.config().path().display().to_string().cyan()
        );
    } else if options.backend.is_some() || options.remote.is_some() || options.branch.is_some() {
        println!(
            "{}",
            "Config already exists; edit it to change backend or remote".yellow()
        );
    }

    let settings = session.settings()?;
    std::fs::create_dir_all(&settings.storage_root)?;

    println!("{}", "Initializing storage...".bold());
    println!("  {}: {}", "Root".bold(), settings.storage_root.display());
    println!("  {}: {}", "Backend".bold(), settings.backend);
    println!();

    let message = session
        .request(SyncRequest::Init, "Bootstrapping repository...")
        .await?;
    display::outcome("Storage ready", &message)?;
    Ok(())
}
