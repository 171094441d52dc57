use anyhow::Result;
use colored::Colorize;
use std::path::PathBuf;
use tasklog_core::IdentityResolver;
use tasklog_sync::{Reply, SyncRequest};

use super::Session;

pub async fn run(config: Option<PathBuf>) -> Result<()> {
    let mut session = Session::open(config);
    let current = session.current_user().await?;

    let message = session
        .request(SyncRequest::AllContributors, "Reading history...")
        .await?;
    let contributors = match message.reply {
        Reply::Contributors(contributors) => contributors,
        Reply::Fatal(error) => anyhow::bail!(error),
        other => anyhow::bail!("Unexpected reply: {:?}", other),
    };

    let suggestions = IdentityResolver::from_identity(current).assignee_suggestions(&contributors);
    if suggestions.is_empty() {
        println!("{}", "No contributors yet".yellow());
        return Ok(());
    }

    println!("{}", "Contributors".bold().cyan());
    for suggestion in suggestions {
        if suggestion.is_you {
            println!("  {}", suggestion.label().green());
        } else {
            println!("  {}", suggestion.label());
        }
    }
    Ok(())
}
