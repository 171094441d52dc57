use anyhow::Result;
use colored::Colorize;
use std::path::PathBuf;
use tasklog_sync::{Reply, SyncRequest};

use super::Session;

/// One extra entry tells us whether there is more to show.
fn fetch_count(limit: usize) -> usize {
    limit.saturating_add(1)
}

pub async fn run(limit: usize, config: Option<PathBuf>) -> Result<()> {
    let mut session = Session::open(config);
    let message = session
        .request(SyncRequest::History(fetch_count(limit)), "Reading history...")
        .await?;
    let mut entries = match message.reply {
        Reply::History(entries) => entries,
        Reply::Fatal(error) => anyhow::bail!(error),
        other => anyhow::bail!("Unexpected reply: {:?}", other),
    };

    if entries.is_empty() {
        println!("{}", "No history yet".yellow());
        return Ok(());
    }

    let more = entries.len() > limit;
    entries.truncate(limit);

    println!("{}", "History".bold().cyan());
    println!();

    for entry in &entries {
        println!(
            "{} {}",
            "change".yellow().bold(),
            entry.id.yellow()
        );
        if !entry.author.is_empty() {
            println!("{}: {}", "Author".bold(), entry.author.display());
        }
        if let Some(timestamp) = entry.timestamp {
            println!("{}: {}", "Date".bold(), timestamp.format("%Y-%m-%d %H:%M:%S"));
        }
        println!();
        println!("    {}", entry.summary);
        println!();
    }

    if more {
        println!("{}", "... older entries not shown".dimmed());
        println!("Use {} to see more", "--limit N".cyan());
    }
    Ok(())
}
