use anyhow::Result;
use colored::Colorize;
use std::path::PathBuf;
use tasklog_core::Sentinel;

use super::Session;
use crate::tasks;

pub async fn run(config: Option<PathBuf>) -> Result<()> {
    let mut session = Session::open(config);

    if !session.config().path().exists() {
        println!(
            "{} {}",
            "No config found at".yellow(),
            session.config().path().display()
        );
        println!("Run {} to set up storage", "tasklog init".cyan());
        println!();
    }

    let settings = session.settings()?;
    let root = &settings.storage_root;

    println!("{}", "Storage Status".bold().cyan());
    println!("  {}: {}", "Root".bold(), root.display());
    println!("  {}: {}", "Backend".bold(), settings.backend);
    if settings.remote_enabled {
        println!(
            "  {}: {} ({})",
            "Remote".bold(),
            settings.remote_name,
            settings.default_branch
        );
        println!(
            "  {}: {}",
            "Push on commit".bold(),
            if settings.push_on_commit { "yes" } else { "no" }
        );
    } else {
        println!("  {}: {}", "Remote".bold(), "disabled".dimmed());
    }

    if !root.is_dir() {
        println!();
        println!("{}", "Storage root does not exist".red());
        return Ok(());
    }

    let initialized = Sentinel::exists(root);
    println!(
        "  {}: {}",
        "Initialized".bold(),
        if initialized { "yes".green() } else { "no".yellow() }
    );

    let user = session.current_user().await?;
    if user.is_empty() {
        println!("  {}: {}", "Identity".bold(), "not configured".yellow());
    } else {
        println!("  {}: {}", "Identity".bold(), user.display());
    }
    println!();

    let all = tasks::list(root)?;
    if all.is_empty() {
        println!("{}", "No tasks".green());
        println!("Run {} to add one", "tasklog add \"title\"".cyan());
        return Ok(());
    }

    println!(
        "{} {}",
        "Tasks:".bold(),
        format!("({})", all.len()).yellow()
    );
    for task in all.iter().take(20) {
        println!(
            "  {} {}",
            task.id.to_string()[..8].yellow(),
            task.title
        );
    }
    if all.len() > 20 {
        println!(
            "  {} and {} more...",
            "...".dimmed(),
            (all.len() - 20).to_string().yellow()
        );
    }
    Ok(())
}
