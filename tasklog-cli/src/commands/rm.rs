use anyhow::Result;
use colored::Colorize;
use dialoguer::Confirm;
use std::path::PathBuf;
use tasklog_core::{ChangeKind, ChangeSet, Mutation};
use tasklog_sync::SyncRequest;

use super::Session;
use crate::display;
use crate::tasks;

pub async fn run(ids: Vec<String>, yes: bool, config: Option<PathBuf>) -> Result<()> {
    let mut session = Session::open(config);
    let settings = session.settings()?;
    let found = tasks::find(&settings.storage_root, &ids)?;

    println!("{}", "Tasks to delete:".bold());
    for task in &found {
        println!(
            "  {} {} {}",
            "-".red(),
            task.id.to_string()[..8].yellow(),
            task.title
        );
    }
    println!();

    if !yes {
        let confirmed = Confirm::new()
            .with_prompt(format!("Delete {} task(s)?", found.len()))
            .default(false)
            .interact()?;
        if !confirmed {
            println!("{}", "Cancelled".yellow());
            return Ok(());
        }
    }

    // Whatever was deleted is recorded, even if a later file could not be.
    let removal = tasks::remove_all(&settings.storage_root, &found);
    if !removal.removed.is_empty() {
        let count = removal.removed.len();
        let mutations = removal
            .removed
            .into_iter()
            .map(|(task, path)| Mutation::new(ChangeKind::Delete, path, task.title))
            .collect();
        let changes = ChangeSet::batch(ChangeKind::Delete, mutations)?;

        let message = session
            .request(SyncRequest::Commit(changes), "Recording deletion...")
            .await?;
        display::outcome(&format!("Deleted {} task(s)", count), &message)?;
    }

    match removal.error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
