use anyhow::Result;
use colored::Colorize;
use std::path::PathBuf;
use tasklog_core::{ChangeKind, ChangeSet, Mutation};
use tasklog_sync::SyncRequest;

use super::Session;
use crate::display;
use crate::tasks::Task;

pub async fn run(title: String, author: Option<String>, config: Option<PathBuf>) -> Result<()> {
    let title = title.trim().to_string();
    if title.is_empty() {
        anyhow::bail!("Task title cannot be empty");
    }

    let mut session = Session::open(config);
    let settings = session.settings()?;

    let author = match author {
        Some(author) => Some(author),
        None => {
            let user = session.current_user().await?;
            if user.is_empty() {
                println!(
                    "{}",
                    "No VCS identity configured, recording task without an author".yellow()
                );
                None
            } else {
                Some(user.display())
            }
        }
    };

    let task = Task::new(title, author);
    let path = task.write(&settings.storage_root)?;
    let changes = ChangeSet::single(Mutation::new(ChangeKind::Create, &path, &task.title))?;

    let message = session
        .request(SyncRequest::Commit(changes), "Recording task...")
        .await?;
    if display::outcome("Task added", &message)? {
        println!("  {}: {}", "ID".bold(), task.id.to_string().yellow());
        println!("  {}: {}", "Title".bold(), task.title);
        if let Some(author) = &task.author {
            println!("  {}: {}", "Author".bold(), author);
        }
    }
    Ok(())
}
