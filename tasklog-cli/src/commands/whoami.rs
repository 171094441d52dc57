use anyhow::Result;
use colored::Colorize;
use std::path::PathBuf;

use super::Session;

pub async fn run(config: Option<PathBuf>) -> Result<()> {
    let mut session = Session::open(config);
    let user = session.current_user().await?;

    if user.is_empty() {
        println!("{}", "No identity configured".yellow());
        println!(
            "Set {} and {} for your backend",
            "user.name".cyan(),
            "user.email".cyan()
        );
    } else {
        println!("{}", user.display());
    }
    Ok(())
}
