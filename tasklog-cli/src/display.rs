use anyhow::{bail, Result};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tasklog_core::{OperationOutcome, StageFailure};
use tasklog_sync::{Reply, SyncMessage};

pub fn spinner(message: impl Into<String>) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.into());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// Prints the result of an orchestrated operation. Returns whether it
/// succeeded.
pub fn outcome(done: &str, message: &SyncMessage) -> Result<bool> {
    match &message.reply {
        Reply::Outcome(OperationOutcome::Done) => {
            println!("{}", format!("✓ {}", done).green().bold());
            Ok(true)
        }
        Reply::Outcome(OperationOutcome::Failed(failure)) => {
            failure_report(failure);
            Ok(false)
        }
        Reply::Fatal(error) => bail!("{} failed: {}", message.kind, error),
        other => bail!("Unexpected reply to {}: {:?}", message.kind, other),
    }
}

pub fn failure_report(failure: &StageFailure) {
    if failure.committed_locally() {
        println!("{}", "! Committed locally, not published".yellow().bold());
    } else {
        println!("{}", format!("✗ {} failed", failure.stage).red().bold());
    }
    println!("  {}: {}", "Stage".bold(), failure.stage);
    println!("  {}: {}", "Cause".bold(), failure.cause);
    if !failure.raw_output.trim().is_empty() {
        println!();
        for line in failure.raw_output.lines() {
            println!("    {}", line.dimmed());
        }
    }
    println!();
    println!("{}", failure.recovery_hint());
}
