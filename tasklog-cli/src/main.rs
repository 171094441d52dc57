use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tasklog_core::Backend;

mod commands;
mod display;
mod tasks;

use commands::{add, contributors, init, log, remote, rm, status, whoami};

#[derive(Parser)]
#[command(name = "tasklog")]
#[command(version, about = "Task records versioned with git or jj", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a config file and bootstrap the storage repository
    Init {
        /// Version control backend (git or jj)
        #[arg(short, long, value_parser = parse_backend)]
        backend: Option<Backend>,

        /// Remote URL; enables pull and push
        #[arg(short, long)]
        remote: Option<String>,

        /// Branch or bookmark to sync
        #[arg(long)]
        branch: Option<String>,

        /// Do not push after each commit
        #[arg(long)]
        no_push: bool,
    },

    /// Add a task and record it
    Add {
        /// Task title
        title: String,

        /// Author (defaults to your VCS identity)
        #[arg(short, long)]
        author: Option<String>,
    },

    /// Delete tasks in a single recorded change
    Rm {
        /// Task ids or unique prefixes
        #[arg(required = true)]
        ids: Vec<String>,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Pull from the configured remote
    Pull,

    /// Push to the configured remote
    Push,

    /// Show the identity that will author changes
    Whoami,

    /// List everyone who has authored a change
    Contributors,

    /// Show recorded history
    Log {
        /// Number of entries to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Show storage configuration and tasks
    Status,
}

fn parse_backend(s: &str) -> std::result::Result<Backend, String> {
    Backend::parse(s).ok_or_else(|| format!("unknown backend '{}', expected git or jj", s))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = cli.config;

    match cli.command {
        Commands::Init {
            backend,
            remote,
            branch,
            no_push,
        } => {
            let options = init::InitOptions {
                backend,
                remote,
                branch,
                no_push,
            };
            init::run(options, config).await?;
        }
        Commands::Add { title, author } => {
            add::run(title, author, config).await?;
        }
        Commands::Rm { ids, yes } => {
            rm::run(ids, yes, config).await?;
        }
        Commands::Pull => {
            remote::pull(config).await?;
        }
        Commands::Push => {
            remote::push(config).await?;
        }
        Commands::Whoami => {
            whoami::run(config).await?;
        }
        Commands::Contributors => {
            contributors::run(config).await?;
        }
        Commands::Log { limit } => {
            log::run(limit, config).await?;
        }
        Commands::Status => {
            status::run(config).await?;
        }
    }

    Ok(())
}
