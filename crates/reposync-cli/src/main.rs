//! reposync
//!
//! Incremental index updates for code repositories.
//!
//! # Usage
//!
//! ```bash
//! reposync update <REPOSITORY> [--async] [--poll-interval-ms MS]
//! reposync list
//! reposync show <REPOSITORY>
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/reposync/config.toml)
//! 3. Environment variables (REPOSYNC_*)
//! 4. CLI flags

use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use reposync_cli::{
    init_logging, list_repositories, load_settings, run_update, show_repository, Cli, Commands,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(&cli)?;
    init_logging(&settings)?;

    match cli.command {
        Commands::Update {
            repository,
            run_async,
            poll_interval_ms,
        } => {
            run_update(
                &settings,
                &repository,
                run_async,
                Duration::from_millis(poll_interval_ms),
            )
            .await?;
        }
        Commands::List => {
            list_repositories(&settings).await?;
        }
        Commands::Show { repository } => {
            show_repository(&settings, &repository).await?;
        }
    }

    Ok(())
}
