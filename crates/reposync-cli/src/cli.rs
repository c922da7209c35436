//! CLI argument parsing for reposync.
//!
//! CLI flags override all other config sources.

use clap::{Parser, Subcommand};

/// Incremental repository index updates
///
/// Brings indexed repositories up to date with their remote branch without
/// a full re-index.
#[derive(Parser, Debug)]
#[command(name = "reposync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/reposync/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Override repository metadata file
    #[arg(long, global = true)]
    pub metadata_path: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run an incremental update for a repository
    Update {
        /// Repository name
        repository: String,

        /// Run as a background job and poll it until it finishes
        #[arg(long = "async")]
        run_async: bool,

        /// Poll interval for --async (milliseconds)
        #[arg(long, default_value = "1000")]
        poll_interval_ms: u64,
    },

    /// List known repositories
    List,

    /// Show stored metadata of one repository
    Show {
        /// Repository name
        repository: String,
    },
}
