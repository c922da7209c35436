//! reposync library exports.
//!
//! This crate provides the `reposync` binary.
//!
//! # Modules
//!
//! - `cli`: Command-line argument parsing with clap
//! - `commands`: Command implementations (update, list, show)

pub mod cli;
pub mod commands;

pub use cli::{Cli, Commands};
pub use commands::{
    build_service, init_logging, list_repositories, load_settings, run_update, show_repository,
};
