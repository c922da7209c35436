//! Incremental update coordination for indexed repositories.
//!
//! This crate decides whether a repository can be brought up to date
//! incrementally and, if so, runs the update through narrow collaborator
//! interfaces.
//!
//! ## Key Components
//!
//! - [`UpdateCoordinator`]: Loads metadata, compares commits, pulls, runs the pipeline
//! - [`UpdateError`]: Typed refusal/failure reasons with retry and re-index hints
//! - [`MetadataStore`], [`DiffSource`], [`WorkingCopySync`], [`UpdatePipeline`]: Collaborator traits
//! - [`JsonMetadataStore`], [`InMemoryMetadataStore`]: Metadata stores
//! - [`GitHubDiffSource`]: Diff source over the GitHub REST API
//! - [`GitCliSync`]: Working-copy sync via `git pull`
//! - [`CommandPipeline`]: Pipeline delegated to an external program
//!
//! ## Example
//!
//! ```ignore
//! use reposync_coordinator::{CoordinatorConfig, UpdateCoordinator};
//!
//! let coordinator = UpdateCoordinator::new(metadata, diff_source, git, pipeline, CoordinatorConfig::default());
//! let result = coordinator.update_repository("my-api").await?;
//! println!("{} -> {}", result.repository, result.status);
//! ```

pub mod collaborators;
pub mod command_pipeline;
pub mod coordinator;
pub mod error;
pub mod git_sync;
pub mod github;
pub mod json_store;
pub mod memory_store;
pub mod source_url;

pub use collaborators::{
    DiffSource, MetadataStore, PipelineOptions, PipelineOutput, UpdatePipeline, WorkingCopySync,
};
pub use command_pipeline::CommandPipeline;
pub use coordinator::{CoordinatorConfig, UpdateCoordinator, DEFAULT_CHANGE_THRESHOLD};
pub use error::{CollaboratorError, UpdateError};
pub use git_sync::GitCliSync;
pub use github::{GitHubConfig, GitHubDiffSource, COMPARE_FILE_LIMIT};
pub use json_store::JsonMetadataStore;
pub use memory_store::InMemoryMetadataStore;
pub use source_url::RepositoryIdentity;
