//! Interfaces the coordinator depends on.
//!
//! Each collaborator is an async trait object so the coordinator can be
//! wired with real adapters in the binary and with fakes in tests.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use reposync_types::{
    ChangedFile, Comparison, FileError, HeadCommit, RepositorySnapshot, UpdateStats,
};

use crate::error::CollaboratorError;

/// Storage of repository snapshots.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Snapshot for `name`, or `None` if the repository is unknown.
    async fn get_repository(
        &self,
        name: &str,
    ) -> Result<Option<RepositorySnapshot>, CollaboratorError>;

    /// Replace the stored snapshot. Must be atomic per repository name.
    async fn update_repository(
        &self,
        snapshot: &RepositorySnapshot,
    ) -> Result<(), CollaboratorError>;
}

/// Remote view of a repository's history.
#[async_trait]
pub trait DiffSource: Send + Sync {
    /// Head commit of `branch`.
    ///
    /// Fails with `CollaboratorError::NotFound` when the repository or branch
    /// does not exist.
    async fn get_head_commit(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> Result<HeadCommit, CollaboratorError>;

    /// Files changed between `base` and `head`.
    ///
    /// Fails with `CollaboratorError::NotFound` when `base` is no longer part
    /// of the repository history.
    async fn compare_commits(
        &self,
        owner: &str,
        repo: &str,
        base: &str,
        head: &str,
    ) -> Result<Comparison, CollaboratorError>;
}

/// Brings the local clone to the remote branch head.
#[async_trait]
pub trait WorkingCopySync: Send + Sync {
    async fn pull(&self, local_path: &Path, branch: &str) -> Result<(), CollaboratorError>;
}

/// Context handed to the update pipeline with the changed files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineOptions {
    pub repository: String,
    pub local_path: PathBuf,
    pub base_sha: String,
    pub head_sha: String,
}

/// What the pipeline reports back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineOutput {
    #[serde(default)]
    pub stats: UpdateStats,
    #[serde(default)]
    pub errors: Vec<FileError>,
}

/// Applies changed files to the index (chunking, embedding, storage).
#[async_trait]
pub trait UpdatePipeline: Send + Sync {
    /// Process the changed files.
    ///
    /// Per-file failures are reported in `PipelineOutput::errors`; an `Err`
    /// is reserved for failures that prevent processing altogether.
    async fn process_changes(
        &self,
        files: &[ChangedFile],
        options: &PipelineOptions,
    ) -> Result<PipelineOutput, CollaboratorError>;
}
