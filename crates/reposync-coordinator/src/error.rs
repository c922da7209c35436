//! Error types for the update coordinator.
//!
//! [`CollaboratorError`] is what metadata stores, diff sources, working-copy
//! syncs and pipelines report. [`UpdateError`] is what the coordinator
//! reports to its caller: one variant per way an update can be refused or
//! fail, carrying the data needed to act on it.

use thiserror::Error;

/// Errors reported by external collaborators.
#[derive(Error, Debug)]
pub enum CollaboratorError {
    /// The requested object (repository, branch, commit) does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// HTTP request failed or returned an unexpected status
    #[error("HTTP error: {0}")]
    Http(String),

    /// Filesystem or process I/O failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// External command exited unsuccessfully
    #[error("Command failed: {0}")]
    Command(String),

    /// JSON encoding/decoding errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Anything else
    #[error("{0}")]
    Other(String),
}

impl CollaboratorError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, CollaboratorError::NotFound(_))
    }
}

impl From<serde_json::Error> for CollaboratorError {
    fn from(err: serde_json::Error) -> Self {
        CollaboratorError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for CollaboratorError {
    fn from(err: reqwest::Error) -> Self {
        CollaboratorError::Http(err.to_string())
    }
}

/// Reasons an incremental update was refused or failed.
///
/// Per-file pipeline errors are not represented here; they are collected in
/// the returned `CoordinatorResult`.
#[derive(Error, Debug)]
pub enum UpdateError {
    #[error("Repository not found: {repository}")]
    RepositoryNotFound { repository: String },

    #[error("Repository {repository} has no indexed commit; a full index is required")]
    MissingCommitSha { repository: String },

    #[error("Cannot determine owner/repo of {repository} from source URL '{url}'")]
    InvalidSourceUrl { repository: String, url: String },

    #[error("Failed to resolve head of branch '{branch}' for {repository}: {source}")]
    HeadLookup {
        repository: String,
        branch: String,
        source: CollaboratorError,
    },

    #[error(
        "Force push detected on {repository}: indexed commit {last_indexed_sha} is no longer in history (head is {head_sha})"
    )]
    ForcePushDetected {
        repository: String,
        last_indexed_sha: String,
        head_sha: String,
    },

    #[error(
        "{repository} has {changed_files} changed files, above the incremental update threshold of {threshold}"
    )]
    ChangeThresholdExceeded {
        repository: String,
        changed_files: usize,
        threshold: usize,
    },

    #[error(
        "Comparison for {repository} lists only {listed_files} changed files and is incomplete"
    )]
    ComparisonTruncated {
        repository: String,
        listed_files: usize,
    },

    #[error("Failed to compare commits for {repository}: {source}")]
    Comparison {
        repository: String,
        source: CollaboratorError,
    },

    #[error("git pull failed for {repository}: {source}")]
    GitPull {
        repository: String,
        source: CollaboratorError,
    },

    #[error("Update pipeline failed for {repository}: {source}")]
    Pipeline {
        repository: String,
        source: CollaboratorError,
    },

    #[error("Metadata store error for {repository}: {source}")]
    Metadata {
        repository: String,
        source: CollaboratorError,
    },

    #[error("Update of {repository} was cancelled")]
    Cancelled { repository: String },
}

impl UpdateError {
    /// Repository the error refers to.
    pub fn repository(&self) -> &str {
        match self {
            UpdateError::RepositoryNotFound { repository }
            | UpdateError::MissingCommitSha { repository }
            | UpdateError::InvalidSourceUrl { repository, .. }
            | UpdateError::HeadLookup { repository, .. }
            | UpdateError::ForcePushDetected { repository, .. }
            | UpdateError::ChangeThresholdExceeded { repository, .. }
            | UpdateError::ComparisonTruncated { repository, .. }
            | UpdateError::Comparison { repository, .. }
            | UpdateError::GitPull { repository, .. }
            | UpdateError::Pipeline { repository, .. }
            | UpdateError::Metadata { repository, .. }
            | UpdateError::Cancelled { repository } => repository,
        }
    }

    /// Stable identifier for logs and payloads.
    pub fn code(&self) -> &'static str {
        match self {
            UpdateError::RepositoryNotFound { .. } => "repository_not_found",
            UpdateError::MissingCommitSha { .. } => "missing_commit_sha",
            UpdateError::InvalidSourceUrl { .. } => "invalid_source_url",
            UpdateError::HeadLookup { .. } => "head_lookup_failed",
            UpdateError::ForcePushDetected { .. } => "force_push_detected",
            UpdateError::ChangeThresholdExceeded { .. } => "change_threshold_exceeded",
            UpdateError::ComparisonTruncated { .. } => "comparison_truncated",
            UpdateError::Comparison { .. } => "comparison_failed",
            UpdateError::GitPull { .. } => "git_pull_failed",
            UpdateError::Pipeline { .. } => "pipeline_failed",
            UpdateError::Metadata { .. } => "metadata_error",
            UpdateError::Cancelled { .. } => "cancelled",
        }
    }

    /// Whether retrying the same update later can succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            UpdateError::RepositoryNotFound { .. }
            | UpdateError::MissingCommitSha { .. }
            | UpdateError::InvalidSourceUrl { .. }
            | UpdateError::ForcePushDetected { .. }
            | UpdateError::ChangeThresholdExceeded { .. }
            | UpdateError::ComparisonTruncated { .. } => false,
            UpdateError::HeadLookup { source, .. } => !source.is_not_found(),
            UpdateError::Comparison { .. }
            | UpdateError::GitPull { .. }
            | UpdateError::Pipeline { .. }
            | UpdateError::Metadata { .. }
            | UpdateError::Cancelled { .. } => true,
        }
    }

    /// Whether the remedy is a full re-index of the repository.
    pub fn requires_full_reindex(&self) -> bool {
        matches!(
            self,
            UpdateError::MissingCommitSha { .. }
                | UpdateError::ForcePushDetected { .. }
                | UpdateError::ChangeThresholdExceeded { .. }
                | UpdateError::ComparisonTruncated { .. }
        )
    }
}
