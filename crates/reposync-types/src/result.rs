//! Result of one coordinator run.
//!
//! Constructed fresh per call and immutable once returned. Callers must
//! inspect both `status` and `errors`: `failed` means the run completed
//! with file-level errors, not that nothing happened.

use serde::{Deserialize, Serialize};

/// Outcome of an update run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateOutcome {
    /// Head commit already indexed
    NoChanges,
    /// Changes applied without file-level errors
    Updated,
    /// Changes applied, some files failed
    Failed,
}

impl std::fmt::Display for UpdateOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpdateOutcome::NoChanges => write!(f, "no_changes"),
            UpdateOutcome::Updated => write!(f, "updated"),
            UpdateOutcome::Failed => write!(f, "failed"),
        }
    }
}

/// Aggregate statistics reported by the update pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateStats {
    #[serde(default)]
    pub files_added: u64,
    #[serde(default)]
    pub files_modified: u64,
    #[serde(default)]
    pub files_deleted: u64,
    #[serde(default)]
    pub chunks_upserted: u64,
    #[serde(default)]
    pub chunks_deleted: u64,
    #[serde(default)]
    pub duration_ms: u64,
}

impl UpdateStats {
    /// Total files touched.
    pub fn files_processed(&self) -> u64 {
        self.files_added + self.files_modified + self.files_deleted
    }

    /// Whether every counter is zero.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Error recorded for a single file; does not abort the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileError {
    pub path: String,
    pub error: String,
}

impl FileError {
    pub fn new(path: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            error: error.into(),
        }
    }
}

/// Result of `UpdateCoordinator::update_repository`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorResult {
    pub repository: String,
    pub status: UpdateOutcome,

    /// Resolved head commit
    pub commit_sha: String,
    pub commit_message: String,

    pub stats: UpdateStats,

    #[serde(default)]
    pub errors: Vec<FileError>,

    /// Wall-clock duration of the whole run
    pub duration_ms: u64,
}

impl CoordinatorResult {
    /// Result for a repository whose head is already indexed.
    pub fn no_changes(
        repository: impl Into<String>,
        commit_sha: impl Into<String>,
        commit_message: impl Into<String>,
    ) -> Self {
        Self {
            repository: repository.into(),
            status: UpdateOutcome::NoChanges,
            commit_sha: commit_sha.into(),
            commit_message: commit_message.into(),
            stats: UpdateStats::default(),
            errors: Vec::new(),
            duration_ms: 0,
        }
    }

    /// Whether any file failed during the run.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}
