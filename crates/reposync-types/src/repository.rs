//! Repository snapshot type.
//!
//! A snapshot is the metadata kept for one indexed repository: where it
//! comes from, where its working copy lives and which commit the index
//! currently reflects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Indexing status of a repository
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RepositoryStatus {
    /// Registered but never indexed
    #[default]
    Pending,
    /// Index is being built or updated
    Indexing,
    /// Index reflects `last_indexed_commit_sha`
    Ready,
    /// Last update finished with file-level errors
    Error,
}

impl std::fmt::Display for RepositoryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RepositoryStatus::Pending => write!(f, "pending"),
            RepositoryStatus::Indexing => write!(f, "indexing"),
            RepositoryStatus::Ready => write!(f, "ready"),
            RepositoryStatus::Error => write!(f, "error"),
        }
    }
}

/// Stored metadata for one indexed repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositorySnapshot {
    /// Unique repository name used by callers
    pub name: String,

    /// Remote source URL (https or ssh form)
    pub url: String,

    /// Tracked branch
    pub branch: String,

    /// Local clone path
    pub local_path: String,

    /// Commit the index currently reflects.
    /// Must be set before an incremental update can run.
    #[serde(default)]
    pub last_indexed_commit_sha: Option<String>,

    /// Number of indexed files
    #[serde(default)]
    pub file_count: u64,

    /// Number of stored chunks
    #[serde(default)]
    pub chunk_count: u64,

    /// Current status
    #[serde(default)]
    pub status: RepositoryStatus,

    /// When the last full index finished
    #[serde(default)]
    pub last_indexed_at: Option<DateTime<Utc>>,

    /// Number of incremental updates applied since the last full index
    #[serde(default)]
    pub incremental_update_count: u64,

    /// When the last incremental update finished
    #[serde(default)]
    pub last_incremental_update_at: Option<DateTime<Utc>>,
}

impl RepositorySnapshot {
    /// Create a snapshot for a repository that has not been indexed yet.
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        branch: impl Into<String>,
        local_path: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            branch: branch.into(),
            local_path: local_path.into(),
            last_indexed_commit_sha: None,
            file_count: 0,
            chunk_count: 0,
            status: RepositoryStatus::Pending,
            last_indexed_at: None,
            incremental_update_count: 0,
            last_incremental_update_at: None,
        }
    }

    /// Set the indexed commit (builder style, mostly for fixtures).
    pub fn with_indexed_commit(mut self, sha: impl Into<String>) -> Self {
        self.last_indexed_commit_sha = Some(sha.into());
        self.status = RepositoryStatus::Ready;
        self
    }

    /// Set file and chunk counts.
    pub fn with_counts(mut self, file_count: u64, chunk_count: u64) -> Self {
        self.file_count = file_count;
        self.chunk_count = chunk_count;
        self
    }

    /// Whether an incremental update can start from this snapshot.
    pub fn can_update_incrementally(&self) -> bool {
        self.last_indexed_commit_sha
            .as_deref()
            .is_some_and(|sha| !sha.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_snapshot_is_pending() {
        let snapshot = RepositorySnapshot::new(
            "my-api",
            "https://github.com/acme/my-api",
            "main",
            "/tmp/my-api",
        );
        assert_eq!(snapshot.status, RepositoryStatus::Pending);
        assert!(snapshot.last_indexed_commit_sha.is_none());
        assert!(!snapshot.can_update_incrementally());
    }

    #[test]
    fn test_empty_sha_cannot_update() {
        let snapshot = RepositorySnapshot::new("r", "u", "main", "/tmp/r").with_indexed_commit("");
        assert!(!snapshot.can_update_incrementally());
    }

    #[test]
    fn test_with_indexed_commit() {
        let snapshot = RepositorySnapshot::new("r", "u", "main", "/tmp/r")
            .with_indexed_commit("abc1234")
            .with_counts(10, 120);
        assert!(snapshot.can_update_incrementally());
        assert_eq!(snapshot.status, RepositoryStatus::Ready);
        assert_eq!(snapshot.chunk_count, 120);
    }

    #[test]
    fn test_deserialize_with_missing_optional_fields() {
        let json = r#"{
            "name": "my-api",
            "url": "https://github.com/acme/my-api",
            "branch": "main",
            "local_path": "/srv/my-api"
        }"#;
        let snapshot: RepositorySnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.incremental_update_count, 0);
        assert_eq!(snapshot.status, RepositoryStatus::Pending);
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&RepositoryStatus::Ready).unwrap();
        assert_eq!(json, "\"ready\"");
        assert_eq!(RepositoryStatus::Error.to_string(), "error");
    }
}
