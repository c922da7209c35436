//! Commit comparison types.
//!
//! Produced by a diff source for each update run and never persisted.

use serde::{Deserialize, Serialize};

/// How a file changed between two commits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    Renamed,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeKind::Added => write!(f, "added"),
            ChangeKind::Modified => write!(f, "modified"),
            ChangeKind::Deleted => write!(f, "deleted"),
            ChangeKind::Renamed => write!(f, "renamed"),
        }
    }
}

/// One changed file in a comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedFile {
    /// Path relative to the repository root
    pub path: String,

    pub kind: ChangeKind,

    /// Path before a rename
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_path: Option<String>,
}

impl ChangedFile {
    pub fn new(path: impl Into<String>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
            previous_path: None,
        }
    }

    pub fn renamed(previous_path: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: ChangeKind::Renamed,
            previous_path: Some(previous_path.into()),
        }
    }
}

/// Head commit of a branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadCommit {
    pub sha: String,
    pub message: String,
}

impl HeadCommit {
    pub fn new(sha: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            sha: sha.into(),
            message: message.into(),
        }
    }

    /// First 7 characters of the sha, as shown to users.
    pub fn short_sha(&self) -> &str {
        short_sha(&self.sha)
    }
}

/// Truncate a commit sha to its 7-character display form.
pub fn short_sha(sha: &str) -> &str {
    match sha.char_indices().nth(7) {
        Some((idx, _)) => &sha[..idx],
        None => sha,
    }
}

/// Changes between a base and a head commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comparison {
    pub base_sha: String,
    pub head_sha: String,

    /// Commits between base and head
    pub total_commits: u32,

    pub files: Vec<ChangedFile>,

    /// The source listed fewer files than actually changed
    #[serde(default)]
    pub truncated: bool,
}

impl Comparison {
    /// Number of changed files.
    pub fn changed_file_count(&self) -> usize {
        self.files.len()
    }

    /// Number of files of the given kind.
    pub fn count_of(&self, kind: ChangeKind) -> usize {
        self.files.iter().filter(|f| f.kind == kind).count()
    }
}
