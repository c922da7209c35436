//! # reposync-types
//!
//! Shared domain types for incremental repository updates.
//!
//! This crate defines the data structures passed between the update
//! coordinator, the scheduler and the trigger surface:
//! - Repository snapshots: what was last indexed for a repository
//! - Comparisons: changed files between two commits, as reported by a diff source
//! - Coordinator results: outcome and statistics of one update run
//! - Settings: layered configuration
//!
//! ## Usage
//!
//! ```rust
//! use reposync_types::{RepositorySnapshot, RepositoryStatus};
//!
//! let snapshot = RepositorySnapshot::new(
//!     "my-api",
//!     "https://github.com/acme/my-api",
//!     "main",
//!     "/var/lib/reposync/my-api",
//! );
//! assert_eq!(snapshot.status, RepositoryStatus::Pending);
//! ```

pub mod comparison;
pub mod config;
pub mod error;
pub mod repository;
pub mod result;

pub use comparison::{short_sha, ChangeKind, ChangedFile, Comparison, HeadCommit};
pub use config::{GitHubSettings, PipelineSettings, Settings, UpdateSettings};
pub use error::ConfigError;
pub use repository::{RepositorySnapshot, RepositoryStatus};
pub use result::{CoordinatorResult, FileError, UpdateOutcome, UpdateStats};
