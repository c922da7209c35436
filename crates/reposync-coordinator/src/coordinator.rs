//! Incremental update coordinator.
//!
//! Decides, for one named repository, whether an incremental update may run
//! and if so drives it: remote head lookup, comparison with the indexed
//! commit, working-copy sync, pipeline, metadata write.
//!
//! The coordinator holds no state of its own between calls. Mutual exclusion
//! per repository is the caller's job (see `reposync-scheduler`).

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use reposync_types::{
    short_sha, ChangeKind, CoordinatorResult, RepositorySnapshot, RepositoryStatus, UpdateOutcome,
    UpdateSettings, UpdateStats,
};

use crate::collaborators::{
    DiffSource, MetadataStore, PipelineOptions, UpdatePipeline, WorkingCopySync,
};
use crate::error::UpdateError;
use crate::source_url::RepositoryIdentity;

/// Default maximum number of changed files handled incrementally.
pub const DEFAULT_CHANGE_THRESHOLD: usize = 500;

/// Configuration for the update coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Comparisons with more changed files than this are refused
    pub change_threshold: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            change_threshold: DEFAULT_CHANGE_THRESHOLD,
        }
    }
}

impl CoordinatorConfig {
    /// Set the change threshold.
    pub fn with_change_threshold(mut self, threshold: usize) -> Self {
        self.change_threshold = threshold;
        self
    }
}

impl From<&UpdateSettings> for CoordinatorConfig {
    fn from(settings: &UpdateSettings) -> Self {
        Self {
            change_threshold: settings.change_threshold,
        }
    }
}

/// Orchestrates incremental updates over external collaborators.
pub struct UpdateCoordinator {
    metadata: Arc<dyn MetadataStore>,
    diff_source: Arc<dyn DiffSource>,
    working_copy: Arc<dyn WorkingCopySync>,
    pipeline: Arc<dyn UpdatePipeline>,
    config: CoordinatorConfig,
}

impl UpdateCoordinator {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        diff_source: Arc<dyn DiffSource>,
        working_copy: Arc<dyn WorkingCopySync>,
        pipeline: Arc<dyn UpdatePipeline>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            metadata,
            diff_source,
            working_copy,
            pipeline,
            config,
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Run an incremental update for `repository`.
    pub async fn update_repository(
        &self,
        repository: &str,
    ) -> Result<CoordinatorResult, UpdateError> {
        self.update_repository_with_cancel(repository, &CancellationToken::new())
            .await
    }

    /// Run an incremental update, stopping early if `cancel` fires.
    ///
    /// Cancellation is honoured up to the start of the pipeline. Once the
    /// pipeline has been invoked the run completes and records the new
    /// commit, so the stored sha always matches what was indexed.
    pub async fn update_repository_with_cancel(
        &self,
        repository: &str,
        cancel: &CancellationToken,
    ) -> Result<CoordinatorResult, UpdateError> {
        let started = Instant::now();

        let snapshot = self
            .metadata
            .get_repository(repository)
            .await
            .map_err(|source| UpdateError::Metadata {
                repository: repository.to_string(),
                source,
            })?
            .ok_or_else(|| UpdateError::RepositoryNotFound {
                repository: repository.to_string(),
            })?;

        let base_sha = match snapshot.last_indexed_commit_sha.as_deref() {
            Some(sha) if !sha.is_empty() => sha.to_string(),
            _ => {
                return Err(UpdateError::MissingCommitSha {
                    repository: repository.to_string(),
                })
            }
        };

        let identity =
            RepositoryIdentity::parse(&snapshot.url).ok_or_else(|| UpdateError::InvalidSourceUrl {
                repository: repository.to_string(),
                url: snapshot.url.clone(),
            })?;

        let head = unless_cancelled(
            cancel,
            repository,
            self.diff_source
                .get_head_commit(&identity.owner, &identity.repo, &snapshot.branch),
        )
        .await?
        .map_err(|source| UpdateError::HeadLookup {
            repository: repository.to_string(),
            branch: snapshot.branch.clone(),
            source,
        })?;

        if head.sha == base_sha {
            info!(
                repository = %repository,
                commit = %short_sha(&head.sha),
                "Already up to date"
            );
            return Ok(CoordinatorResult::no_changes(
                repository,
                head.sha,
                head.message,
            ));
        }

        let comparison = unless_cancelled(
            cancel,
            repository,
            self.diff_source
                .compare_commits(&identity.owner, &identity.repo, &base_sha, &head.sha),
        )
        .await?
        .map_err(|source| {
            if source.is_not_found() {
                warn!(
                    repository = %repository,
                    last_indexed = %short_sha(&base_sha),
                    head = %short_sha(&head.sha),
                    "Indexed commit missing from remote history"
                );
                UpdateError::ForcePushDetected {
                    repository: repository.to_string(),
                    last_indexed_sha: base_sha.clone(),
                    head_sha: head.sha.clone(),
                }
            } else {
                UpdateError::Comparison {
                    repository: repository.to_string(),
                    source,
                }
            }
        })?;

        let changed_files = comparison.changed_file_count();
        if changed_files > self.config.change_threshold {
            warn!(
                repository = %repository,
                changed_files,
                threshold = self.config.change_threshold,
                "Too many changes for an incremental update"
            );
            return Err(UpdateError::ChangeThresholdExceeded {
                repository: repository.to_string(),
                changed_files,
                threshold: self.config.change_threshold,
            });
        }

        if comparison.truncated {
            warn!(
                repository = %repository,
                listed_files = changed_files,
                "Diff source returned an incomplete file list"
            );
            return Err(UpdateError::ComparisonTruncated {
                repository: repository.to_string(),
                listed_files: changed_files,
            });
        }

        debug!(
            repository = %repository,
            base = %short_sha(&base_sha),
            head = %short_sha(&head.sha),
            commits = comparison.total_commits,
            added = comparison.count_of(ChangeKind::Added),
            modified = comparison.count_of(ChangeKind::Modified),
            deleted = comparison.count_of(ChangeKind::Deleted),
            renamed = comparison.count_of(ChangeKind::Renamed),
            "Comparison fetched"
        );

        ensure_not_cancelled(cancel, repository)?;

        let local_path = PathBuf::from(&snapshot.local_path);
        self.working_copy
            .pull(&local_path, &snapshot.branch)
            .await
            .map_err(|source| UpdateError::GitPull {
                repository: repository.to_string(),
                source,
            })?;

        ensure_not_cancelled(cancel, repository)?;

        let options = PipelineOptions {
            repository: repository.to_string(),
            local_path,
            base_sha: base_sha.clone(),
            head_sha: head.sha.clone(),
        };
        let output = self
            .pipeline
            .process_changes(&comparison.files, &options)
            .await
            .map_err(|source| UpdateError::Pipeline {
                repository: repository.to_string(),
                source,
            })?;

        let updated = apply_update(
            snapshot,
            &head.sha,
            &output.stats,
            !output.errors.is_empty(),
        );
        self.metadata
            .update_repository(&updated)
            .await
            .map_err(|source| UpdateError::Metadata {
                repository: repository.to_string(),
                source,
            })?;

        let status = if output.errors.is_empty() {
            UpdateOutcome::Updated
        } else {
            UpdateOutcome::Failed
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        if output.errors.is_empty() {
            info!(
                repository = %repository,
                commit = %short_sha(&head.sha),
                files = output.stats.files_processed(),
                chunks_upserted = output.stats.chunks_upserted,
                chunks_deleted = output.stats.chunks_deleted,
                duration_ms,
                "Incremental update complete"
            );
        } else {
            warn!(
                repository = %repository,
                commit = %short_sha(&head.sha),
                files = output.stats.files_processed(),
                file_errors = output.errors.len(),
                duration_ms,
                "Incremental update completed with file errors"
            );
        }

        Ok(CoordinatorResult {
            repository: repository.to_string(),
            status,
            commit_sha: head.sha,
            commit_message: head.message,
            stats: output.stats,
            errors: output.errors,
            duration_ms,
        })
    }
}

/// Snapshot after a pipeline run: new commit, counters, derived counts.
fn apply_update(
    mut snapshot: RepositorySnapshot,
    head_sha: &str,
    stats: &UpdateStats,
    had_errors: bool,
) -> RepositorySnapshot {
    snapshot.last_indexed_commit_sha = Some(head_sha.to_string());
    snapshot.incremental_update_count += 1;
    snapshot.last_incremental_update_at = Some(Utc::now());
    snapshot.file_count =
        (snapshot.file_count + stats.files_added).saturating_sub(stats.files_deleted);
    snapshot.chunk_count =
        (snapshot.chunk_count + stats.chunks_upserted).saturating_sub(stats.chunks_deleted);
    snapshot.status = if had_errors {
        RepositoryStatus::Error
    } else {
        RepositoryStatus::Ready
    };
    snapshot
}

async fn unless_cancelled<F: Future>(
    cancel: &CancellationToken,
    repository: &str,
    fut: F,
) -> Result<F::Output, UpdateError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            debug!(repository = %repository, "Update cancelled while waiting on diff source");
            Err(UpdateError::Cancelled { repository: repository.to_string() })
        }
        output = fut => Ok(output),
    }
}

fn ensure_not_cancelled(cancel: &CancellationToken, repository: &str) -> Result<(), UpdateError> {
    if cancel.is_cancelled() {
        debug!(repository = %repository, "Update cancelled before next step");
        return Err(UpdateError::Cancelled {
            repository: repository.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> RepositorySnapshot {
        RepositorySnapshot::new(
            "my-api",
            "https://github.com/acme/my-api",
            "main",
            "/srv/my-api",
        )
        .with_indexed_commit("abc1234")
        .with_counts(10, 100)
    }

    #[test]
    fn test_config_default_threshold() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.change_threshold, 500);
        assert_eq!(config.with_change_threshold(50).change_threshold, 50);
    }

    #[test]
    fn test_config_from_settings() {
        let settings = UpdateSettings {
            change_threshold: 42,
            ..Default::default()
        };
        assert_eq!(CoordinatorConfig::from(&settings).change_threshold, 42);
    }

    #[test]
    fn test_apply_update_counts() {
        let stats = UpdateStats {
            files_added: 2,
            files_modified: 1,
            files_deleted: 1,
            chunks_upserted: 20,
            chunks_deleted: 5,
            duration_ms: 0,
        };
        let updated = apply_update(snapshot(), "def5678", &stats, false);
        assert_eq!(updated.last_indexed_commit_sha.as_deref(), Some("def5678"));
        assert_eq!(updated.file_count, 11);
        assert_eq!(updated.chunk_count, 115);
        assert_eq!(updated.incremental_update_count, 1);
        assert!(updated.last_incremental_update_at.is_some());
        assert_eq!(updated.status, RepositoryStatus::Ready);
    }

    #[test]
    fn test_apply_update_saturates_and_marks_error() {
        let stats = UpdateStats {
            files_deleted: 50,
            chunks_deleted: 500,
            ..Default::default()
        };
        let updated = apply_update(snapshot(), "def5678", &stats, true);
        assert_eq!(updated.file_count, 0);
        assert_eq!(updated.chunk_count, 0);
        assert_eq!(updated.status, RepositoryStatus::Error);
    }

    #[tokio::test]
    async fn test_unless_cancelled() {
        let cancel = CancellationToken::new();
        let value = unless_cancelled(&cancel, "r", async { 7 }).await.unwrap();
        assert_eq!(value, 7);

        cancel.cancel();
        let err = unless_cancelled(&cancel, "r", std::future::pending::<()>())
            .await
            .unwrap_err();
        assert!(matches!(err, UpdateError::Cancelled { .. }));
        assert!(ensure_not_cancelled(&cancel, "r").is_err());
    }
}
