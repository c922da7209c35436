//! Payloads returned by the update triggers.
//!
//! Every refusal or failure is an [`ErrorResponse`] with a machine-readable
//! code and a remediation hint.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use reposync_coordinator::UpdateError;
use reposync_types::{short_sha, CoordinatorResult, FileError, UpdateOutcome, UpdateStats};

/// Result of a completed synchronous update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateResponse {
    pub status: UpdateOutcome,
    pub repository: String,

    /// First 7 characters of the head commit
    pub commit_sha: String,
    pub commit_message: String,

    pub stats: UpdateStats,
    pub errors: Vec<FileError>,
    pub duration_ms: u64,
}

impl From<CoordinatorResult> for UpdateResponse {
    fn from(result: CoordinatorResult) -> Self {
        Self {
            status: result.status,
            repository: result.repository,
            commit_sha: short_sha(&result.commit_sha).to_string(),
            commit_message: result.commit_message,
            stats: result.stats,
            errors: result.errors,
            duration_ms: result.duration_ms,
        }
    }
}

/// Acknowledgement of an asynchronous trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsyncTriggerResponse {
    pub job_id: String,
    pub repository: String,
    pub message: String,
}

/// Machine-readable error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    RepositoryNotFound,
    RateLimited,
    UpdateInProgress,
    UpdateFailed,
    Timeout,
    InternalError,
    JobNotFound,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code = match self {
            ErrorCode::RepositoryNotFound => "repository_not_found",
            ErrorCode::RateLimited => "rate_limited",
            ErrorCode::UpdateInProgress => "update_in_progress",
            ErrorCode::UpdateFailed => "update_failed",
            ErrorCode::Timeout => "timeout",
            ErrorCode::InternalError => "internal_error",
            ErrorCode::JobNotFound => "job_not_found",
        };
        write!(f, "{code}")
    }
}

/// Error payload of a trigger or job query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{error}: {message}")]
pub struct ErrorResponse {
    pub error: ErrorCode,
    pub message: String,

    /// What the caller should do next
    pub hint: String,

    pub retryable: bool,

    #[serde(default)]
    pub requires_full_reindex: bool,

    /// Seconds to wait before retrying, for `rate_limited`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
}

impl ErrorResponse {
    fn new(
        error: ErrorCode,
        message: impl Into<String>,
        hint: impl Into<String>,
        retryable: bool,
    ) -> Self {
        Self {
            error,
            message: message.into(),
            hint: hint.into(),
            retryable,
            requires_full_reindex: false,
            retry_after_seconds: None,
        }
    }

    /// Trigger denied by the cooldown.
    pub fn rate_limited(repository: &str, retry_after: Duration) -> Self {
        let seconds = retry_after_seconds(retry_after);
        let mut response = Self::new(
            ErrorCode::RateLimited,
            format!("{repository} was updated recently"),
            format!("Wait {seconds} seconds before triggering another update"),
            true,
        );
        response.retry_after_seconds = Some(seconds);
        response
    }

    /// Trigger denied because an update is already running.
    pub fn in_progress(repository: &str, job_id: Option<&str>) -> Self {
        let hint = match job_id {
            Some(id) => format!("Poll job {id} for the result of the running update"),
            None => "Retry once the running update has finished".to_string(),
        };
        Self::new(
            ErrorCode::UpdateInProgress,
            format!("An update of {repository} is already in progress"),
            hint,
            true,
        )
    }

    /// Run exceeded its wall-clock limit.
    pub fn timeout(repository: &str, limit: Duration) -> Self {
        Self::new(
            ErrorCode::Timeout,
            format!(
                "Update of {repository} did not finish within {} seconds",
                limit.as_secs()
            ),
            "The update may still complete in the background; check the repository status before retrying",
            true,
        )
    }

    /// Unexpected failure, such as a crashed run.
    pub fn internal(repository: &str, detail: impl std::fmt::Display) -> Self {
        Self::new(
            ErrorCode::InternalError,
            format!("Update of {repository} failed unexpectedly: {detail}"),
            "Check the service logs",
            false,
        )
    }

    /// Unknown or evicted job id.
    pub fn job_not_found(job_id: &str, max_age: Duration) -> Self {
        Self::new(
            ErrorCode::JobNotFound,
            format!("Job {job_id} not found"),
            format!(
                "Finished jobs are evicted after {} seconds; trigger a new update if needed",
                max_age.as_secs()
            ),
            false,
        )
    }
}

impl From<&UpdateError> for ErrorResponse {
    fn from(err: &UpdateError) -> Self {
        let repository = err.repository();

        if let UpdateError::RepositoryNotFound { .. } = err {
            return Self::new(
                ErrorCode::RepositoryNotFound,
                err.to_string(),
                format!("Check the name, or index {repository} before updating it"),
                false,
            );
        }

        let hint = if err.requires_full_reindex() {
            format!("Trigger a full re-index of {repository}")
        } else if err.is_retryable() {
            "Transient failure; retry the update".to_string()
        } else {
            format!("Check the configuration of {repository}")
        };

        let mut response = Self::new(
            ErrorCode::UpdateFailed,
            err.to_string(),
            hint,
            err.is_retryable(),
        );
        response.requires_full_reindex = err.requires_full_reindex();
        response
    }
}

/// Whole seconds, rounded up so callers never retry too early.
fn retry_after_seconds(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reposync_coordinator::CollaboratorError;

    #[test]
    fn test_update_response_truncates_sha() {
        let result = CoordinatorResult::no_changes("my-api", "abc1234def5678", "Initial commit");
        let response = UpdateResponse::from(result);
        assert_eq!(response.commit_sha, "abc1234");
        assert_eq!(response.status, UpdateOutcome::NoChanges);
    }

    #[test]
    fn test_rate_limited_rounds_up() {
        let response = ErrorResponse::rate_limited("my-api", Duration::from_millis(4_200));
        assert_eq!(response.error, ErrorCode::RateLimited);
        assert_eq!(response.retry_after_seconds, Some(5));
        assert!(response.retryable);
        assert!(response.hint.contains("5 seconds"));

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["error"], "rate_limited");
        assert_eq!(json["retry_after_seconds"], 5);
    }

    #[test]
    fn test_retry_after_never_zero() {
        assert_eq!(retry_after_seconds(Duration::ZERO), 1);
        assert_eq!(retry_after_seconds(Duration::from_secs(300)), 300);
    }

    #[test]
    fn test_in_progress_omits_retry_after() {
        let response = ErrorResponse::in_progress("my-api", Some("update-1-abcde"));
        assert!(response.hint.contains("update-1-abcde"));

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["error"], "update_in_progress");
        assert!(json.get("retry_after_seconds").is_none());
    }

    #[test]
    fn test_repository_not_found_mapping() {
        let err = UpdateError::RepositoryNotFound {
            repository: "ghost".to_string(),
        };
        let response = ErrorResponse::from(&err);
        assert_eq!(response.error, ErrorCode::RepositoryNotFound);
        assert!(!response.retryable);
    }

    #[test]
    fn test_force_push_requires_full_reindex() {
        let err = UpdateError::ForcePushDetected {
            repository: "my-api".to_string(),
            last_indexed_sha: "abc1234".to_string(),
            head_sha: "def5678".to_string(),
        };
        let response = ErrorResponse::from(&err);
        assert_eq!(response.error, ErrorCode::UpdateFailed);
        assert!(response.requires_full_reindex);
        assert!(!response.retryable);
        assert!(response.hint.contains("full re-index"));
    }

    #[test]
    fn test_git_pull_failure_is_retryable() {
        let err = UpdateError::GitPull {
            repository: "my-api".to_string(),
            source: CollaboratorError::Command("network unreachable".to_string()),
        };
        let response = ErrorResponse::from(&err);
        assert!(response.retryable);
        assert!(!response.requires_full_reindex);
    }

    #[test]
    fn test_error_code_display_matches_serde() {
        for code in [
            ErrorCode::RepositoryNotFound,
            ErrorCode::RateLimited,
            ErrorCode::UpdateInProgress,
            ErrorCode::UpdateFailed,
            ErrorCode::Timeout,
            ErrorCode::InternalError,
            ErrorCode::JobNotFound,
        ] {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{code}\""));
        }
    }
}
