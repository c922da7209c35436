//! Job ledger for asynchronous update runs.
//!
//! The `JobLedger` is an in-memory registry of jobs keyed by job id. Every
//! asynchronous trigger allocates one job, the background task reports its
//! outcome back here, and finished jobs are evicted once they are older than
//! the configured max age.
//!
//! Job state machine: `pending -> running -> {completed | failed | timed_out}`.
//! Terminal states are final; transitions out of them are ignored.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use reposync_types::CoordinatorResult;

/// Status of an asynchronous job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    TimedOut,
}

impl JobStatus {
    /// Whether no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::TimedOut
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::TimedOut => write!(f, "timed_out"),
        }
    }
}

/// A tracked asynchronous update.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub repository: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub result: Option<CoordinatorResult>,
    pub error: Option<String>,
    /// Monotonic creation time used for ordering and eviction
    created: Instant,
}

impl Job {
    fn new(id: String, repository: String) -> Self {
        Self {
            id,
            repository,
            status: JobStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            result: None,
            error: None,
            created: Instant::now(),
        }
    }

    /// Time since the job was created.
    pub fn age(&self) -> Duration {
        self.created.elapsed()
    }

    fn finish(&mut self, status: JobStatus) {
        self.status = status;
        self.finished_at = Some(Utc::now());
    }
}

/// Read-only projection of a job for external reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResponse {
    pub job_id: String,
    pub repository: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<CoordinatorResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&Job> for JobResponse {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id.clone(),
            repository: job.repository.clone(),
            status: job.status,
            created_at: job.created_at,
            started_at: job.started_at,
            finished_at: job.finished_at,
            result: job.result.clone(),
            error: job.error.clone(),
        }
    }
}

/// Generate a job id: `update-<unix-seconds>-<5 hex chars>`.
///
/// The timestamp prefix keeps ids roughly sortable by creation time and
/// easy to correlate with log lines.
pub fn generate_job_id() -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..0x10_0000);
    format!("update-{}-{:05x}", Utc::now().timestamp(), suffix)
}

/// Registry of asynchronous update jobs.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use reposync_scheduler::{JobLedger, JobStatus};
///
/// let ledger = JobLedger::new(Duration::from_secs(3600));
/// let job_id = ledger.create_job("my-api");
/// assert_eq!(ledger.get_running_job("my-api").unwrap().id, job_id);
///
/// ledger.update_status(&job_id, JobStatus::Running);
/// ledger.fail(&job_id, "pull failed");
/// assert!(ledger.get_running_job("my-api").is_none());
///
/// let response = ledger.get_job_response(&job_id).unwrap();
/// assert_eq!(response.status, JobStatus::Failed);
/// ```
pub struct JobLedger {
    jobs: RwLock<HashMap<String, Job>>,
    max_age: Duration,
}

impl JobLedger {
    /// Create an empty ledger evicting finished jobs older than `max_age`.
    pub fn new(max_age: Duration) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            max_age,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Job>> {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Job>> {
        self.jobs.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocate a new pending job and return its id.
    ///
    /// Expired jobs are evicted first.
    pub fn create_job(&self, repository: &str) -> String {
        let mut jobs = self.write();
        Self::evict_locked(&mut jobs, self.max_age);

        let mut job_id = generate_job_id();
        while jobs.contains_key(&job_id) {
            job_id = generate_job_id();
        }

        jobs.insert(
            job_id.clone(),
            Job::new(job_id.clone(), repository.to_string()),
        );
        info!(job_id = %job_id, repository = %repository, "Job created");
        job_id
    }

    /// Most recent non-terminal job for a repository.
    pub fn get_running_job(&self, repository: &str) -> Option<Job> {
        self.read()
            .values()
            .filter(|job| job.repository == repository && !job.status.is_terminal())
            .max_by_key(|job| job.created)
            .cloned()
    }

    /// Move a job to a non-terminal or terminal status.
    ///
    /// Returns `false` when the job is unknown, already terminal, or the
    /// transition would go backwards.
    pub fn update_status(&self, job_id: &str, status: JobStatus) -> bool {
        let mut jobs = self.write();
        let Some(job) = jobs.get_mut(job_id) else {
            return false;
        };
        if job.status.is_terminal()
            || (job.status == JobStatus::Running && status == JobStatus::Pending)
        {
            debug!(job_id = %job_id, from = %job.status, to = %status, "Ignoring job transition");
            return false;
        }

        match status {
            JobStatus::Running => job.started_at = Some(Utc::now()),
            s if s.is_terminal() => job.finished_at = Some(Utc::now()),
            _ => {}
        }
        job.status = status;
        debug!(job_id = %job_id, status = %status, "Job status updated");
        true
    }

    /// Record a successful run.
    pub fn complete(&self, job_id: &str, result: CoordinatorResult) -> bool {
        self.finish(job_id, JobStatus::Completed, |job| {
            job.result = Some(result);
        })
    }

    /// Record a failed run.
    pub fn fail(&self, job_id: &str, message: impl Into<String>) -> bool {
        let message = message.into();
        self.finish(job_id, JobStatus::Failed, |job| {
            job.error = Some(message);
        })
    }

    /// Record that the run exceeded its wall-clock limit.
    pub fn timeout(&self, job_id: &str) -> bool {
        self.finish(job_id, JobStatus::TimedOut, |job| {
            job.error = Some("Update exceeded its time limit".to_string());
        })
    }

    fn finish(&self, job_id: &str, status: JobStatus, apply: impl FnOnce(&mut Job)) -> bool {
        let mut jobs = self.write();
        let Some(job) = jobs.get_mut(job_id) else {
            warn!(job_id = %job_id, status = %status, "Finishing unknown job");
            return false;
        };
        if job.status.is_terminal() {
            debug!(
                job_id = %job_id,
                current = %job.status,
                requested = %status,
                "Job already finished"
            );
            return false;
        }

        apply(job);
        job.finish(status);
        info!(
            job_id = %job_id,
            repository = %job.repository,
            status = %status,
            "Job finished"
        );
        true
    }

    /// Get a job by id.
    pub fn get_job(&self, job_id: &str) -> Option<Job> {
        self.read().get(job_id).cloned()
    }

    /// Projection of a job for reporting; `None` when unknown or evicted.
    pub fn get_job_response(&self, job_id: &str) -> Option<JobResponse> {
        self.read().get(job_id).map(JobResponse::from)
    }

    /// Remove finished jobs older than the max age.
    ///
    /// Returns the number of evicted jobs. Non-terminal jobs are kept.
    pub fn evict_expired(&self) -> usize {
        let mut jobs = self.write();
        Self::evict_locked(&mut jobs, self.max_age)
    }

    fn evict_locked(jobs: &mut HashMap<String, Job>, max_age: Duration) -> usize {
        let before = jobs.len();
        jobs.retain(|_, job| !job.status.is_terminal() || job.age() <= max_age);
        let evicted = before - jobs.len();
        if evicted > 0 {
            debug!(evicted = evicted, remaining = jobs.len(), "Evicted expired jobs");
        }
        evicted
    }

    /// Number of jobs currently held.
    pub fn job_count(&self) -> usize {
        self.read().len()
    }

    /// Max age of finished jobs.
    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Spawn the periodic eviction sweep.
    ///
    /// The task exits when `shutdown` is cancelled.
    pub fn spawn_eviction(
        self: &Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let ledger = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("Job eviction stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        ledger.evict_expired();
                    }
                }
            }
        })
    }
}

impl Default for JobLedger {
    fn default() -> Self {
        Self::new(Duration::from_secs(3600))
    }
}
