//! Update triggers.
//!
//! [`UpdateService`] composes the concurrency guard, the job ledger and the
//! coordinator into the three operations callers use: a blocking update, a
//! job-based update and a job status query.
//!
//! Admission (dedup lookup, guard check, job creation) happens under one
//! short lock that is never held across an await. Each coordinator run is a
//! spawned task owning the guard permit, so the repository stays "in
//! progress" until that run really ends, even after its caller gave up on a
//! timeout.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use reposync_coordinator::{UpdateCoordinator, UpdateError};
use reposync_scheduler::{
    ConcurrencyGuard, JobLedger, JobResponse, JobStatus, SchedulerConfig, TriggerDecision,
    UpdatePermit,
};
use reposync_types::{CoordinatorResult, UpdateSettings};

use crate::response::{AsyncTriggerResponse, ErrorResponse, UpdateResponse};

/// Configuration for the update service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Wall-clock limit of one coordinator run
    pub timeout: Duration,

    /// Guard and ledger settings
    pub scheduler: SchedulerConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::from(&UpdateSettings::default())
    }
}

impl From<&UpdateSettings> for ServiceConfig {
    fn from(settings: &UpdateSettings) -> Self {
        Self {
            timeout: settings.timeout(),
            scheduler: SchedulerConfig::from(settings),
        }
    }
}

impl ServiceConfig {
    /// Set the run timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the cooldown between runs of one repository.
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.scheduler.cooldown = cooldown;
        self
    }
}

/// How a supervised run ended.
enum RunOutcome {
    Finished(Result<CoordinatorResult, UpdateError>),
    TimedOut,
    Crashed(JoinError),
}

/// Trigger surface over the coordinator.
pub struct UpdateService {
    coordinator: Arc<UpdateCoordinator>,
    guard: Arc<ConcurrencyGuard>,
    ledger: Arc<JobLedger>,
    config: ServiceConfig,
    admission: Mutex<()>,
}

impl UpdateService {
    /// Create a service with fresh guard and ledger state.
    pub fn new(coordinator: Arc<UpdateCoordinator>, config: ServiceConfig) -> Self {
        let guard = Arc::new(ConcurrencyGuard::new(config.scheduler.cooldown));
        let ledger = Arc::new(JobLedger::new(config.scheduler.job_max_age));
        Self::with_state(coordinator, guard, ledger, config)
    }

    /// Create a service over existing guard and ledger state.
    pub fn with_state(
        coordinator: Arc<UpdateCoordinator>,
        guard: Arc<ConcurrencyGuard>,
        ledger: Arc<JobLedger>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            coordinator,
            guard,
            ledger,
            config,
            admission: Mutex::new(()),
        }
    }

    pub fn guard(&self) -> &Arc<ConcurrencyGuard> {
        &self.guard
    }

    pub fn ledger(&self) -> &Arc<JobLedger> {
        &self.ledger
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Start the periodic job eviction sweep.
    pub fn start_eviction(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        self.ledger
            .spawn_eviction(self.config.scheduler.eviction_interval, shutdown)
    }

    /// Run an update and wait for its result.
    pub async fn trigger_sync(&self, repository: &str) -> Result<UpdateResponse, ErrorResponse> {
        let permit = {
            let _admission = self.admission.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(job) = self.ledger.get_running_job(repository) {
                debug!(
                    repository = %repository,
                    job_id = %job.id,
                    "Sync trigger refused, job outstanding"
                );
                return Err(ErrorResponse::in_progress(repository, Some(&job.id)));
            }
            self.acquire(repository)?
        };

        info!(repository = %repository, "Starting synchronous update");
        match supervise(
            Arc::clone(&self.coordinator),
            repository.to_string(),
            permit,
            self.config.timeout,
        )
        .await
        {
            RunOutcome::Finished(Ok(result)) => Ok(UpdateResponse::from(result)),
            RunOutcome::Finished(Err(err)) => Err(ErrorResponse::from(&err)),
            RunOutcome::TimedOut => Err(ErrorResponse::timeout(repository, self.config.timeout)),
            RunOutcome::Crashed(err) => Err(ErrorResponse::internal(repository, err)),
        }
    }

    /// Start an update in the background and return its job id.
    ///
    /// While a job for `repository` is outstanding, the same job id is
    /// returned and no new run starts.
    pub fn trigger_async(&self, repository: &str) -> Result<AsyncTriggerResponse, ErrorResponse> {
        let (job_id, permit) = {
            let _admission = self.admission.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(job) = self.ledger.get_running_job(repository) {
                info!(repository = %repository, job_id = %job.id, "Returning outstanding job");
                return Ok(AsyncTriggerResponse {
                    job_id: job.id,
                    repository: repository.to_string(),
                    message: format!("An update of {repository} is already running"),
                });
            }
            let permit = self.acquire(repository)?;
            (self.ledger.create_job(repository), permit)
        };

        let coordinator = Arc::clone(&self.coordinator);
        let ledger = Arc::clone(&self.ledger);
        let timeout = self.config.timeout;
        let repo = repository.to_string();
        let id = job_id.clone();

        tokio::spawn(async move {
            ledger.update_status(&id, JobStatus::Running);

            match supervise(coordinator, repo.clone(), permit, timeout).await {
                RunOutcome::Finished(Ok(result)) => {
                    ledger.complete(&id, result);
                }
                RunOutcome::Finished(Err(err)) => {
                    ledger.fail(&id, err.to_string());
                }
                RunOutcome::TimedOut => {
                    ledger.timeout(&id);
                }
                RunOutcome::Crashed(err) => {
                    ledger.fail(&id, format!("Update task crashed: {err}"));
                }
            }
            debug!(job_id = %id, repository = %repo, "Background update finished");
        });

        Ok(AsyncTriggerResponse {
            job_id,
            repository: repository.to_string(),
            message: format!("Update of {repository} started"),
        })
    }

    /// Current projection of a job.
    pub fn job_status(&self, job_id: &str) -> Result<JobResponse, ErrorResponse> {
        self.ledger
            .get_job_response(job_id)
            .ok_or_else(|| ErrorResponse::job_not_found(job_id, self.ledger.max_age()))
    }

    fn acquire(&self, repository: &str) -> Result<UpdatePermit, ErrorResponse> {
        self.guard.try_acquire(repository).map_err(|decision| {
            let response = match decision {
                TriggerDecision::Cooldown { retry_after } => {
                    ErrorResponse::rate_limited(repository, retry_after)
                }
                TriggerDecision::InProgress | TriggerDecision::Allowed => {
                    ErrorResponse::in_progress(repository, None)
                }
            };
            info!(
                repository = %repository,
                reason = %response.error,
                retry_after_seconds = ?response.retry_after_seconds,
                "Update trigger denied"
            );
            response
        })
    }
}

/// Run the coordinator in its own task, bounded by `timeout`.
///
/// On timeout the run is cancelled and left to wind down on its own; it
/// keeps the permit until it does.
async fn supervise(
    coordinator: Arc<UpdateCoordinator>,
    repository: String,
    permit: UpdatePermit,
    timeout: Duration,
) -> RunOutcome {
    let cancel = CancellationToken::new();
    let run_cancel = cancel.clone();
    let run_repository = repository.clone();

    let handle = tokio::spawn(async move {
        let _permit = permit;
        coordinator
            .update_repository_with_cancel(&run_repository, &run_cancel)
            .await
    });

    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(result)) => {
            if let Err(err) = &result {
                warn!(repository = %repository, error = %err, code = err.code(), "Update failed");
            }
            RunOutcome::Finished(result)
        }
        Ok(Err(join_error)) => {
            error!(repository = %repository, error = %join_error, "Update task crashed");
            RunOutcome::Crashed(join_error)
        }
        Err(_) => {
            cancel.cancel();
            warn!(
                repository = %repository,
                timeout_secs = timeout.as_secs(),
                "Update timed out, cancelling"
            );
            RunOutcome::TimedOut
        }
    }
}
