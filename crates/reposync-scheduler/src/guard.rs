//! Per-repository concurrency guard.
//!
//! Tracks, for every repository name, whether an update is running and
//! when the last one completed. A new trigger is allowed only when no
//! update is in progress and the cooldown since the last completion has
//! elapsed.
//!
//! State for a repository is created on first use and kept for the
//! lifetime of the process.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

/// Why a trigger was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    /// An update for the repository is running
    InProgress,
    /// The previous update finished less than a cooldown ago
    Cooldown,
}

/// Answer of [`ConcurrencyGuard::can_trigger`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerDecision {
    Allowed,
    /// No retry hint: callers should poll the running job instead.
    InProgress,
    Cooldown {
        retry_after: Duration,
    },
}

impl TriggerDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, TriggerDecision::Allowed)
    }

    pub fn reason(&self) -> Option<DenialReason> {
        match self {
            TriggerDecision::Allowed => None,
            TriggerDecision::InProgress => Some(DenialReason::InProgress),
            TriggerDecision::Cooldown { .. } => Some(DenialReason::Cooldown),
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            TriggerDecision::Cooldown { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}

/// Guard state for one repository.
#[derive(Debug, Clone)]
struct GuardState {
    in_progress: bool,
    last_completed_at: Option<Instant>,
    cooldown: Duration,
}

impl GuardState {
    fn new(cooldown: Duration) -> Self {
        Self {
            in_progress: false,
            last_completed_at: None,
            cooldown,
        }
    }

    fn decide(&self, now: Instant) -> TriggerDecision {
        if self.in_progress {
            return TriggerDecision::InProgress;
        }
        if let Some(completed) = self.last_completed_at {
            let elapsed = now.saturating_duration_since(completed);
            if elapsed < self.cooldown {
                return TriggerDecision::Cooldown {
                    retry_after: self.cooldown - elapsed,
                };
            }
        }
        TriggerDecision::Allowed
    }
}

/// Guard ensuring at most one update per repository at a time.
///
/// All state lives behind a single mutex that is never held across an
/// await point. Use [`ConcurrencyGuard::try_acquire`] to check and mark in
/// one step; the returned [`UpdatePermit`] marks the repository complete
/// when dropped, including on panic.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use reposync_scheduler::{ConcurrencyGuard, DenialReason};
///
/// let guard = Arc::new(ConcurrencyGuard::new(Duration::from_secs(300)));
///
/// let permit = guard.try_acquire("my-api").unwrap();
/// assert_eq!(
///     guard.can_trigger("my-api").reason(),
///     Some(DenialReason::InProgress)
/// );
///
/// drop(permit);
/// assert_eq!(guard.can_trigger("my-api").reason(), Some(DenialReason::Cooldown));
/// ```
pub struct ConcurrencyGuard {
    states: Mutex<HashMap<String, GuardState>>,
    default_cooldown: Duration,
}

impl ConcurrencyGuard {
    /// Create a guard applying `cooldown` to every repository.
    pub fn new(cooldown: Duration) -> Self {
        Self {
            states: Mutex::new(HashMap::new()),
            default_cooldown: cooldown,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, GuardState>> {
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a new update for `repository` may start now.
    pub fn can_trigger(&self, repository: &str) -> TriggerDecision {
        let states = self.lock();
        states
            .get(repository)
            .map(|state| state.decide(Instant::now()))
            .unwrap_or(TriggerDecision::Allowed)
    }

    /// Mark an update as running.
    ///
    /// Must only follow a `can_trigger` that returned `Allowed`, and must be
    /// paired with exactly one [`mark_complete`](Self::mark_complete).
    pub fn mark_in_progress(&self, repository: &str) {
        let mut states = self.lock();
        let state = states
            .entry(repository.to_string())
            .or_insert_with(|| GuardState::new(self.default_cooldown));
        state.in_progress = true;
        debug!(repository = %repository, "Marked update in progress");
    }

    /// Mark the running update as finished and start the cooldown.
    pub fn mark_complete(&self, repository: &str) {
        let mut states = self.lock();
        let state = states
            .entry(repository.to_string())
            .or_insert_with(|| GuardState::new(self.default_cooldown));
        state.in_progress = false;
        state.last_completed_at = Some(Instant::now());
        debug!(repository = %repository, "Marked update complete");
    }

    /// Check and mark in progress atomically.
    ///
    /// Returns the denial decision when the trigger is not allowed.
    pub fn try_acquire(
        self: &Arc<Self>,
        repository: &str,
    ) -> Result<UpdatePermit, TriggerDecision> {
        let mut states = self.lock();
        let state = states
            .entry(repository.to_string())
            .or_insert_with(|| GuardState::new(self.default_cooldown));

        match state.decide(Instant::now()) {
            TriggerDecision::Allowed => {
                state.in_progress = true;
                debug!(repository = %repository, "Acquired update permit");
                Ok(UpdatePermit {
                    guard: Arc::clone(self),
                    repository: repository.to_string(),
                })
            }
            denied => Err(denied),
        }
    }

    /// Whether an update for `repository` is currently marked running.
    pub fn is_in_progress(&self, repository: &str) -> bool {
        self.lock()
            .get(repository)
            .map(|s| s.in_progress)
            .unwrap_or(false)
    }

    /// Override the cooldown for one repository.
    pub fn set_cooldown(&self, repository: &str, cooldown: Duration) {
        let mut states = self.lock();
        states
            .entry(repository.to_string())
            .or_insert_with(|| GuardState::new(self.default_cooldown))
            .cooldown = cooldown;
    }

    /// Cooldown applied to repositories without an override.
    pub fn default_cooldown(&self) -> Duration {
        self.default_cooldown
    }

    /// Number of repositories with guard state.
    pub fn tracked_repositories(&self) -> usize {
        self.lock().len()
    }
}

/// RAII permit for one running update.
///
/// Dropping the permit marks the repository complete, so the guard is
/// released on every exit path of the task holding it.
#[derive(Debug)]
pub struct UpdatePermit {
    guard: Arc<ConcurrencyGuard>,
    repository: String,
}

impl UpdatePermit {
    pub fn repository(&self) -> &str {
        &self.repository
    }
}

impl Drop for UpdatePermit {
    fn drop(&mut self) {
        self.guard.mark_complete(&self.repository);
    }
}

impl std::fmt::Debug for ConcurrencyGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConcurrencyGuard")
            .field("default_cooldown", &self.default_cooldown)
            .field("tracked_repositories", &self.tracked_repositories())
            .finish()
    }
}
