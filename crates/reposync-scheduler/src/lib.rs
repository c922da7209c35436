//! Concurrency control for incremental repository updates.
//!
//! This crate holds the two pieces of process-wide state behind the
//! update triggers:
//!
//! - [`ConcurrencyGuard`]: per-repository "in progress" flag and
//!   post-completion cooldown. At most one update runs per repository.
//! - [`JobLedger`]: registry of asynchronous update jobs with status
//!   tracking, deduplication lookups and age-based eviction.
//!
//! Both are plain owned structures, constructed once at startup and shared
//! through `Arc`.
//!
//! # Example
//!
//! ```ignore
//! use reposync_scheduler::{ConcurrencyGuard, JobLedger, SchedulerConfig};
//!
//! let config = SchedulerConfig::default();
//! let guard = Arc::new(ConcurrencyGuard::new(config.cooldown));
//! let ledger = Arc::new(JobLedger::new(config.job_max_age));
//! ledger.spawn_eviction(config.eviction_interval, shutdown.clone());
//!
//! let permit = guard.try_acquire("my-api")?;
//! let job_id = ledger.create_job("my-api");
//! ```

mod config;
mod guard;
mod ledger;

pub use config::SchedulerConfig;
pub use guard::{ConcurrencyGuard, DenialReason, TriggerDecision, UpdatePermit};
pub use ledger::{generate_job_id, Job, JobLedger, JobResponse, JobStatus};
