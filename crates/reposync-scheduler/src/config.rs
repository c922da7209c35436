//! Scheduler configuration.
//!
//! Cooldown and job retention for the concurrency guard and the job ledger,
//! derived from the `[update]` settings section.

use std::time::Duration;

use reposync_types::UpdateSettings;

/// Runtime configuration for the guard and the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Minimum time between two updates of one repository
    pub cooldown: Duration,

    /// Finished jobs older than this are evicted
    pub job_max_age: Duration,

    /// Interval of the background eviction sweep, at least one second
    pub eviction_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from(&UpdateSettings::default())
    }
}

impl From<&UpdateSettings> for SchedulerConfig {
    fn from(settings: &UpdateSettings) -> Self {
        Self {
            cooldown: settings.cooldown(),
            job_max_age: settings.job_max_age(),
            eviction_interval: settings.eviction_interval().max(Duration::from_secs(1)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_update_settings() {
        let config = SchedulerConfig::default();
        assert_eq!(config.cooldown, Duration::from_secs(300));
        assert_eq!(config.job_max_age, Duration::from_secs(3600));
        assert_eq!(config.eviction_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_from_update_settings() {
        let settings = UpdateSettings {
            cooldown_secs: 30,
            job_max_age_secs: 120,
            ..Default::default()
        };
        let config = SchedulerConfig::from(&settings);
        assert_eq!(config.cooldown, Duration::from_secs(30));
        assert_eq!(config.job_max_age, Duration::from_secs(120));
        assert_eq!(config.eviction_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_zero_eviction_interval_is_clamped() {
        let settings = UpdateSettings {
            eviction_interval_secs: 0,
            ..Default::default()
        };
        assert_eq!(
            SchedulerConfig::from(&settings).eviction_interval,
            Duration::from_secs(1)
        );
    }
}
