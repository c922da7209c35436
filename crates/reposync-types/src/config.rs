//! Configuration loading for reposync.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! The default config file lives at `~/.config/reposync/config.toml`
//! (platform equivalent via `directories`).

use std::path::PathBuf;
use std::time::Duration;

use config::{Config, Environment, File};
use directories::ProjectDirs;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Limits and timings for incremental updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateSettings {
    /// Changed-file count above which a full re-index is required.
    #[serde(default = "default_change_threshold")]
    pub change_threshold: usize,

    /// Minimum time between two updates of the same repository (seconds).
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    /// Wall-clock limit for one update run (seconds).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Age after which finished jobs are evicted (seconds).
    #[serde(default = "default_job_max_age_secs")]
    pub job_max_age_secs: u64,

    /// How often the eviction sweep runs (seconds).
    #[serde(default = "default_eviction_interval_secs")]
    pub eviction_interval_secs: u64,
}

fn default_change_threshold() -> usize {
    500
}

fn default_cooldown_secs() -> u64 {
    300
}

fn default_timeout_secs() -> u64 {
    600
}

fn default_job_max_age_secs() -> u64 {
    3600
}

fn default_eviction_interval_secs() -> u64 {
    60
}

impl Default for UpdateSettings {
    fn default() -> Self {
        Self {
            change_threshold: default_change_threshold(),
            cooldown_secs: default_cooldown_secs(),
            timeout_secs: default_timeout_secs(),
            job_max_age_secs: default_job_max_age_secs(),
            eviction_interval_secs: default_eviction_interval_secs(),
        }
    }
}

impl UpdateSettings {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn job_max_age(&self) -> Duration {
        Duration::from_secs(self.job_max_age_secs)
    }

    pub fn eviction_interval(&self) -> Duration {
        Duration::from_secs(self.eviction_interval_secs)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.change_threshold == 0 {
            return Err(ConfigError::Invalid(
                "update.change_threshold must be > 0".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "update.timeout_secs must be > 0".to_string(),
            ));
        }
        if self.eviction_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "update.eviction_interval_secs must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// GitHub API access for the diff source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubSettings {
    /// API base URL (GitHub Enterprise installs use `https://host/api/v3`)
    #[serde(default = "default_github_api_url")]
    pub api_url: String,

    /// Token (loaded from config or env var, never serialized)
    #[serde(default, skip_serializing)]
    pub token: Option<SecretString>,

    /// Per-request timeout (seconds)
    #[serde(default = "default_github_timeout_secs")]
    pub timeout_secs: u64,

    /// Attempts per request before a transient failure is reported
    #[serde(default = "default_github_max_retries")]
    pub max_retries: u32,
}

fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_github_timeout_secs() -> u64 {
    30
}

fn default_github_max_retries() -> u32 {
    3
}

impl Default for GitHubSettings {
    fn default() -> Self {
        Self {
            api_url: default_github_api_url(),
            token: None,
            timeout_secs: default_github_timeout_secs(),
            max_retries: default_github_max_retries(),
        }
    }
}

/// External program that applies changed files to the index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Program to run; updates are refused when unset
    #[serde(default)]
    pub program: Option<String>,

    #[serde(default)]
    pub args: Vec<String>,
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Path of the JSON repository metadata file
    #[serde(default = "default_metadata_path")]
    pub metadata_path: String,

    #[serde(default)]
    pub github: GitHubSettings,

    #[serde(default)]
    pub pipeline: PipelineSettings,

    #[serde(default)]
    pub update: UpdateSettings,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metadata_path() -> String {
    ProjectDirs::from("", "", "reposync")
        .map(|p| p.data_local_dir().join("repositories.json"))
        .unwrap_or_else(|| PathBuf::from("./repositories.json"))
        .to_string_lossy()
        .to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            metadata_path: default_metadata_path(),
            github: GitHubSettings::default(),
            pipeline: PipelineSettings::default(),
            update: UpdateSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/reposync/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (REPOSYNC_*, nested keys joined by `__`)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, ConfigError> {
        let config_dir = ProjectDirs::from("", "", "reposync")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");
        let update = UpdateSettings::default();

        let mut builder = Config::builder()
            .set_default("log_level", default_log_level())?
            .set_default("metadata_path", default_metadata_path())?
            .set_default("github.api_url", default_github_api_url())?
            .set_default("github.timeout_secs", default_github_timeout_secs() as i64)?
            .set_default("github.max_retries", default_github_max_retries() as i64)?
            .set_default("update.change_threshold", update.change_threshold as i64)?
            .set_default("update.cooldown_secs", update.cooldown_secs as i64)?
            .set_default("update.timeout_secs", update.timeout_secs as i64)?
            .set_default("update.job_max_age_secs", update.job_max_age_secs as i64)?
            .set_default(
                "update.eviction_interval_secs",
                update.eviction_interval_secs as i64,
            )?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // REPOSYNC_LOG_LEVEL, REPOSYNC_UPDATE__COOLDOWN_SECS, REPOSYNC_GITHUB__TOKEN, ...
        builder = builder.add_source(
            Environment::with_prefix("REPOSYNC")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.update.validate()?;
        Ok(settings)
    }

    /// Metadata path with a leading `~/` expanded.
    pub fn expanded_metadata_path(&self) -> PathBuf {
        if let Some(rest) = self.metadata_path.strip_prefix("~/") {
            if let Some(dirs) = directories::BaseDirs::new() {
                return dirs.home_dir().join(rest);
            }
        }
        PathBuf::from(&self.metadata_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.log_level, "info");
        assert_eq!(settings.github.api_url, "https://api.github.com");
        assert!(settings.github.token.is_none());
        assert!(settings.pipeline.program.is_none());
    }

    #[test]
    fn test_default_update_settings() {
        let update = UpdateSettings::default();
        assert_eq!(update.change_threshold, 500);
        assert_eq!(update.cooldown(), Duration::from_secs(300));
        assert_eq!(update.timeout(), Duration::from_secs(600));
        assert_eq!(update.job_max_age(), Duration::from_secs(3600));
    }

    #[test]
    fn test_update_settings_validation() {
        let mut update = UpdateSettings::default();
        assert!(update.validate().is_ok());

        update.timeout_secs = 0;
        assert!(matches!(update.validate(), Err(ConfigError::Invalid(_))));

        update.timeout_secs = 10;
        update.change_threshold = 0;
        assert!(update.validate().is_err());
    }

    #[test]
    fn test_zero_cooldown_is_allowed() {
        let update = UpdateSettings {
            cooldown_secs: 0,
            ..Default::default()
        };
        assert!(update.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reposync.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
log_level = "debug"
metadata_path = "/srv/reposync/repos.json"

[pipeline]
program = "indexer"
args = ["apply", "--stdin"]

[update]
change_threshold = 250
cooldown_secs = 60
"#
        )
        .unwrap();

        let settings = Settings::load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(settings.log_level, "debug");
        assert_eq!(settings.metadata_path, "/srv/reposync/repos.json");
        assert_eq!(settings.pipeline.program.as_deref(), Some("indexer"));
        assert_eq!(settings.pipeline.args, vec!["apply", "--stdin"]);
        assert_eq!(settings.update.change_threshold, 250);
        assert_eq!(settings.update.cooldown_secs, 60);
        assert_eq!(settings.update.timeout_secs, 600);
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[update]\ntimeout_secs = 0\n").unwrap();

        let result = Settings::load(Some(path.to_str().unwrap()));
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_token_is_not_serialized() {
        let mut settings = Settings::default();
        settings.github.token = Some(SecretString::from("ghp_secret".to_string()));
        let json = serde_json::to_string(&settings).unwrap();
        assert!(!json.contains("ghp_secret"));
    }

    #[test]
    fn test_expanded_metadata_path_absolute() {
        let settings = Settings {
            metadata_path: "/data/repos.json".to_string(),
            ..Default::default()
        };
        assert_eq!(settings.expanded_metadata_path(), PathBuf::from("/data/repos.json"));
    }
}
