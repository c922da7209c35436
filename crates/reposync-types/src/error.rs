//! Error types for configuration loading.

use thiserror::Error;

/// Errors raised while loading or validating settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A source could not be read or deserialized
    #[error("Configuration error: {0}")]
    Load(String),

    /// A value was read but is out of range
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::Load(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ConfigError::Load("missing file".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing file");

        let err = ConfigError::Invalid("update.timeout_secs must be > 0".to_string());
        assert!(err.to_string().starts_with("Invalid configuration"));
    }
}
