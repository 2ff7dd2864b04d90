//! Error types for configuration and validation.

use thiserror::Error;

use crate::types::Environment;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised while loading or validating orchestrator settings.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid environment name: {0}")]
    InvalidEnvironment(String),

    #[error("invalid duration: {0}")]
    InvalidDuration(String),

    #[error("invalid traffic plan: {0}")]
    InvalidPlan(String),

    #[error("invalid {environment} environment: {reason}")]
    InvalidEnvironmentConfig {
        environment: Environment,
        reason: String,
    },

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),
}
