//! Error types for the supervisor.

use std::time::Duration;
use thiserror::Error;

use crate::server::SpawnError;
use crate::workspace::ResolveError;

/// Why the server cannot be configured. Fatal to startup, never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("No Config Paths defined. Define some and reload")]
    NoPatternsConfigured,

    #[error("No Config file found in: {}", .patterns.join(","))]
    NoConfigFile { patterns: Vec<String> },

    #[error("Psalm must be run in a workspace. Select a workspace and reload")]
    NoWorkspaceRoot,

    #[error("Invalid config path pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

impl From<ResolveError> for ConfigurationError {
    fn from(e: ResolveError) -> Self {
        match e {
            ResolveError::NoPatternsConfigured => ConfigurationError::NoPatternsConfigured,
            ResolveError::InvalidPattern { pattern, reason } => {
                ConfigurationError::InvalidPattern { pattern, reason }
            }
        }
    }
}

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("Failed to start Psalm language server: {0}")]
    Spawn(#[from] SpawnError),

    #[error("Language server did not stop within {}ms", .0.as_millis())]
    ShutdownTimeout(Duration),

    #[error("Supervisor is no longer running")]
    Closed,
}
