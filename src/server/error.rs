//! Process launch failures.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpawnError {
    #[error("Executable '{program}' not found: {reason}")]
    ExecutableNotFound { program: String, reason: String },

    #[error("Failed to {action}: {source}")]
    Io {
        action: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Initialize handshake failed: {0}")]
    Handshake(String),

    #[error("Server not ready after {}ms", .0.as_millis())]
    ReadyTimeout(Duration),

    #[error("Server exited during startup ({})", describe_code(.code))]
    ExitedEarly { code: Option<i32> },
}

impl SpawnError {
    pub fn io(action: impl Into<String>, source: std::io::Error) -> Self {
        SpawnError::Io {
            action: action.into(),
            source,
        }
    }
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "killed by signal".to_string(),
    }
}
