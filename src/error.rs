//! Error types for dynfw.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DynfwError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("Invalid table name: {0}")]
    InvalidSetName(String),

    #[error("Already running: {0}")]
    AlreadyRunning(String),
}

/// Failure of a single filter-engine command.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("`{command}` exited with {code:?}: {stderr}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("`{command}` could not be started: {reason}")]
    Spawn { command: String, reason: String },

    #[error("`{command}` timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },
}
