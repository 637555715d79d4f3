//! Error types for power control operations

use std::time::Duration;
use thiserror::Error;

use crate::types::{DesiredState, PowerState};

/// Error type for power control operations
#[derive(Debug, Error)]
pub enum PowerError {
    /// Malformed or incomplete device profile
    #[error("invalid configuration: {0}")]
    Config(String),

    /// An external command could not be run to completion
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// The verified state still differs from the requested one after all retries
    #[error("power state failure: requested {requested}, observed {observed} after {attempts} attempt(s)")]
    PowerStateFailure {
        requested: DesiredState,
        observed: PowerState,
        attempts: u32,
    },
}

impl PowerError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        PowerError::Config(msg.into())
    }
}

/// Failure to run an external backend command
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The process could not be started (binary missing, permission denied)
    #[error("failed to launch {program}: {source}")]
    LaunchFailure {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The process did not exit within its timeout and was killed
    #[error("{program} timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    /// The backend tool exited non-zero
    #[error("{program} rejected the command (exit code {exit_code}): {stderr}")]
    BackendRejected {
        program: String,
        exit_code: i32,
        stderr: String,
    },
}

/// Discriminant of [`ExecutionError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionErrorKind {
    LaunchFailure,
    Timeout,
    BackendRejected,
}

impl ExecutionError {
    pub fn kind(&self) -> ExecutionErrorKind {
        match self {
            ExecutionError::LaunchFailure { .. } => ExecutionErrorKind::LaunchFailure,
            ExecutionError::Timeout { .. } => ExecutionErrorKind::Timeout,
            ExecutionError::BackendRejected { .. } => ExecutionErrorKind::BackendRejected,
        }
    }

    /// Exit code reported by the backend, if it got that far
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ExecutionError::BackendRejected { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }
}

/// Result type for power control operations
pub type Result<T> = std::result::Result<T, PowerError>;
