/// Error kinds for command execution and inventory operations.
use std::time::Duration;
use thiserror::Error;

/// Failure of a single external utility invocation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RunError {
    #[error("executable `{0}` not found on PATH")]
    ExecutableNotFound(String),

    #[error("failed to launch `{program}`: {reason}")]
    ProcessLaunchFailed { program: String, reason: String },

    #[error("`{program}` exited with code {code:?}: {stderr}")]
    NonZeroExit {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("elevation was denied for `{0}`")]
    ElevationDenied(String),

    #[error("`{program}` did not finish within {timeout:?}")]
    TimedOut { program: String, timeout: Duration },

    #[error("`{0}` was cancelled")]
    Cancelled(String),
}

/// Top-level error surfaced to the caller of the inventory.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InventoryError {
    #[error("utility unavailable: {0}")]
    UtilityUnavailable(String),

    #[error("utility failed: {0}")]
    UtilityExecutionFailed(String),

    #[error("could not parse {what}: {reason}")]
    ParseFailed { what: String, reason: String },

    #[error("elevation denied: {0}")]
    ElevationDenied(String),

    #[error("mount failed: {0}")]
    MountFailed(String),

    #[error("platform `{0}` is not supported")]
    UnsupportedPlatform(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl InventoryError {
    pub fn parse(what: impl Into<String>, reason: impl ToString) -> Self {
        Self::ParseFailed {
            what: what.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<RunError> for InventoryError {
    fn from(err: RunError) -> Self {
        match err {
            RunError::ExecutableNotFound(_) => Self::UtilityUnavailable(err.to_string()),
            RunError::ElevationDenied(_) => Self::ElevationDenied(err.to_string()),
            RunError::ProcessLaunchFailed { .. }
            | RunError::NonZeroExit { .. }
            | RunError::TimedOut { .. }
            | RunError::Cancelled(_) => Self::UtilityExecutionFailed(err.to_string()),
        }
    }
}

pub type Result<T, E = InventoryError> = std::result::Result<T, E>;
