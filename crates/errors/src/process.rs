//! External process supervision errors

use std::borrow::Cow;

use crate::{BuildError, UserFacingError};
use thiserror::Error;

/// Errors raised while launching or supervising a child process
#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ProcessError {
    #[error("empty command")]
    EmptyCommand,

    #[error("command not found: {command}")]
    CommandNotFound { command: String },

    #[error("process execution failed: {command} - {message}")]
    ExecutionFailed { command: String, message: String },

    #[error("failed to read output of {command}: {message}")]
    OutputReadFailed { command: String, message: String },

    #[error("{command} timed out after {seconds} seconds")]
    Timeout { command: String, seconds: u64 },
}

impl UserFacingError for ProcessError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::CommandNotFound { .. } => Some("Install the program and make sure it is on PATH."),
            Self::Timeout { .. } => Some("Increase the command timeout in the configuration."),
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::EmptyCommand => "process.empty_command",
            Self::CommandNotFound { .. } => "process.command_not_found",
            Self::ExecutionFailed { .. } => "process.execution_failed",
            Self::OutputReadFailed { .. } => "process.output_read_failed",
            Self::Timeout { .. } => "process.timeout",
        };
        Some(code)
    }
}

impl From<ProcessError> for BuildError {
    fn from(err: ProcessError) -> Self {
        match err {
            ProcessError::CommandNotFound { command } => BuildError::ToolMissing {
                tool: command,
                hint: None,
            },
            ProcessError::Timeout { seconds, .. } => BuildError::Timeout { seconds },
            ProcessError::ExecutionFailed { command, message }
                if command.contains("tar") || command.contains("unzip") =>
            {
                BuildError::ExtractionFailed { message }
            }
            _ => BuildError::ConfigureFailed {
                message: err.to_string(),
            },
        }
    }
}
