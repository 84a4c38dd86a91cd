use serde::{Deserialize, Serialize};

/// General utility events for warnings, errors, and operations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GeneralEvent {
    /// Generic warning message with optional context
    Warning {
        message: String,
        context: Option<String>,
    },

    /// Informational notice meant for the user
    Notice { message: String },

    /// Diagnostic detail only shown in debug logs
    DebugLog { message: String },

    /// A CLI command started
    OperationStarted { operation: String },

    /// A CLI command finished
    OperationCompleted { operation: String, success: bool },

    /// A CLI command stopped with an error
    OperationFailed { operation: String, error: String },

    /// Configuration resolved from file, environment and flags
    ConfigurationLoaded {
        /// Config file path, or `built-in defaults`
        source: String,
        warnings: Vec<String>,
    },
}

impl GeneralEvent {
    /// Create a warning event
    pub fn warning(message: impl Into<String>) -> Self {
        Self::Warning {
            message: message.into(),
            context: None,
        }
    }

    /// Create a warning event with context
    pub fn warning_with_context(message: impl Into<String>, context: impl Into<String>) -> Self {
        Self::Warning {
            message: message.into(),
            context: Some(context.into()),
        }
    }

    /// Create a notice event
    pub fn notice(message: impl Into<String>) -> Self {
        Self::Notice {
            message: message.into(),
        }
    }

    /// Create a debug log event
    pub fn debug(message: impl Into<String>) -> Self {
        Self::DebugLog {
            message: message.into(),
        }
    }
}
