use serde::Serialize;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Serialize)]
pub struct AppError {
    pub error: String,
    pub code: String,
    pub trace_id: String,
}

impl AppError {
    pub fn new(code: impl Into<String>, message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code: code.into(),
            trace_id: trace_id.into(),
        }
    }

    pub fn validation(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new("ERR_VALIDATION", message, trace_id)
    }

    pub fn dependency(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new("ERR_DEPENDENCY", message, trace_id)
    }

    pub fn system(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new("ERR_SYSTEM", message, trace_id)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.error, self.code)
    }
}

impl std::error::Error for AppError {}

/// Failure to obtain a result from a bridge subprocess.
///
/// A process that ran and exited nonzero is not a `CommandError`; callers get its
/// [`CommandOutput`](crate::app::adb::runner::CommandOutput) and decide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// The executable could not be started (missing, not executable, permission denied).
    Launch { program: String, message: String },
    /// The process did not finish within the bound and was killed.
    Timeout { program: String, timeout: Duration },
    /// The process started but its pipes or exit status could not be read.
    Io { program: String, message: String },
}

impl CommandError {
    pub fn code(&self) -> &'static str {
        match self {
            CommandError::Launch { .. } => "ERR_DEPENDENCY",
            CommandError::Timeout { .. } => "ERR_TIMEOUT",
            CommandError::Io { .. } => "ERR_SYSTEM",
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, CommandError::Timeout { .. })
    }

    pub fn into_app_error(self, trace_id: &str) -> AppError {
        AppError::new(self.code(), self.to_string(), trace_id)
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Launch { program, message } => {
                write!(f, "Failed to spawn {program}: {message}")
            }
            CommandError::Timeout { program, timeout } => {
                write!(f, "{program} timed out after {}s", timeout.as_secs())
            }
            CommandError::Io { program, message } => {
                write!(f, "Failed to read {program} output: {message}")
            }
        }
    }
}

impl std::error::Error for CommandError {}
