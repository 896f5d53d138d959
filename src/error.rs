use serde::Serialize;

/// Structured error type for the orchestration core. Execution failures are
/// rendered into `ToolExecutionResult::error` via `Display`, so every message
/// that callers match on starts with its stable code.
#[derive(Debug, Clone, Serialize, thiserror::Error)]
#[cfg_attr(feature = "ts-bindings", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts-bindings", ts(export))]
#[serde(tag = "code", content = "detail", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppError {
    #[error("{what} not found")]
    NotFound { what: String },
    #[error("VALIDATION_ERROR: {message}")]
    ValidationError { message: String },
    #[error(
        "REV_CONFLICT: expected state version {expected} but the project is at {actual}; re-read the project and plan again"
    )]
    RevConflict { expected: u64, actual: u64 },
    #[error("PRECONDITION_FAILED: {message}")]
    PreconditionFailed { message: String },
    #[error("REFERENCE_UNRESOLVED: {message}")]
    ReferenceUnresolved { message: String },
    #[error("HANDLER_ERROR: {message}")]
    HandlerError { message: String },
    #[error("I/O error: {message}")]
    IoError { message: String },
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

impl AppError {
    /// Stable machine-readable code, matching the serde tag.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound { .. } => "NOT_FOUND",
            AppError::ValidationError { .. } => "VALIDATION_ERROR",
            AppError::RevConflict { .. } => "REV_CONFLICT",
            AppError::PreconditionFailed { .. } => "PRECONDITION_FAILED",
            AppError::ReferenceUnresolved { .. } => "REFERENCE_UNRESOLVED",
            AppError::HandlerError { .. } => "HANDLER_ERROR",
            AppError::IoError { .. } => "IO_ERROR",
            AppError::InvalidConfig { .. } => "INVALID_CONFIG",
        }
    }

    pub fn tool_not_found(name: &str) -> Self {
        AppError::NotFound {
            what: format!("Tool '{name}'"),
        }
    }

    pub fn handler(message: impl Into<String>) -> Self {
        AppError::HandlerError {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::IoError {
            message: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::ValidationError {
            message: e.to_string(),
        }
    }
}

/// Allow converting AppError to String for result payloads and the CLI.
impl From<AppError> for String {
    fn from(e: AppError) -> String {
        e.to_string()
    }
}

impl From<String> for AppError {
    fn from(s: String) -> Self {
        AppError::ValidationError { message: s }
    }
}

impl From<&str> for AppError {
    fn from(s: &str) -> Self {
        AppError::ValidationError {
            message: s.to_string(),
        }
    }
}
