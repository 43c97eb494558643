//! Error types for Celeste.

use thiserror::Error;

/// Primary error type for all Celeste operations.
#[derive(Error, Debug)]
pub enum CelesteError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Path escapes workspace: {0}")]
    PathEscape(String),

    #[error("Invalid tool arguments: {0}")]
    ToolArgument(String),

    #[error("Tool execution error: {tool_name} — {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt run state: {0}")]
    CorruptState(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Coarse classification used by callers that only care about the kind of
/// failure (exit-code mapping, error payloads to the model).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Input,
    NotFound,
    Tool,
    Timeout,
    Transport,
    State,
    Cancelled,
    Configuration,
}

impl CelesteError {
    /// Create an API error.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create a tool execution error.
    pub fn tool(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool_name: tool_name.into(),
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidInput(_) => ErrorCategory::Input,
            Self::NotFound(_) => ErrorCategory::NotFound,
            Self::PathEscape(_) | Self::ToolArgument(_) | Self::ToolExecution { .. } => {
                ErrorCategory::Tool
            }
            Self::Timeout(_) => ErrorCategory::Timeout,
            Self::Api { .. } | Self::Network(_) => ErrorCategory::Transport,
            Self::Io(_) | Self::Serialization(_) | Self::CorruptState(_) => ErrorCategory::State,
            Self::Cancelled(_) => ErrorCategory::Cancelled,
            Self::Configuration(_) => ErrorCategory::Configuration,
        }
    }

    /// Whether this failure should terminate the run rather than be reported
    /// back to the model as a tool error payload.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Transport | ErrorCategory::Cancelled
        )
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, CelesteError>;
