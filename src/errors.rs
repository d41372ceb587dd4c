use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced to callers of the orchestration engine.
///
/// Tool failures never appear here: they are captured per call and turned
/// into `{"error": ...}` envelopes inside the corresponding tool result.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChatError {
    #[error("invalid {parameter}: {reason}")]
    Validation {
        parameter: &'static str,
        reason: String,
    },

    #[error("malformed message content: {0}")]
    Format(String),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("file rejected: {0}")]
    File(String),

    #[error("client is closed")]
    Closed,

    #[error("cancelled before completion")]
    Cancelled,
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        ChatError::Transport(err.to_string())
    }
}

pub type ChatResult<T> = Result<T, ChatError>;

/// Failure of a single tool invocation, enveloped into its tool result
/// rather than propagated.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("execution failed: {0}")]
    Execution(String),
}
