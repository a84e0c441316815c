//! Tool-level error type

/// Errors surfaced by tool operations
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("[{tool}] precondition failed: {condition}. Suggestion: {suggestion}")]
    Precondition {
        tool: String,
        condition: String,
        suggestion: String,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// State machine refusal, carrying the denial text
    #[error("{0}")]
    Denied(String),

    #[error(transparent)]
    Store(#[from] anyhow::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ToolError {
    pub fn precondition(
        tool: impl Into<String>,
        condition: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        ToolError::Precondition {
            tool: tool.into(),
            condition: condition.into(),
            suggestion: suggestion.into(),
        }
    }
}

pub type ToolResult<T> = std::result::Result<T, ToolError>;
