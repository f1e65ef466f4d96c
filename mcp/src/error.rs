//! MCP error types.
//!
//! Connect-time variants (`InvalidConfig`, `ConnectionFailed`, `Transport`,
//! `Timeout`) cause a provider to be skipped for the turn. Dispatch-time
//! variants are rendered into the tool call's output and never abort a turn.

use thiserror::Error;

pub type McpResult<T> = Result<T, McpError>;

#[derive(Debug, Error)]
pub enum McpError {
    #[error("Invalid config for provider '{provider}': {reason}")]
    InvalidConfig { provider: String, reason: String },

    #[error("Connection to '{provider}' failed: {cause}")]
    ConnectionFailed { provider: String, cause: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Timed out after {seconds}s: {operation}")]
    Timeout { operation: String, seconds: u64 },

    #[error("Invalid tool name format: {0}")]
    MalformedToolName(String),

    #[error("MCP server not found: {0}")]
    ProviderNotFound(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Tool execution failed: {0}")]
    ToolExecution(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] serde_yaml::Error),
}

impl McpError {
    pub fn invalid_config(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            provider: provider.into(),
            reason: reason.into(),
        }
    }

    pub fn connection_failed(provider: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::ConnectionFailed {
            provider: provider.into(),
            cause: cause.to_string(),
        }
    }

    /// Whether retrying the same connect cannot succeed.
    pub fn is_permanent(&self) -> bool {
        match self {
            Self::InvalidConfig { .. } | Self::Transport(_) | Self::Config(_) => true,
            Self::ConnectionFailed { cause, .. } => {
                cause.contains("initialize")
                    || cause.contains("connection closed")
                    || cause.contains("connection refused")
                    || cause.contains("Connection refused")
                    || cause.contains("invalid URL")
                    || cause.contains("not found")
            }
            _ => false,
        }
    }
}
