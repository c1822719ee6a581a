//! Error Types

use thiserror::Error;

/// Result type alias for tool-server operations
pub type Result<T> = std::result::Result<T, McpError>;

/// Tool-server connection error types
#[derive(Error, Debug)]
pub enum McpError {
    /// Malformed server configuration
    #[error("Invalid server config: {0}")]
    Config(String),

    /// Operation attempted outside the `Open` lifecycle state
    #[error("Connection not open")]
    NotOpen,

    /// Session handshake failed
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// Transport-level failure (spawn, pipe, HTTP status)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Server replied with a protocol error or an undecodable payload
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Request did not complete in time
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<McpError> for agent_core::AgentError {
    fn from(err: McpError) -> Self {
        agent_core::AgentError::ToolExecution(err.to_string())
    }
}
