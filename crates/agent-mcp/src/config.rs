//! Tool-Server Configuration
//!
//! Tagged union selecting the transport binding for one server.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{McpError, Result};

/// Configuration for one tool server
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerConfig {
    /// Child process speaking the protocol over its standard streams
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
    },

    /// Persistent network event-stream session
    Stream {
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
}

impl ServerConfig {
    /// Validate the union before any connection is attempted.
    pub fn validate(&self) -> Result<()> {
        match self {
            ServerConfig::Stdio { command, .. } if command.trim().is_empty() => Err(
                McpError::Config("Command is required for stdio connection".into()),
            ),
            ServerConfig::Stream { url, .. } if url.trim().is_empty() => Err(McpError::Config(
                "URL is required for stream connection".into(),
            )),
            _ => Ok(()),
        }
    }

    /// Short form for logs
    pub fn describe(&self) -> String {
        match self {
            ServerConfig::Stdio { command, .. } => format!("stdio:{command}"),
            ServerConfig::Stream { url, .. } => format!("stream:{url}"),
        }
    }
}
