//! Server Registry
//!
//! Opens every configured tool server, enumerates its tools as remote
//! `Tool` instances, and owns the opened connections until `close_all`.
//! One failing server degrades to "contributes zero tools"; it never
//! aborts its siblings. Teardown walks the acquisition list in reverse and
//! closes each connection exactly once.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use agent_core::tool::{Tool, ToolSchema};

use crate::config::ServerConfig;
use crate::connection::Connection;
use crate::error::Result;
use crate::protocol::RemoteToolDescriptor;
use crate::stdio::StdioConnection;
use crate::stream::StreamConnection;

/// A tool hosted by a remote server.
///
/// Holds a non-owning handle to its connection: it calls through it but
/// never manages its lifetime.
pub struct RemoteTool {
    descriptor: RemoteToolDescriptor,
    connection: Arc<dyn Connection>,
}

impl RemoteTool {
    pub fn new(descriptor: RemoteToolDescriptor, connection: Arc<dyn Connection>) -> Self {
        Self {
            descriptor,
            connection,
        }
    }
}

#[async_trait]
impl Tool for RemoteTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            self.descriptor.name.clone(),
            self.descriptor
                .description
                .clone()
                .unwrap_or_else(|| format!("Remote tool {}", self.descriptor.name)),
            self.descriptor.input_schema.clone(),
        )
    }

    async fn execute(&self, arguments: &Value) -> agent_core::Result<String> {
        let output = self
            .connection
            .call_tool(&self.descriptor.name, arguments.clone())
            .await?;
        Ok(output)
    }
}

/// Owns every connection it opened and the remote tools derived from them
#[derive(Default)]
pub struct ServerRegistry {
    connections: Vec<Arc<dyn Connection>>,
}

impl ServerRegistry {
    pub fn new() -> Self {
        Self {
            connections: Vec::new(),
        }
    }

    /// Open each configured server and collect its tools.
    ///
    /// A server that fails to validate, open, or enumerate is logged and
    /// skipped; the rest of the batch proceeds.
    pub async fn connect(&mut self, configs: &[ServerConfig]) -> Vec<Arc<dyn Tool>> {
        let mut tools: Vec<Arc<dyn Tool>> = Vec::new();

        for config in configs {
            match self.connect_one(config).await {
                Ok(server_tools) => tools.extend(server_tools),
                Err(e) => {
                    tracing::warn!(server = %config.describe(), error = %e, "skipping tool server");
                }
            }
        }

        tracing::info!(
            tools = tools.len(),
            servers = configs.len(),
            "loaded remote tools"
        );
        tools
    }

    async fn connect_one(&mut self, config: &ServerConfig) -> Result<Vec<Arc<dyn Tool>>> {
        config.validate()?;

        let connection: Arc<dyn Connection> = match config.clone() {
            ServerConfig::Stdio { command, args, env } => {
                Arc::new(StdioConnection::new(command, args, env))
            }
            ServerConfig::Stream { url, headers } => {
                Arc::new(StreamConnection::new(url, headers))
            }
        };

        connection.open().await?;
        // Recorded as soon as the open succeeds, so a failure enumerating
        // tools still gets this connection torn down with the rest.
        self.connections.push(Arc::clone(&connection));

        let descriptors = connection.list_tools().await?;
        tracing::debug!(
            server = %connection.describe(),
            tools = descriptors.len(),
            "enumerated remote tools"
        );

        Ok(descriptors
            .into_iter()
            .map(|descriptor| {
                Arc::new(RemoteTool::new(descriptor, Arc::clone(&connection))) as Arc<dyn Tool>
            })
            .collect())
    }

    /// Close every opened connection, most recently acquired first.
    pub async fn close_all(&mut self) {
        for connection in self.connections.drain(..).rev() {
            connection.close().await;
        }
    }

    /// Number of connections currently owned
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

/// Run one request with the configured servers' tools available for the
/// duration of that invocation only.
///
/// Every connection the registry opened is closed before this returns,
/// whether the turn loop succeeded or failed.
pub async fn run_with_servers(
    agent: &mut agent_core::Agent,
    configs: &[ServerConfig],
    input: &str,
) -> agent_core::Result<String> {
    let mut registry = ServerRegistry::new();
    let tools = registry.connect(configs).await;

    let result = agent.run_with_tools(input, tools).await;
    registry.close_all().await;
    result
}
