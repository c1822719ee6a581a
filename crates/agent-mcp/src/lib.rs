//! # agent-mcp
//!
//! Tool-server connections for the agent engine: a tagged configuration
//! union selects one of two transport bindings (child-process standard
//! streams or a persistent HTTP event stream), a shared `Connection` trait
//! covers the open/list/call/close contract, and a registry turns a set of
//! server configs into remote `Tool` instances while guaranteeing that
//! every connection it opened is closed exactly once.
//!
//! ```rust,ignore
//! use agent_mcp::{ServerConfig, run_with_servers};
//!
//! let servers = vec![ServerConfig::Stdio {
//!     command: "python".into(),
//!     args: vec!["calculator_server.py".into()],
//!     env: Default::default(),
//! }];
//! let answer = run_with_servers(&mut agent, &servers, "what is 1 + 2?").await?;
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod stdio;
pub mod stream;

pub use config::ServerConfig;
pub use connection::{Connection, Lifecycle};
pub use error::{McpError, Result};
pub use registry::{RemoteTool, ServerRegistry, run_with_servers};
pub use stdio::StdioConnection;
pub use stream::StreamConnection;
