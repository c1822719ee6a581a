//! Connection Lifecycle
//!
//! One connection manages one tool-server session over a single transport
//! binding. The lifecycle is strictly `Unopened → Open → Closed`: list and
//! call are only permitted while open, and a connection is never reused
//! after close.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::protocol::RemoteToolDescriptor;

/// Lifecycle state of a connection
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    Unopened,
    Open,
    Closed,
}

/// A tool-server session over one transport binding.
///
/// Owned by the registry that opened it; tools bound to a connection only
/// ever call through it and must not close it.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Identifier used in logs
    fn describe(&self) -> String;

    /// Establish the transport and perform the session handshake.
    ///
    /// A handshake failure leaves the connection `Closed` and propagates
    /// the error.
    async fn open(&self) -> Result<()>;

    /// Enumerate the server's tool descriptors. Only valid while open.
    async fn list_tools(&self) -> Result<Vec<RemoteToolDescriptor>>;

    /// Invoke a remote tool and return its text result. Only valid while
    /// open.
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<String>;

    /// Tear down the session and transport.
    ///
    /// Idempotent and best-effort: secondary teardown errors are logged,
    /// never propagated.
    async fn close(&self);
}
