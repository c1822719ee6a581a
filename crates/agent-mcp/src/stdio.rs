//! Stdio Transport
//!
//! Spawns the tool server as a child process and speaks newline-delimited
//! JSON-RPC over its standard streams. A background task routes responses
//! to their pending requests by id; stderr is drained so the child never
//! blocks on a full pipe.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex, oneshot};

use crate::connection::{Connection, Lifecycle};
use crate::error::{McpError, Result};
use crate::protocol::{self, RemoteToolDescriptor};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

type PendingMap = Arc<Mutex<HashMap<i64, oneshot::Sender<Value>>>>;

struct Session {
    stdin: ChildStdin,
    child: Child,
}

struct StdioState {
    lifecycle: Lifecycle,
    session: Option<Session>,
}

/// Connection to a tool server spawned as a child process
pub struct StdioConnection {
    command: String,
    args: Vec<String>,
    env: HashMap<String, String>,
    state: Mutex<StdioState>,
    pending: PendingMap,
    next_request_id: AtomicI64,
}

impl StdioConnection {
    pub fn new(command: String, args: Vec<String>, env: HashMap<String, String>) -> Self {
        Self {
            command,
            args,
            env,
            state: Mutex::new(StdioState {
                lifecycle: Lifecycle::Unopened,
                session: None,
            }),
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_request_id: AtomicI64::new(0),
        }
    }

    fn spawn_stdout_reader(pending: PendingMap, stdout: ChildStdout) {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let Ok(message) = serde_json::from_str::<Value>(&line) else {
                    tracing::debug!("skipping non-JSON line from tool server");
                    continue;
                };
                match protocol::response_id(&message) {
                    Some(id) => {
                        if let Some(tx) = pending.lock().await.remove(&id) {
                            let _ = tx.send(message);
                        }
                    }
                    None => tracing::debug!("ignoring server-initiated message"),
                }
            }
            // EOF: dropping the senders wakes every waiter with an error.
            pending.lock().await.clear();
        });
    }

    fn spawn_stderr_drain(stderr: ChildStderr) {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::debug!(line = %line, "tool server stderr");
            }
        });
    }

    async fn write_line(&self, payload: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let Some(session) = state.session.as_mut() else {
            return Err(McpError::NotOpen);
        };
        session.stdin.write_all(payload.as_bytes()).await?;
        session.stdin.write_all(b"\n").await?;
        session.stdin.flush().await?;
        Ok(())
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_request_id.fetch_add(1, Ordering::SeqCst);
        let payload = serde_json::to_string(&protocol::request(id, method, params))?;
        tracing::debug!(id, method, "sending stdio request");

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        if let Err(e) = self.write_line(&payload).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(response)) => protocol::into_result(response),
            Ok(Err(_)) => Err(McpError::Transport(
                "tool server closed before responding".into(),
            )),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(McpError::Timeout(method.to_string()))
            }
        }
    }

    async fn notify(&self, method: &str) -> Result<()> {
        let payload = serde_json::to_string(&protocol::notification(method))?;
        self.write_line(&payload).await
    }

    async fn handshake(&self) -> Result<()> {
        let result = self
            .request(protocol::METHOD_INITIALIZE, protocol::initialize_params())
            .await?;
        let server = result
            .get("serverInfo")
            .and_then(|info| info.get("name"))
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        tracing::debug!(server = %server, "initialize handshake complete");
        self.notify(protocol::METHOD_INITIALIZED).await
    }
}

#[async_trait]
impl Connection for StdioConnection {
    fn describe(&self) -> String {
        format!("stdio:{}", self.command)
    }

    async fn open(&self) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            match state.lifecycle {
                Lifecycle::Unopened => {}
                Lifecycle::Open => {
                    return Err(McpError::Config("connection already open".into()));
                }
                Lifecycle::Closed => return Err(McpError::NotOpen),
            }

            tracing::debug!(command = %self.command, args = ?self.args, "starting tool server");
            let spawned = Command::new(&self.command)
                .args(&self.args)
                .envs(&self.env)
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .spawn();

            let mut child = match spawned {
                Ok(child) => child,
                Err(e) => {
                    state.lifecycle = Lifecycle::Closed;
                    return Err(McpError::Transport(format!(
                        "failed to spawn {}: {e}",
                        self.command
                    )));
                }
            };

            let (stdin, stdout, stderr) = match (
                child.stdin.take(),
                child.stdout.take(),
                child.stderr.take(),
            ) {
                (Some(stdin), Some(stdout), Some(stderr)) => (stdin, stdout, stderr),
                _ => {
                    state.lifecycle = Lifecycle::Closed;
                    let _ = child.kill().await;
                    return Err(McpError::Transport(
                        "unable to retrieve child process pipes".into(),
                    ));
                }
            };

            Self::spawn_stdout_reader(Arc::clone(&self.pending), stdout);
            Self::spawn_stderr_drain(stderr);

            state.session = Some(Session { stdin, child });
            state.lifecycle = Lifecycle::Open;
        }

        match self.handshake().await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.close().await;
                Err(McpError::Handshake(e.to_string()))
            }
        }
    }

    async fn list_tools(&self) -> Result<Vec<RemoteToolDescriptor>> {
        let result = self
            .request(protocol::METHOD_LIST_TOOLS, serde_json::json!({}))
            .await?;
        protocol::parse_tool_list(&result)
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<String> {
        let result = self
            .request(
                protocol::METHOD_CALL_TOOL,
                serde_json::json!({"name": name, "arguments": arguments}),
            )
            .await?;
        Ok(protocol::extract_text_content(&result))
    }

    async fn close(&self) {
        let session = {
            let mut state = self.state.lock().await;
            if state.lifecycle == Lifecycle::Closed {
                return;
            }
            state.lifecycle = Lifecycle::Closed;
            state.session.take()
        };

        if let Some(session) = session {
            tracing::debug!(command = %self.command, "closing tool server");
            let Session { stdin, mut child } = session;
            drop(stdin);
            if let Err(e) = child.kill().await {
                tracing::warn!(command = %self.command, error = %e, "failed to kill tool server");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unopened() -> StdioConnection {
        StdioConnection::new("true".into(), Vec::new(), HashMap::new())
    }

    #[tokio::test]
    async fn test_calls_require_open_state() {
        let connection = unopened();
        let err = connection.list_tools().await.unwrap_err();
        assert!(matches!(err, McpError::NotOpen));

        connection.close().await;
        let err = connection
            .call_tool("calculator", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::NotOpen));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let connection = unopened();
        connection.close().await;
        connection.close().await;
        let err = connection.open().await.unwrap_err();
        assert!(matches!(err, McpError::NotOpen));
    }

    #[tokio::test]
    async fn test_spawn_failure_leaves_connection_closed() {
        let connection = StdioConnection::new(
            "/nonexistent/tool-server-binary".into(),
            Vec::new(),
            HashMap::new(),
        );
        let err = connection.open().await.unwrap_err();
        assert!(matches!(err, McpError::Transport(_)));

        let err = connection.list_tools().await.unwrap_err();
        assert!(matches!(err, McpError::NotOpen));
    }

    /// Shell stub speaking just enough of the protocol for a full session.
    /// Request ids are hardcoded to the connection's 0,1,2 sequence.
    #[cfg(unix)]
    const STUB_SERVER: &str = r#"
while read line; do
  case "$line" in
    *'"method":"initialize"'*)
      printf '%s\n' '{"jsonrpc":"2.0","id":0,"result":{"protocolVersion":"2025-03-26","capabilities":{"tools":{}},"serverInfo":{"name":"stub","version":"0.0.0"}}}' ;;
    *'"method":"tools/list"'*)
      printf '%s\n' '{"jsonrpc":"2.0","id":1,"result":{"tools":[{"name":"calculator","description":"Basic calculator","inputSchema":{"type":"object"}}]}}' ;;
    *'"method":"tools/call"'*)
      printf '%s\n' '{"jsonrpc":"2.0","id":2,"result":{"content":[{"type":"text","text":"Result: 3"}]}}' ;;
  esac
done
"#;

    #[cfg(unix)]
    #[tokio::test]
    async fn test_full_session_against_stub_server() {
        let connection = StdioConnection::new(
            "sh".into(),
            vec!["-c".into(), STUB_SERVER.into()],
            HashMap::new(),
        );

        connection.open().await.unwrap();

        let tools = connection.list_tools().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "calculator");

        let output = connection
            .call_tool(
                "calculator",
                serde_json::json!({"number1": 1, "number2": 2, "operation": "+"}),
            )
            .await
            .unwrap();
        assert_eq!(output, "Result: 3");

        connection.close().await;
        let err = connection.list_tools().await.unwrap_err();
        assert!(matches!(err, McpError::NotOpen));
    }
}
