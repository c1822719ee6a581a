//! Stream Transport
//!
//! Persistent tool-server session over HTTP: every JSON-RPC frame is
//! POSTed to the endpoint, responses arrive as plain JSON or as a
//! server-sent event stream, and the session is threaded through the
//! `Mcp-Session-Id` header the server hands back on initialize.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::connection::{Connection, Lifecycle};
use crate::error::{McpError, Result};
use crate::protocol::{self, RemoteToolDescriptor, SseLineBuffer};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

const SESSION_ID_HEADER: &str = "Mcp-Session-Id";

struct StreamState {
    lifecycle: Lifecycle,
    client: Option<reqwest::Client>,
    session_id: Option<String>,
}

/// Connection to a tool server behind a streamable HTTP endpoint
pub struct StreamConnection {
    url: String,
    headers: HashMap<String, String>,
    state: Mutex<StreamState>,
    next_request_id: AtomicI64,
}

impl StreamConnection {
    pub fn new(url: String, headers: HashMap<String, String>) -> Self {
        Self {
            url,
            headers,
            state: Mutex::new(StreamState {
                lifecycle: Lifecycle::Unopened,
                client: None,
                session_id: None,
            }),
            next_request_id: AtomicI64::new(0),
        }
    }

    async fn send_frame(&self, frame: &Value) -> Result<reqwest::Response> {
        let (client, session_id) = {
            let state = self.state.lock().await;
            let Some(client) = state.client.clone() else {
                return Err(McpError::NotOpen);
            };
            (client, state.session_id.clone())
        };

        let mut request = client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json, text/event-stream");
        for (name, value) in &self.headers {
            request = request.header(name, value);
        }
        if let Some(session_id) = session_id {
            request = request.header(SESSION_ID_HEADER, session_id);
        }

        let response = request.body(frame.to_string()).send().await?;
        let status = response.status();
        tracing::debug!(url = %self.url, status = %status, "stream transport response");
        if !status.is_success() {
            return Err(McpError::Transport(format!("HTTP error: {status}")));
        }

        // The server assigns (or rotates) the session on any response.
        if let Some(session_id) = response
            .headers()
            .get("mcp-session-id")
            .and_then(|value| value.to_str().ok())
        {
            self.state.lock().await.session_id = Some(session_id.to_string());
        }

        Ok(response)
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_request_id.fetch_add(1, Ordering::SeqCst);
        let frame = protocol::request(id, method, params);
        tracing::debug!(id, method, "sending stream request");

        let response = self.send_frame(&frame).await?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("")
            .to_string();

        let message = if content_type.starts_with("text/event-stream") {
            Self::read_sse_response(response).await?
        } else {
            let body = response.bytes().await?;
            serde_json::from_slice::<Value>(&body)?
        };

        protocol::into_result(message)
    }

    async fn notify(&self, method: &str) -> Result<()> {
        // Notifications are fire-and-forget; any 2xx acknowledgement body
        // is irrelevant.
        self.send_frame(&protocol::notification(method)).await?;
        Ok(())
    }

    /// Drain the event stream until the first response-shaped message.
    async fn read_sse_response(response: reqwest::Response) -> Result<Value> {
        let mut stream = response.bytes_stream();
        let mut buffer = SseLineBuffer::default();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            for line in buffer.push(&chunk) {
                if let Some(message) = Self::decode_sse_line(&line) {
                    return Ok(message);
                }
            }
        }
        if let Some(line) = buffer.finish() {
            if let Some(message) = Self::decode_sse_line(&line) {
                return Ok(message);
            }
        }

        Err(McpError::Protocol("empty event-stream response".into()))
    }

    fn decode_sse_line(line: &str) -> Option<Value> {
        let payload = protocol::sse_data_payload(line)?;
        if payload.is_empty() {
            return None;
        }
        let message = serde_json::from_str::<Value>(payload).ok()?;
        // Server-initiated requests carry a method; only responses answer
        // ours.
        if message.get("method").is_some() {
            return None;
        }
        Some(message)
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
impl Connection for StreamConnection {
    fn describe(&self) -> String {
        format!("stream:{}", self.url)
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

            let client = reqwest::Client::builder()
                .connect_timeout(CONNECT_TIMEOUT)
                .timeout(REQUEST_TIMEOUT)
                .pool_idle_timeout(POOL_IDLE_TIMEOUT)
                .build();
            match client {
                Ok(client) => {
                    state.client = Some(client);
                    state.lifecycle = Lifecycle::Open;
                }
                Err(e) => {
                    state.lifecycle = Lifecycle::Closed;
                    return Err(McpError::Transport(format!(
                        "failed to build HTTP client: {e}"
                    )));
                }
            }
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
        let (client, session_id) = {
            let mut state = self.state.lock().await;
            if state.lifecycle == Lifecycle::Closed {
                return;
            }
            state.lifecycle = Lifecycle::Closed;
            (state.client.take(), state.session_id.take())
        };

        // Best-effort session termination; the server may not support it.
        if let (Some(client), Some(session_id)) = (client, session_id) {
            tracing::debug!(url = %self.url, "terminating stream session");
            let mut request = client.delete(&self.url).header(SESSION_ID_HEADER, session_id);
            for (name, value) in &self.headers {
                request = request.header(name, value);
            }
            if let Err(e) = request.send().await {
                tracing::warn!(url = %self.url, error = %e, "session teardown request failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unopened() -> StreamConnection {
        StreamConnection::new("http://localhost:0/mcp".into(), HashMap::new())
    }

    #[tokio::test]
    async fn test_calls_require_open_state() {
        let connection = unopened();
        let err = connection.list_tools().await.unwrap_err();
        assert!(matches!(err, McpError::NotOpen));
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_final() {
        let connection = unopened();
        connection.close().await;
        connection.close().await;
        let err = connection.open().await.unwrap_err();
        assert!(matches!(err, McpError::NotOpen));
    }

    #[tokio::test]
    async fn test_handshake_failure_leaves_connection_closed() {
        // Port 0 is never listening; open fails during the handshake.
        let connection = unopened();
        let err = connection.open().await.unwrap_err();
        assert!(matches!(err, McpError::Handshake(_)));

        let err = connection.list_tools().await.unwrap_err();
        assert!(matches!(err, McpError::NotOpen));
    }

    #[test]
    fn test_decode_sse_line_skips_server_requests() {
        assert!(
            StreamConnection::decode_sse_line(
                r#"data: {"jsonrpc":"2.0","id":9,"method":"sampling/createMessage"}"#
            )
            .is_none()
        );
        let message = StreamConnection::decode_sse_line(
            r#"data: {"jsonrpc":"2.0","id":0,"result":{}}"#,
        )
        .unwrap();
        assert_eq!(protocol::response_id(&message), Some(0));
    }
}
