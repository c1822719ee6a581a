//! Protocol Plumbing
//!
//! JSON-RPC framing shared by both transports: request/notification
//! envelopes, response unwrapping, tool-listing decode, call-result text
//! extraction, and server-sent-event line reassembly.

use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::{McpError, Result};

pub const JSONRPC_VERSION: &str = "2.0";
pub const PROTOCOL_VERSION: &str = "2025-03-26";

pub const METHOD_INITIALIZE: &str = "initialize";
pub const METHOD_INITIALIZED: &str = "notifications/initialized";
pub const METHOD_LIST_TOOLS: &str = "tools/list";
pub const METHOD_CALL_TOOL: &str = "tools/call";

/// JSON-RPC request envelope
pub fn request(id: i64, method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "method": method,
        "params": params,
    })
}

/// JSON-RPC notification envelope (no id, no response expected)
pub fn notification(method: &str) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "method": method,
    })
}

/// Parameters for the session handshake
pub fn initialize_params() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        },
    })
}

/// The id a response answers, if any
pub fn response_id(message: &Value) -> Option<i64> {
    message.get("id").and_then(Value::as_i64)
}

/// Unwrap a JSON-RPC response envelope into its result payload.
pub fn into_result(response: Value) -> Result<Value> {
    if let Some(error) = response.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        return Err(McpError::Protocol(message.to_string()));
    }
    response
        .get("result")
        .cloned()
        .ok_or_else(|| McpError::Protocol("response carries neither result nor error".into()))
}

/// Descriptor of a tool exposed by a server, as returned by `tools/list`.
/// Created once at enumeration time and immutable thereafter.
#[derive(Clone, Debug, Deserialize)]
pub struct RemoteToolDescriptor {
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// JSON-schema argument description, reproduced bit-for-bit in the
    /// declaration handed to the completion endpoint
    #[serde(rename = "inputSchema", default = "empty_object")]
    pub input_schema: Value,
}

fn empty_object() -> Value {
    json!({"type": "object"})
}

/// Decode a `tools/list` result payload.
pub fn parse_tool_list(result: &Value) -> Result<Vec<RemoteToolDescriptor>> {
    let tools = result.get("tools").cloned().unwrap_or_else(|| json!([]));
    Ok(serde_json::from_value(tools)?)
}

/// Flatten a `tools/call` result to its text content.
pub fn extract_text_content(result: &Value) -> String {
    let texts: Vec<&str> = result
        .get("content")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter(|item| item.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|item| item.get("text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();

    if texts.is_empty() {
        "No text content found in the tool response".to_string()
    } else {
        texts.join("\n")
    }
}

/// Reassembles server-sent-event lines across chunk boundaries.
#[derive(Default)]
pub struct SseLineBuffer {
    pending: Vec<u8>,
}

impl SseLineBuffer {
    /// Feed a chunk; returns every complete, non-empty line it finished.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(newline) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=newline).collect();
            let mut end = raw.len() - 1;
            if end > 0 && raw[end - 1] == b'\r' {
                end -= 1;
            }
            if let Ok(text) = std::str::from_utf8(&raw[..end]) {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    lines.push(trimmed.to_string());
                }
            }
        }
        lines
    }

    /// Flush the trailing unterminated line, if any.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        let text = std::str::from_utf8(&rest).ok()?;
        let trimmed = text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}

/// Payload of an SSE `data:` line
pub fn sse_data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_result_unwraps_result() {
        let response = json!({"jsonrpc": "2.0", "id": 1, "result": {"ok": true}});
        assert_eq!(into_result(response).unwrap()["ok"], true);
    }

    #[test]
    fn test_into_result_maps_error_member() {
        let response =
            json!({"jsonrpc": "2.0", "id": 1, "error": {"code": -32601, "message": "Method not found"}});
        let err = into_result(response).unwrap_err();
        assert!(matches!(err, McpError::Protocol(msg) if msg == "Method not found"));
    }

    #[test]
    fn test_parse_tool_list() {
        let result = json!({
            "tools": [
                {"name": "calculator", "description": "Adds numbers", "inputSchema": {"type": "object"}},
                {"name": "bare"},
            ]
        });
        let tools = parse_tool_list(&result).unwrap();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].name, "calculator");
        assert!(tools[1].description.is_none());
        assert_eq!(tools[1].input_schema["type"], "object");
    }

    #[test]
    fn test_extract_text_content_joins_text_items() {
        let result = json!({
            "content": [
                {"type": "text", "text": "Result: 3"},
                {"type": "image", "data": "…"},
                {"type": "text", "text": "done"},
            ]
        });
        assert_eq!(extract_text_content(&result), "Result: 3\ndone");
    }

    #[test]
    fn test_extract_text_content_placeholder_when_empty() {
        assert_eq!(
            extract_text_content(&json!({"content": []})),
            "No text content found in the tool response"
        );
    }

    #[test]
    fn test_sse_line_buffer_handles_chunk_boundaries() {
        let mut buffer = SseLineBuffer::default();
        assert_eq!(buffer.push(b"data: one\n\n"), vec!["data: one"]);
        assert_eq!(buffer.push(b"data: t"), Vec::<String>::new());
        assert_eq!(buffer.push(b"wo\n"), vec!["data: two"]);
        assert_eq!(buffer.finish(), None);
    }

    #[test]
    fn test_sse_data_payload() {
        assert_eq!(sse_data_payload("data: {\"a\":1}"), Some("{\"a\":1}"));
        assert_eq!(sse_data_payload(": keepalive"), None);
    }
}
