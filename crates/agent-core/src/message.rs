//! Conversation Messages
//!
//! Message format shared by the history, the dispatcher, and the
//! completion provider. A message is a tagged variant per role, so a
//! `tool` result without its originating call id is unrepresentable.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Role of a message sender
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompt/instructions
    System,
    /// User input
    User,
    /// Assistant (LLM) response
    Assistant,
    /// Tool result (injected as context)
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// A tool invocation requested by the completion endpoint.
///
/// Produced by the provider when decoding a response, consumed exactly once
/// by the dispatcher, and echoed back to the endpoint on the next request
/// as part of the assistant message that carried it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call identifier assigned by the endpoint
    pub id: String,

    /// Tool name
    pub name: String,

    /// Structured arguments (decoded from the endpoint's JSON string)
    pub arguments: Value,
}

/// Outcome of one tool call.
///
/// Always produced: a failing call yields a result whose content describes
/// the error, never an unhandled fault.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolResult {
    /// Call identifier this result answers
    pub call_id: String,

    /// Tool that was called
    pub name: String,

    /// Success text or error description
    pub content: String,
}

/// Token usage counters reported by the completion endpoint.
///
/// `prompt_tokens` is cumulative for the whole request (all prior turns
/// included); `completion_tokens` covers the generated turn only.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A single message in a conversation
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        content: String,
        /// Tool calls carried by this response, preserved verbatim so the
        /// next request can echo them to the endpoint.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        call_id: String,
        tool_name: String,
        content: String,
    },
}

impl Message {
    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
        }
    }

    /// Create a plain assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    /// Create an assistant message carrying tool-call requests
    pub fn assistant_with_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self::Assistant {
            content: content.into(),
            tool_calls,
        }
    }

    /// Create a tool result message
    pub fn tool(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::Tool {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            content: content.into(),
        }
    }

    /// Message role
    pub fn role(&self) -> Role {
        match self {
            Message::System { .. } => Role::System,
            Message::User { .. } => Role::User,
            Message::Assistant { .. } => Role::Assistant,
            Message::Tool { .. } => Role::Tool,
        }
    }

    /// Text content
    pub fn content(&self) -> &str {
        match self {
            Message::System { content }
            | Message::User { content }
            | Message::Assistant { content, .. }
            | Message::Tool { content, .. } => content,
        }
    }
}

impl From<ToolResult> for Message {
    fn from(result: ToolResult) -> Self {
        Message::tool(result.call_id, result.name, result.content)
    }
}
