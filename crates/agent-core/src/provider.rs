//! Completion Provider Interface
//!
//! Defines a common interface for completion endpoints, allowing the agent
//! to work with any backend without code changes. Providers receive the
//! fully assembled request (transcript plus tool declarations) and return
//! the generated message with its tool-call requests and usage counters.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::message::{Message, TokenUsage, ToolCall};

/// Model configuration for the agent
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model identifier (e.g., "gpt-4o-mini")
    pub model: String,

    /// Maximum tokens to generate per turn
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Temperature for sampling
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens retained in history before truncation
    #[serde(default = "default_context_window_tokens")]
    pub context_window_tokens: u32,

    /// Maximum tool-call rounds before the turn loop gives up
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,

    /// Execute a turn's tool calls concurrently
    #[serde(default = "default_parallel_tools")]
    pub parallel_tools: bool,
}

fn default_max_tokens() -> u32 {
    4096
}
fn default_temperature() -> f32 {
    0.7
}
fn default_context_window_tokens() -> u32 {
    8192
}
fn default_max_turns() -> usize {
    10
}
fn default_parallel_tools() -> bool {
    true
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".into(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            context_window_tokens: default_context_window_tokens(),
            max_turns: default_max_turns(),
            parallel_tools: default_parallel_tools(),
        }
    }
}

/// A fully assembled completion request
#[derive(Clone, Debug, Serialize)]
pub struct CompletionRequest {
    pub model: String,

    /// System message first, then the transcript in construction order
    pub messages: Vec<Message>,

    pub max_tokens: u32,

    pub temperature: f32,

    /// Tool declarations; empty means the request carries none
    pub tools: Vec<Value>,
}

/// Response from a completion endpoint
#[derive(Clone, Debug)]
pub struct Completion {
    /// The generated text
    pub content: String,

    /// Tool calls requested by this response
    pub tool_calls: Vec<ToolCall>,

    /// Model that generated this response
    pub model: String,

    /// Token usage statistics (if available)
    pub usage: Option<TokenUsage>,

    /// Finish reason
    pub finish_reason: Option<FinishReason>,
}

impl Completion {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Reason for completion finishing
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    Error,
}

/// Strategy trait for completion providers
///
/// Implement this trait to add support for new backends. The engine works
/// exclusively through this interface.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate a completion from the assembled request
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion>;

    /// Check if the provider is available and configured correctly
    async fn health_check(&self) -> Result<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_config_defaults() {
        let config = ModelConfig::default();
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.max_tokens, 4096);
        assert_eq!(config.context_window_tokens, 8192);
        assert_eq!(config.max_turns, 10);
        assert!(config.parallel_tools);
    }
}
