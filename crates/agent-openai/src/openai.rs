//! OpenAI-Compatible Provider
//!
//! Implementation of `LlmProvider` for any endpoint speaking the OpenAI
//! chat-completions wire format, including function-calling tool
//! declarations and cumulative token-usage counters.

use std::time::Duration;

use agent_core::{
    error::{AgentError, Result},
    message::{Message, TokenUsage, ToolCall},
    provider::{Completion, CompletionRequest, FinishReason, LlmProvider},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Provider configuration
#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    /// API key sent as a bearer token
    pub api_key: String,

    /// Endpoint base URL (up to and excluding `/chat/completions`)
    pub base_url: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl OpenAiConfig {
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| AgentError::Config("OPENAI_API_KEY is not set".into()))?;
        let base_url = std::env::var("OPENAI_API_BASE")
            .unwrap_or_else(|_| "https://api.openai.com/v1".into());

        Ok(Self {
            api_key,
            base_url,
            timeout_secs: 120,
        })
    }
}

/// OpenAI-compatible completion provider
pub struct OpenAiProvider {
    client: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiProvider {
    /// Create from configuration
    pub fn from_config(config: OpenAiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AgentError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_config(OpenAiConfig::from_env()?)
    }

    /// Convert engine messages to the wire format
    fn convert_messages(messages: &[Message]) -> Vec<WireMessage> {
        messages.iter().map(WireMessage::from_message).collect()
    }

    /// Convert a wire response to an engine completion
    fn decode_response(response: ChatResponse) -> Result<Completion> {
        let Some(choice) = response.choices.into_iter().next() else {
            return Err(AgentError::Provider("response carried no choices".into()));
        };

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(WireToolCall::into_tool_call)
            .collect();

        Ok(Completion {
            content: choice.message.content.unwrap_or_default(),
            tool_calls,
            model: response.model.unwrap_or_default(),
            usage: response.usage.map(WireUsage::into_usage),
            finish_reason: choice.finish_reason.as_deref().and_then(decode_finish_reason),
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        let body = WireRequest {
            model: &request.model,
            messages: Self::convert_messages(&request.messages),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            tools: if request.tools.is_empty() {
                None
            } else {
                Some(&request.tools)
            },
        };

        tracing::debug!(
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "sending completion request"
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AgentError::ProviderUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::Provider(format!("HTTP {status}: {body}")));
        }

        let decoded = response
            .json::<ChatResponse>()
            .await
            .map_err(|e| AgentError::Parse(e.to_string()))?;

        Self::decode_response(decoded)
    }

    async fn health_check(&self) -> Result<bool> {
        let response = self
            .client
            .get(format!("{}/models", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .send()
            .await;

        match response {
            Ok(response) => Ok(response.status().is_success()),
            Err(e) => {
                tracing::warn!(error = %e, "health check failed");
                Ok(false)
            }
        }
    }
}

fn decode_finish_reason(reason: &str) -> Option<FinishReason> {
    match reason {
        "stop" => Some(FinishReason::Stop),
        "length" => Some(FinishReason::Length),
        "tool_calls" => Some(FinishReason::ToolCalls),
        "content_filter" => Some(FinishReason::ContentFilter),
        _ => None,
    }
}

// ============================================================================
// Wire format
// ============================================================================

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [Value]>,
}

#[derive(Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
}

impl WireMessage {
    fn from_message(message: &Message) -> Self {
        match message {
            Message::System { content } => Self::plain("system", content),
            Message::User { content } => Self::plain("user", content),
            Message::Assistant {
                content,
                tool_calls,
            } => Self {
                role: "assistant",
                content: content.clone(),
                name: None,
                tool_call_id: None,
                tool_calls: if tool_calls.is_empty() {
                    None
                } else {
                    Some(tool_calls.iter().map(WireToolCall::from_tool_call).collect())
                },
            },
            Message::Tool {
                call_id,
                tool_name,
                content,
            } => Self {
                role: "tool",
                content: content.clone(),
                name: Some(tool_name.clone()),
                tool_call_id: Some(call_id.clone()),
                tool_calls: None,
            },
        }
    }

    fn plain(role: &'static str, content: &str) -> Self {
        Self {
            role,
            content: content.to_string(),
            name: None,
            tool_call_id: None,
            tool_calls: None,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct WireToolCall {
    #[serde(default)]
    id: String,
    #[serde(rename = "type")]
    kind: String,
    function: WireToolCallFunction,
}

#[derive(Serialize, Deserialize)]
struct WireToolCallFunction {
    name: String,
    /// Arguments travel as JSON text on the wire
    arguments: String,
}

impl WireToolCall {
    fn from_tool_call(call: &ToolCall) -> Self {
        Self {
            id: call.id.clone(),
            kind: "function".into(),
            function: WireToolCallFunction {
                name: call.name.clone(),
                arguments: serde_json::to_string(&call.arguments)
                    .unwrap_or_else(|_| "{}".into()),
            },
        }
    }

    fn into_tool_call(self) -> ToolCall {
        let id = if self.id.is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            self.id
        };
        // Undecodable argument text is preserved as a raw string so the
        // failure surfaces per-call in the dispatcher, not per-turn here.
        let arguments = serde_json::from_str::<Value>(&self.function.arguments)
            .unwrap_or(Value::String(self.function.arguments));

        ToolCall {
            id,
            name: self.function.name,
            arguments,
        }
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

impl WireUsage {
    fn into_usage(self) -> TokenUsage {
        let total_tokens = if self.total_tokens == 0 {
            self.prompt_tokens + self.completion_tokens
        } else {
            self.total_tokens
        };
        TokenUsage {
            prompt_tokens: self.prompt_tokens,
            completion_tokens: self.completion_tokens,
            total_tokens,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_conversion_preserves_tool_metadata() {
        let messages = vec![
            Message::system("You are helpful."),
            Message::assistant_with_calls(
                "",
                vec![ToolCall {
                    id: "call_1".into(),
                    name: "get_weather".into(),
                    arguments: json!({"city": "Tokyo"}),
                }],
            ),
            Message::tool("call_1", "get_weather", "sunny"),
        ];

        let wire = serde_json::to_value(OpenAiProvider::convert_messages(&messages)).unwrap();

        assert_eq!(wire[0]["role"], "system");
        assert_eq!(wire[1]["tool_calls"][0]["id"], "call_1");
        assert_eq!(wire[1]["tool_calls"][0]["type"], "function");
        // Arguments are re-encoded as JSON text for the wire.
        assert_eq!(
            wire[1]["tool_calls"][0]["function"]["arguments"],
            r#"{"city":"Tokyo"}"#
        );
        assert_eq!(wire[2]["role"], "tool");
        assert_eq!(wire[2]["tool_call_id"], "call_1");
    }

    #[test]
    fn test_decode_response_with_tool_calls() {
        let response: ChatResponse = serde_json::from_value(json!({
            "model": "gpt-4o-mini",
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_9",
                        "type": "function",
                        "function": {"name": "get_weather", "arguments": "{\"city\": \"Paris\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 42, "completion_tokens": 7, "total_tokens": 49}
        }))
        .unwrap();

        let completion = OpenAiProvider::decode_response(response).unwrap();
        assert!(completion.has_tool_calls());
        assert_eq!(completion.tool_calls[0].arguments["city"], "Paris");
        assert_eq!(completion.finish_reason, Some(FinishReason::ToolCalls));
        assert_eq!(completion.usage.unwrap().prompt_tokens, 42);
    }

    #[test]
    fn test_decode_response_without_choices() {
        let response: ChatResponse =
            serde_json::from_value(json!({"choices": []})).unwrap();
        let err = OpenAiProvider::decode_response(response).unwrap_err();
        assert!(matches!(err, AgentError::Provider(_)));
    }

    #[test]
    fn test_missing_call_id_gets_filled() {
        let call = WireToolCall {
            id: String::new(),
            kind: "function".into(),
            function: WireToolCallFunction {
                name: "get_weather".into(),
                arguments: "{}".into(),
            },
        }
        .into_tool_call();
        assert!(!call.id.is_empty());
    }

    #[test]
    fn test_unparseable_arguments_survive_as_raw_text() {
        let call = WireToolCall {
            id: "call_1".into(),
            kind: "function".into(),
            function: WireToolCallFunction {
                name: "get_weather".into(),
                arguments: "{not json".into(),
            },
        }
        .into_tool_call();
        assert_eq!(call.arguments, Value::String("{not json".into()));
    }
}
