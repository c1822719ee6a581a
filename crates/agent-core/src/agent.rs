//! Session Engine
//!
//! The turn loop that ties history, provider, and dispatcher together:
//! append the user input, call the completion endpoint with the truncated
//! transcript and tool declarations, and while the response requests tool
//! calls, dispatch them and feed the results back before the next round.
//!
//! One engine owns one history; no two completion requests for the same
//! session are ever in flight concurrently.

use std::sync::Arc;

use crate::dispatch::execute_tools;
use crate::error::{AgentError, Result};
use crate::history::History;
use crate::message::Message;
use crate::provider::{CompletionRequest, LlmProvider, ModelConfig};
use crate::tool::{Tool, ToolRegistry};

/// The main Agent struct
pub struct Agent {
    name: String,
    provider: Arc<dyn LlmProvider>,
    tools: Vec<Arc<dyn Tool>>,
    config: ModelConfig,
    history: History,
}

impl Agent {
    /// Create a new agent
    pub fn new(
        name: impl Into<String>,
        system: impl Into<String>,
        provider: Arc<dyn LlmProvider>,
        tools: Vec<Arc<dyn Tool>>,
        config: ModelConfig,
    ) -> Self {
        let history = History::new(system, config.context_window_tokens);
        Self {
            name: name.into(),
            provider,
            tools,
            config,
            history,
        }
    }

    /// Process one user request to completion
    pub async fn run(&mut self, input: &str) -> Result<String> {
        self.run_with_tools(input, Vec::new()).await
    }

    /// Process one user request with extra tools available for this
    /// invocation only; afterwards the tool set reverts to the statically
    /// configured one.
    pub async fn run_with_tools(
        &mut self,
        input: &str,
        extra_tools: Vec<Arc<dyn Tool>>,
    ) -> Result<String> {
        tracing::info!(agent = %self.name, input = %input, "received user input");

        let mut registry = ToolRegistry::new();
        for tool in self.tools.iter().chain(extra_tools.iter()) {
            registry.register_arc(Arc::clone(tool));
        }
        let declarations = registry.declarations();

        self.history.push(Message::user(input), None);

        for turn in 0..self.config.max_turns {
            self.history.truncate();

            let request = CompletionRequest {
                model: self.config.model.clone(),
                messages: self.history.format_for_completion(),
                max_tokens: self.config.max_tokens,
                temperature: self.config.temperature,
                tools: declarations.clone(),
            };

            let completion = self.provider.complete(&request).await?;

            if !completion.has_tool_calls() {
                self.history.push(
                    Message::assistant(completion.content.clone()),
                    completion.usage.as_ref(),
                );
                tracing::info!(agent = %self.name, turns = turn + 1, "produced final answer");
                return Ok(completion.content);
            }

            tracing::debug!(
                agent = %self.name,
                count = completion.tool_calls.len(),
                "response requested tool calls"
            );

            // The assistant message keeps its tool-call metadata so the next
            // request echoes it to the endpoint verbatim; endpoints validate
            // that each tool result references a call id from the
            // immediately preceding assistant turn.
            self.history.push(
                Message::assistant_with_calls(
                    completion.content.clone(),
                    completion.tool_calls.clone(),
                ),
                completion.usage.as_ref(),
            );

            let results =
                execute_tools(&completion.tool_calls, &registry, self.config.parallel_tools).await;
            for result in results {
                self.history.push(result.into(), None);
            }
        }

        tracing::warn!(agent = %self.name, max_turns = self.config.max_turns, "turn cap reached");
        Err(AgentError::MaxTurns(self.config.max_turns))
    }

    /// Agent name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Conversation history
    pub fn history(&self) -> &History {
        &self.history
    }

    /// Model configuration
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }
}

/// Builder for Agent configuration
pub struct AgentBuilder {
    name: String,
    system: String,
    provider: Option<Arc<dyn LlmProvider>>,
    tools: Vec<Arc<dyn Tool>>,
    config: ModelConfig,
}

impl AgentBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            system: "You are a helpful assistant".into(),
            provider: None,
            tools: Vec::new(),
            config: ModelConfig::default(),
        }
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = system.into();
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn tool<T: Tool + 'static>(mut self, tool: T) -> Self {
        self.tools.push(Arc::new(tool));
        self
    }

    pub fn config(mut self, config: ModelConfig) -> Self {
        self.config = config;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn max_turns(mut self, max: usize) -> Self {
        self.config.max_turns = max;
        self
    }

    pub fn build(self) -> Result<Agent> {
        let provider = self
            .provider
            .ok_or_else(|| AgentError::Config("Provider is required".into()))?;

        Ok(Agent::new(
            self.name,
            self.system,
            provider,
            self.tools,
            self.config,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Role, TokenUsage, ToolCall};
    use crate::provider::{Completion, FinishReason};
    use crate::tool::GetWeatherTool;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Provider that replays a scripted sequence of completions.
    struct ScriptedProvider {
        script: Mutex<Vec<Completion>>,
        requests_seen: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedProvider {
        fn new(mut script: Vec<Completion>) -> Self {
            script.reverse();
            Self {
                script: Mutex::new(script),
                requests_seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
            self.requests_seen.lock().unwrap().push(request.clone());
            self.script
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| AgentError::Provider("script exhausted".into()))
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }
    }

    fn completion(content: &str, tool_calls: Vec<ToolCall>, prompt_tokens: u32) -> Completion {
        let finish_reason = if tool_calls.is_empty() {
            FinishReason::Stop
        } else {
            FinishReason::ToolCalls
        };
        Completion {
            content: content.into(),
            tool_calls,
            model: "test-model".into(),
            usage: Some(TokenUsage {
                prompt_tokens,
                completion_tokens: 10,
                total_tokens: prompt_tokens + 10,
            }),
            finish_reason: Some(finish_reason),
        }
    }

    fn weather_call(id: &str, city: &str) -> ToolCall {
        ToolCall {
            id: id.into(),
            name: "get_weather".into(),
            arguments: json!({"city": city}),
        }
    }

    fn agent_with(provider: Arc<ScriptedProvider>) -> Agent {
        AgentBuilder::new("test-agent")
            .system("You are a helpful assistant")
            .provider(provider)
            .tool(GetWeatherTool)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_plain_answer_round_trip() {
        let provider = Arc::new(ScriptedProvider::new(vec![completion(
            "Hello!",
            Vec::new(),
            50,
        )]));
        let mut agent = agent_with(Arc::clone(&provider));

        let answer = agent.run("Hi").await.unwrap();
        assert_eq!(answer, "Hello!");

        // user + final assistant
        assert_eq!(agent.history().len(), 2);

        // The request carried the tool declarations and led with system.
        let requests = provider.requests_seen.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].messages[0].role(), Role::System);
        assert_eq!(requests[0].tools.len(), 1);
    }

    #[tokio::test]
    async fn test_tool_round_appends_results_in_order() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            completion(
                "",
                vec![weather_call("c1", "Tokyo"), weather_call("c2", "Paris")],
                60,
            ),
            completion("Sunny in both.", Vec::new(), 120),
        ]));
        let mut agent = agent_with(Arc::clone(&provider));

        let answer = agent.run("Weather in Tokyo and Paris?").await.unwrap();
        assert_eq!(answer, "Sunny in both.");

        // user, assistant(tool calls), tool x2, final assistant
        let messages = agent.history().messages();
        assert_eq!(messages.len(), 5);
        assert_eq!(messages[1].role(), Role::Assistant);
        assert_eq!(messages[2].role(), Role::Tool);
        assert_eq!(messages[2].content(), "The weather in Tokyo is sunny");
        assert_eq!(messages[3].role(), Role::Tool);
        assert_eq!(messages[3].content(), "The weather in Paris is sunny");
        assert_eq!(messages[4].role(), Role::Assistant);

        // Both tool messages were present in the second completion request.
        let requests = provider.requests_seen.lock().unwrap();
        assert_eq!(requests.len(), 2);
        let tool_messages = requests[1]
            .messages
            .iter()
            .filter(|m| m.role() == Role::Tool)
            .count();
        assert_eq!(tool_messages, 2);
    }

    #[tokio::test]
    async fn test_turn_cap_gives_up() {
        // Every response requests another tool call.
        let script: Vec<Completion> = (0..4)
            .map(|n| completion("", vec![weather_call(&format!("c{n}"), "Tokyo")], 50))
            .collect();
        let provider = Arc::new(ScriptedProvider::new(script));
        let mut agent = AgentBuilder::new("looping-agent")
            .provider(provider)
            .tool(GetWeatherTool)
            .max_turns(3)
            .build()
            .unwrap();

        let err = agent.run("Weather?").await.unwrap_err();
        assert!(matches!(err, AgentError::MaxTurns(3)));
    }

    #[tokio::test]
    async fn test_extra_tools_are_invocation_scoped() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            completion("First.", Vec::new(), 40),
            completion("Second.", Vec::new(), 80),
        ]));
        let mut agent = AgentBuilder::new("scoped-agent")
            .provider(Arc::clone(&provider) as Arc<dyn LlmProvider>)
            .build()
            .unwrap();

        let extra: Vec<Arc<dyn Tool>> = vec![Arc::new(GetWeatherTool)];
        agent.run_with_tools("Hi", extra).await.unwrap();
        agent.run("Hi again").await.unwrap();

        let requests = provider.requests_seen.lock().unwrap();
        assert_eq!(requests[0].tools.len(), 1);
        assert!(requests[1].tools.is_empty());
    }
}
