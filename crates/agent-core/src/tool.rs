//! Tool System
//!
//! Extensible tool framework for agent capabilities. Tools are registered
//! at runtime and invoked by the turn loop through the dispatcher.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{AgentError, Result};

/// Tool definition schema (for LLM function calling)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Unique tool identifier
    pub name: String,

    /// Human-readable description (shown to LLM)
    pub description: String,

    /// JSON-schema description of the arguments
    pub parameters: Value,
}

impl ToolSchema {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// The literal declaration payload the completion endpoint's
    /// function-calling feature consumes.
    pub fn to_declaration(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// Tool trait - implement to add new capabilities
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool's schema for LLM function calling
    fn schema(&self) -> ToolSchema;

    /// Execute the tool with the given arguments
    async fn execute(&self, arguments: &Value) -> Result<String>;
}

/// Registry for available tools
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a new tool (last registration wins on a name collision)
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.register_arc(Arc::new(tool));
    }

    /// Register a shared tool
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let schema = tool.schema();
        self.tools.insert(schema.name, tool);
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Get all tool schemas
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools.values().map(|t| t.schema()).collect()
    }

    /// Declaration payloads for the completion request
    pub fn declarations(&self) -> Vec<Value> {
        self.tools.values().map(|t| t.schema().to_declaration()).collect()
    }

    /// Get tool names
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

// ============================================================================
// Built-in Tools
// ============================================================================

/// Weather tool - canned lookup for demos and tests
pub struct GetWeatherTool;

#[async_trait]
impl Tool for GetWeatherTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "get_weather",
            "Get the weather information for a given city",
            json!({
                "type": "object",
                "properties": {
                    "city": {
                        "type": "string",
                        "description": "The city to get the weather information for"
                    }
                },
                "required": ["city"],
            }),
        )
    }

    async fn execute(&self, arguments: &Value) -> Result<String> {
        let city = arguments
            .get("city")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AgentError::ToolValidation("Missing required parameter: city".into()))?;

        Ok(format!("The weather in {} is sunny", city))
    }
}

/// DateTime tool - returns current time
pub struct DateTimeTool;

#[async_trait]
impl Tool for DateTimeTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "datetime",
            "Get the current date and time",
            json!({
                "type": "object",
                "properties": {
                    "format": {
                        "type": "string",
                        "description": "Output format: 'iso', 'human', or 'unix'",
                        "enum": ["iso", "human", "unix"],
                    }
                },
            }),
        )
    }

    async fn execute(&self, arguments: &Value) -> Result<String> {
        let format = arguments
            .get("format")
            .and_then(|v| v.as_str())
            .unwrap_or("human");

        let now = chrono::Utc::now();

        let output = match format {
            "iso" => now.to_rfc3339(),
            "unix" => now.timestamp().to_string(),
            _ => now.format("%A, %B %d, %Y at %H:%M:%S UTC").to_string(),
        };

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_weather_tool() {
        let output = GetWeatherTool
            .execute(&json!({"city": "Tokyo"}))
            .await
            .unwrap();
        assert_eq!(output, "The weather in Tokyo is sunny");

        let err = GetWeatherTool.execute(&json!({})).await.unwrap_err();
        assert!(matches!(err, AgentError::ToolValidation(_)));
    }

    #[test]
    fn test_declaration_shape() {
        let declaration = GetWeatherTool.schema().to_declaration();
        assert_eq!(declaration["type"], "function");
        assert_eq!(declaration["function"]["name"], "get_weather");
        assert_eq!(
            declaration["function"]["parameters"]["required"][0],
            "city"
        );
    }

    #[test]
    fn test_tool_registry() {
        let mut registry = ToolRegistry::new();
        registry.register(GetWeatherTool);
        registry.register(DateTimeTool);

        assert_eq!(registry.len(), 2);
        assert!(registry.get("get_weather").is_some());
        assert!(registry.get("datetime").is_some());
        assert!(registry.get("unknown").is_none());
        assert_eq!(registry.declarations().len(), 2);
    }
}
