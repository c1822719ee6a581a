//! Tool Dispatch
//!
//! Executes the batch of tool calls carried by one model response.
//! Results come back in input order regardless of completion order, and
//! every call yields a result: lookup misses and execution failures are
//! converted into ordinary result content, never a fault that aborts the
//! batch.

use futures::future::join_all;

use crate::error::AgentError;
use crate::message::{ToolCall, ToolResult};
use crate::tool::ToolRegistry;

/// Execute a batch of tool calls against the registry.
///
/// With `parallel` set, all calls are issued concurrently and the batch is
/// awaited as a whole (fan-out/fan-in); otherwise calls run strictly one at
/// a time in input order.
pub async fn execute_tools(
    calls: &[ToolCall],
    registry: &ToolRegistry,
    parallel: bool,
) -> Vec<ToolResult> {
    if parallel {
        join_all(calls.iter().map(|call| execute_single(call, registry))).await
    } else {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            results.push(execute_single(call, registry).await);
        }
        results
    }
}

/// Execute a single tool call and absorb its failure modes.
async fn execute_single(call: &ToolCall, registry: &ToolRegistry) -> ToolResult {
    tracing::debug!(tool = %call.name, call_id = %call.id, "executing tool call");

    let content = match registry.get(&call.name) {
        None => AgentError::ToolNotFound(call.name.clone()).to_string(),
        Some(tool) => match tool.execute(&call.arguments).await {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(tool = %call.name, error = %e, "tool call failed");
                format!("Error executing tool {}: {}", call.name, e)
            }
        },
    };

    ToolResult {
        call_id: call.id.clone(),
        name: call.name.clone(),
        content,
    }
}
