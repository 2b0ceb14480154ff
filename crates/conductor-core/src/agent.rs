// Agent Runtime types (C5). The `execute()` pipeline itself is implemented
// in `conductor-runtime`; this module carries the vocabulary every caller
// shares: the `Agent` trait, its execution context, and conversation
// messages.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ConductorResult;
use crate::tool::ToolResult;

/// Core agent trait. An agent owns a prompt template, a provider reference,
/// an optional tool registry, and a memory binding `(workflowId, name)`.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Executes the agent against `ctx`, returning the final text output.
    async fn execute(&self, ctx: &mut AgentContext) -> ConductorResult<ExecutionResult>;

    fn metadata(&self) -> &AgentMetadata;

    async fn init(&mut self) -> ConductorResult<()> {
        Ok(())
    }

    async fn cleanup(&mut self) -> ConductorResult<()> {
        Ok(())
    }

    fn validate(&self) -> ConductorResult<()> {
        Ok(())
    }
}

/// Reference-counted agent handle, shared across concurrently-executing
/// stages bound to the same agent definition.
pub type AgentRef = Arc<dyn Agent>;

/// Execution context passed through one `Agent::execute` call.
#[derive(Debug, Clone)]
pub struct AgentContext {
    pub input: String,
    pub messages: Vec<Message>,
    pub state: HashMap<String, serde_json::Value>,
    pub tool_results: Vec<ToolResult>,
    pub metadata: ExecutionMetadata,
}

impl AgentContext {
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            messages: Vec::new(),
            state: HashMap::new(),
            tool_results: Vec::new(),
            metadata: ExecutionMetadata::default(),
        }
    }

    pub fn add_message(&mut self, role: MessageRole, content: impl Into<String>) {
        self.messages.push(Message {
            role,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
        });
    }

    pub fn get_state<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.state.get(key).and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn set_state<T: Serialize>(&mut self, key: impl Into<String>, value: T) -> ConductorResult<()> {
        let json_value = serde_json::to_value(value)?;
        self.state.insert(key.into(), json_value);
        Ok(())
    }
}

/// A single turn in a conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<crate::tool::ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
    Tool,
}

/// The outcome of one `Agent::execute` call (§4.5 step 5).
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub success: bool,
    pub output: String,
    pub duration_ms: u64,
    pub error: Option<crate::error::StructuredError>,
}

impl ExecutionResult {
    pub fn ok(output: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            success: true,
            output: output.into(),
            duration_ms,
            error: None,
        }
    }

    pub fn failed(error: crate::error::StructuredError, duration_ms: u64) -> Self {
        Self {
            success: false,
            output: String::new(),
            duration_ms,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionMetadata {
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub execution_time_ms: u64,
    pub tool_calls: usize,
    pub model: Option<String>,
}

/// Descriptive metadata about an agent definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMetadata {
    pub name: String,
    pub description: String,
    pub version: String,
    pub capabilities: Vec<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_context_new_starts_empty() {
        let ctx = AgentContext::new("hello");
        assert_eq!(ctx.input, "hello");
        assert!(ctx.messages.is_empty());
        assert!(ctx.tool_results.is_empty());
    }

    #[test]
    fn agent_context_add_message_appends_in_order() {
        let mut ctx = AgentContext::new("test");
        ctx.add_message(MessageRole::User, "hi");
        ctx.add_message(MessageRole::Assistant, "hello");
        assert_eq!(ctx.messages.len(), 2);
        assert_eq!(ctx.messages[0].role, MessageRole::User);
        assert_eq!(ctx.messages[1].role, MessageRole::Assistant);
    }

    #[test]
    fn agent_context_state_roundtrips() {
        let mut ctx = AgentContext::new("test");
        ctx.set_state("count", 42i32).unwrap();
        assert_eq!(ctx.get_state::<i32>("count"), Some(42));
        assert_eq!(ctx.get_state::<i32>("missing"), None);
    }

    #[test]
    fn execution_result_failed_carries_error() {
        let result = ExecutionResult::failed(crate::error::StructuredError::timeout("T", "slow"), 10);
        assert!(!result.success);
        assert!(result.error.is_some());
    }
}
