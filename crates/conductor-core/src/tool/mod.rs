// Tool Registry types (C2). The registry and concrete tools live in the
// `conductor-tools` crate; this module defines the trait and wire types
// every tool implementation and every caller share.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StructuredError;

/// Where a tool's implementation lives. Conductor's registry is closed —
/// every tool is a Rust `Tool` impl known at startup.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ToolType {
    #[default]
    Builtin,
    Custom,
}

/// Static description of a tool, returned by `Tool::config`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    pub name: String,
    pub description: String,
    /// JSON Schema describing the tool's `arguments`.
    pub parameters: Value,
    #[serde(default)]
    pub tool_type: ToolType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(default, flatten)]
    pub extra: HashMap<String, Value>,
}

impl ToolConfig {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            tool_type: ToolType::Builtin,
            timeout_secs: None,
            extra: HashMap::new(),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }
}

/// A tool call parsed out of agent output (§3, §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    pub arguments: Value,
}

/// Arguments handed to `Tool::invoke`.
#[derive(Debug, Clone)]
pub struct ToolInput {
    arguments: Value,
}

impl ToolInput {
    pub fn new(arguments: Value) -> Self {
        Self { arguments }
    }

    pub fn raw(&self) -> &Value {
        &self.arguments
    }

    /// Fetches and deserializes a named argument.
    pub fn get_arg<T: serde::de::DeserializeOwned>(&self, name: &str) -> Option<T> {
        self.arguments
            .get(name)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Fetches a required argument, producing a `Validation` error if absent
    /// or malformed.
    pub fn require_arg<T: serde::de::DeserializeOwned>(
        &self,
        name: &str,
    ) -> Result<T, StructuredError> {
        self.get_arg(name)
            .ok_or_else(|| StructuredError::validation(format!("missing or invalid argument: {name}")))
    }
}

/// The outcome of a tool invocation. Tool errors are values, never panics or
/// thrown exceptions — an agent observes `ok: false` and reacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<StructuredError>,
    pub duration_ms: u64,
}

impl ToolResult {
    pub fn success(tool: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            ok: true,
            output: Some(output.into()),
            error: None,
            duration_ms: 0,
        }
    }

    pub fn error(tool: impl Into<String>, error: StructuredError) -> Self {
        Self {
            tool: tool.into(),
            ok: false,
            output: None,
            error: Some(error),
            duration_ms: 0,
        }
    }

    pub fn with_duration_ms(mut self, ms: u64) -> Self {
        self.duration_ms = ms;
        self
    }
}

/// A named, sandboxed side-effect operation. Implementations must be
/// reusable, thread-safe, and must not retain per-call state.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn config(&self) -> ToolConfig;

    fn describe(&self) -> String {
        self.config().description
    }

    async fn invoke(&self, input: ToolInput) -> ToolResult;
}

/// Dispatches tool calls to a closed set of `Tool`s by name.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute_tool(&self, name: &str, input: ToolInput) -> ToolResult;

    fn list_tools(&self) -> Vec<ToolConfig>;

    fn get_tool(&self, name: &str) -> Option<&dyn Tool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_input_extracts_typed_args() {
        let input = ToolInput::new(serde_json::json!({"path": "a.txt", "limit": 10}));
        assert_eq!(input.get_arg::<String>("path"), Some("a.txt".to_string()));
        assert_eq!(input.get_arg::<u64>("limit"), Some(10));
        assert_eq!(input.get_arg::<String>("missing"), None);
    }

    #[test]
    fn require_arg_fails_closed() {
        let input = ToolInput::new(serde_json::json!({}));
        let err = input.require_arg::<String>("path").unwrap_err();
        assert_eq!(err.category, crate::error::ErrorCategory::Validation);
    }

    #[test]
    fn tool_result_error_carries_structured_error() {
        let result = ToolResult::error("shell-exec", StructuredError::permission("denied"));
        assert!(!result.ok);
        assert_eq!(result.error.unwrap().category, crate::error::ErrorCategory::Permission);
    }
}
