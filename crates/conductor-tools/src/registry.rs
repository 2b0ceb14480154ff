//! Tool Registry (C2). A name-keyed map of `Tool` instances; insertion order
//! is irrelevant to lookup per spec §4.2.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use conductor_core::{StructuredError, Tool, ToolConfig, ToolExecutor, ToolInput, ToolResult};
use tracing::{debug, warn};

/// Name-keyed registry of tool instances.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool, overwriting any prior registration under the same
    /// name.
    pub fn register<T: Tool + 'static>(&mut self, tool: T) -> &mut Self {
        let name = tool.name().to_string();
        debug!(tool = %name, "registering tool");
        self.tools.insert(name, Arc::new(tool));
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn list_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn into_executor(self) -> BuiltinToolExecutor {
        BuiltinToolExecutor { tools: self.tools }
    }

    pub fn as_executor(&self) -> BuiltinToolExecutor {
        BuiltinToolExecutor {
            tools: self.tools.clone(),
        }
    }
}

/// Dispatches by name over a fixed `ToolRegistry` snapshot.
pub struct BuiltinToolExecutor {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl BuiltinToolExecutor {
    pub fn new(registry: ToolRegistry) -> Self {
        registry.into_executor()
    }

    pub fn from_tools(tools: Vec<Arc<dyn Tool>>) -> Self {
        let mut map = HashMap::new();
        for tool in tools {
            map.insert(tool.name().to_string(), tool);
        }
        Self { tools: map }
    }
}

#[async_trait]
impl ToolExecutor for BuiltinToolExecutor {
    async fn execute_tool(&self, name: &str, input: ToolInput) -> ToolResult {
        let Some(tool) = self.tools.get(name) else {
            warn!(tool = %name, "unknown tool requested");
            return ToolResult::error(name, StructuredError::not_found(format!("unknown tool: {name}")));
        };

        debug!(tool = %name, "invoking tool");
        let start = std::time::Instant::now();
        let result = tool.invoke(input).await;
        let elapsed = start.elapsed().as_millis() as u64;
        result.with_duration_ms(elapsed)
    }

    fn list_tools(&self) -> Vec<ToolConfig> {
        self.tools.values().map(|t| t.config()).collect()
    }

    fn get_tool(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }
}

/// Combines multiple executors, trying each in order. Useful for an embedder
/// that layers a custom executor in front of the builtin registry.
#[derive(Default)]
pub struct CompositeToolExecutor {
    executors: Vec<Box<dyn ToolExecutor>>,
}

impl CompositeToolExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_executor<E: ToolExecutor + 'static>(mut self, executor: E) -> Self {
        self.executors.push(Box::new(executor));
        self
    }
}

#[async_trait]
impl ToolExecutor for CompositeToolExecutor {
    async fn execute_tool(&self, name: &str, input: ToolInput) -> ToolResult {
        for executor in &self.executors {
            if executor.get_tool(name).is_some() {
                return executor.execute_tool(name, input).await;
            }
        }
        ToolResult::error(name, StructuredError::not_found(format!("unknown tool: {name}")))
    }

    fn list_tools(&self) -> Vec<ToolConfig> {
        let mut seen = std::collections::HashSet::new();
        let mut tools = Vec::new();
        for executor in &self.executors {
            for config in executor.list_tools() {
                if seen.insert(config.name.clone()) {
                    tools.push(config);
                }
            }
        }
        tools
    }

    fn get_tool(&self, name: &str) -> Option<&dyn Tool> {
        self.executors.iter().find_map(|e| e.get_tool(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn config(&self) -> ToolConfig {
            ToolConfig::new("echo", "echoes its input", json!({"type": "object"}))
        }

        async fn invoke(&self, input: ToolInput) -> ToolResult {
            ToolResult::success("echo", input.raw().to_string())
        }
    }

    #[tokio::test]
    async fn registry_dispatches_to_registered_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        assert_eq!(registry.len(), 1);

        let executor = registry.into_executor();
        let result = executor.execute_tool("echo", ToolInput::new(json!({"x": 1}))).await;
        assert!(result.ok);
    }

    #[tokio::test]
    async fn unknown_tool_returns_not_found() {
        let executor = ToolRegistry::new().into_executor();
        let result = executor.execute_tool("missing", ToolInput::new(json!({}))).await;
        assert!(!result.ok);
        assert_eq!(
            result.error.unwrap().category,
            conductor_core::ErrorCategory::NotFound
        );
    }

    #[tokio::test]
    async fn composite_executor_tries_each_in_order() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        let composite = CompositeToolExecutor::new().add_executor(registry.into_executor());

        let result = composite.execute_tool("echo", ToolInput::new(json!({}))).await;
        assert!(result.ok);
        assert_eq!(composite.list_tools().len(), 1);
    }
}
