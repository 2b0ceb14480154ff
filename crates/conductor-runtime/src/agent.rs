//! Agent Runtime (C5). `DefaultAgent` is the one `Agent` implementation the
//! rest of Conductor constructs: it owns a prompt template, a
//! resilience-wrapped provider reference, an optional tool registry, and a
//! memory binding to one `(workflowId, name)` stream.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use conductor_core::{
    render, Agent, AgentContext, AgentMetadata, ConductorResult, ExecutionResult,
    MemoryEntryKind, StructuredError, TemplateCache, ToolCall, ToolExecutor, ToolInput,
};
use conductor_llm::Provider;
use conductor_memory::Memory;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

/// Extracts a tool call per the tightened baseline contract (§6): the
/// entire response is a single JSON object `{"tool": ..., "arguments": ...}`,
/// or it contains exactly one fenced code block of that shape. Anything else
/// (including more than one fenced block) is treated as final text.
pub fn parse_tool_call(text: &str) -> Option<ToolCall> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if let Some(call) = extract_tool_call(&value) {
            return Some(call);
        }
    }

    let fence = Regex::new(r"```(?:json)?\s*\n?([\s\S]*?)\n?```").unwrap();
    let mut blocks = fence.captures_iter(trimmed);
    let first = blocks.next();
    if blocks.next().is_some() {
        return None;
    }
    let captured = first?.get(1)?.as_str();
    let value: Value = serde_json::from_str(captured.trim()).ok()?;
    extract_tool_call(&value)
}

fn extract_tool_call(value: &Value) -> Option<ToolCall> {
    let obj = value.as_object()?;
    let tool = obj.get("tool")?.as_str()?.to_string();
    let arguments = obj.get("arguments")?.clone();
    Some(ToolCall { tool, arguments })
}

/// The default `Agent`: renders its prompt template, calls its provider
/// (already wrapped in the full resilience stack by the caller), optionally
/// dispatches a single tool call, and appends its turns to memory.
pub struct DefaultAgent {
    metadata: AgentMetadata,
    workflow_id: String,
    prompt_template: String,
    provider: Arc<dyn Provider>,
    tools: Option<Arc<dyn ToolExecutor>>,
    memory: Arc<dyn Memory>,
    memory_limit: usize,
    template_cache: Arc<TemplateCache>,
    tool_timeout: Duration,
}

impl DefaultAgent {
    pub fn new(
        name: impl Into<String>,
        workflow_id: impl Into<String>,
        prompt_template: impl Into<String>,
        provider: Arc<dyn Provider>,
        memory: Arc<dyn Memory>,
    ) -> Self {
        let name = name.into();
        Self {
            metadata: AgentMetadata {
                name: name.clone(),
                description: String::new(),
                version: "1".to_string(),
                capabilities: Vec::new(),
                extra: HashMap::new(),
            },
            workflow_id: workflow_id.into(),
            prompt_template: prompt_template.into(),
            provider,
            tools: None,
            memory,
            memory_limit: conductor_core::DEFAULT_MEMORY_LIMIT,
            template_cache: Arc::new(TemplateCache::default()),
            tool_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_tools(mut self, tools: Arc<dyn ToolExecutor>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_memory_limit(mut self, limit: usize) -> Self {
        self.memory_limit = limit;
        self
    }

    pub fn with_template_cache(mut self, cache: Arc<TemplateCache>) -> Self {
        self.template_cache = cache;
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    fn name(&self) -> &str {
        &self.metadata.name
    }

    async fn render_prompt(&self, ctx: &AgentContext) -> ConductorResult<String> {
        let history = self
            .memory
            .read(&self.workflow_id, self.name(), Some(self.memory_limit))
            .await?;
        let memory_text = history
            .iter()
            .map(|entry| format!("[{:?}] {}", entry.kind, entry.content))
            .collect::<Vec<_>>()
            .join("\n");

        let mut vars: HashMap<String, String> = HashMap::new();
        vars.insert("prompt".to_string(), ctx.input.clone());
        vars.insert("memory".to_string(), memory_text);
        vars.insert("timestamp".to_string(), Utc::now().to_rfc3339());
        vars.insert("stage_name".to_string(), self.name().to_string());
        vars.insert("workflow_name".to_string(), self.workflow_id.clone());
        for (key, value) in &ctx.state {
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            vars.insert(key.clone(), rendered);
        }

        Ok(self.template_cache.render(&self.prompt_template, &vars))
    }
}

#[async_trait]
impl Agent for DefaultAgent {
    async fn execute(&self, ctx: &mut AgentContext) -> ConductorResult<ExecutionResult> {
        let started = Instant::now();
        let prompt = self.render_prompt(ctx).await?;

        let response = match self.provider.generate(&prompt).await {
            Ok(text) => text,
            Err(err) => {
                let _ = self
                    .memory
                    .append(&self.workflow_id, self.name(), MemoryEntryKind::System, &err.message)
                    .await;
                return Ok(ExecutionResult::failed(err, started.elapsed().as_millis() as u64));
            }
        };

        let tools_enabled = self.tools.is_some();
        let mut final_output = response.clone();

        if tools_enabled {
            if let Some(call) = parse_tool_call(&response) {
                let tools = self.tools.as_ref().unwrap();
                let call_json = serde_json::to_string(&call).unwrap_or_default();
                let _ = self
                    .memory
                    .append(&self.workflow_id, self.name(), MemoryEntryKind::ToolCall, &call_json)
                    .await;

                let input = ToolInput::new(call.arguments.clone());
                let result = match tokio::time::timeout(self.tool_timeout, tools.execute_tool(&call.tool, input)).await {
                    Ok(result) => result,
                    Err(_) => conductor_core::ToolResult::error(
                        &call.tool,
                        StructuredError::timeout("TOOL_TIMEOUT", format!("tool '{}' exceeded its timeout", call.tool)),
                    ),
                };

                let result_json = serde_json::to_string(&result).unwrap_or_default();
                let _ = self
                    .memory
                    .append(&self.workflow_id, self.name(), MemoryEntryKind::ToolResult, &result_json)
                    .await;

                let unknown_tool = !result.ok
                    && result
                        .error
                        .as_ref()
                        .is_some_and(|e| e.category == conductor_core::ErrorCategory::NotFound);

                if unknown_tool {
                    warn!(tool = %call.tool, "agent requested an unregistered tool");
                    final_output = response;
                } else {
                    let tool_output = result.output.clone().unwrap_or_default();
                    ctx.tool_results.push(result);

                    if self.prompt_template.contains("{{tool_result}}") {
                        let mut follow_up_ctx = ctx.clone();
                        follow_up_ctx.state.insert("tool_result".to_string(), Value::String(tool_output.clone()));
                        let follow_up_prompt = self.render_prompt(&follow_up_ctx).await?;
                        match self.provider.generate(&follow_up_prompt).await {
                            Ok(text) => final_output = text,
                            Err(err) => {
                                return Ok(ExecutionResult::failed(err, started.elapsed().as_millis() as u64));
                            }
                        }
                    } else {
                        final_output = tool_output;
                    }
                }
            }
        }

        debug!(agent = %self.name(), "agent turn complete");
        // The turn itself is recorded by the caller together with the
        // stage's artifact write, as one transaction (see
        // `ExecutionEngine::run_single_stage`'s `append_and_put_artifact`
        // call) rather than here.
        Ok(ExecutionResult::ok(final_output, started.elapsed().as_millis() as u64))
    }

    fn metadata(&self) -> &AgentMetadata {
        &self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_llm::ProviderInfo;
    use conductor_memory::SimpleMemory;

    struct EchoProvider;

    #[async_trait]
    impl Provider for EchoProvider {
        async fn generate(&self, prompt: &str) -> ConductorResult<String> {
            Ok(format!("echo:{prompt}"))
        }

        fn info(&self) -> ProviderInfo {
            ProviderInfo { name: "echo".into(), model: "echo".into() }
        }
    }

    #[test]
    fn parse_tool_call_reads_whole_response_json() {
        let text = r#"{"tool": "shell-exec", "arguments": {"command": "ls"}}"#;
        let call = parse_tool_call(text).unwrap();
        assert_eq!(call.tool, "shell-exec");
    }

    #[test]
    fn parse_tool_call_reads_single_fenced_block() {
        let text = "here you go:\n```json\n{\"tool\": \"file-read\", \"arguments\": {\"path\": \"a.txt\"}}\n```\n";
        let call = parse_tool_call(text).unwrap();
        assert_eq!(call.tool, "file-read");
    }

    #[test]
    fn parse_tool_call_rejects_plain_text() {
        assert!(parse_tool_call("just a regular answer").is_none());
    }

    #[test]
    fn parse_tool_call_rejects_multiple_fenced_blocks() {
        let text = "```json\n{\"tool\":\"a\",\"arguments\":{}}\n```\n```json\n{\"tool\":\"b\",\"arguments\":{}}\n```";
        assert!(parse_tool_call(text).is_none());
    }

    #[tokio::test]
    async fn execute_returns_output_and_leaves_the_turn_append_to_the_caller() {
        let memory: Arc<dyn Memory> = Arc::new(SimpleMemory::in_memory());
        let agent = DefaultAgent::new("writer", "wf-1", "{{prompt}}", Arc::new(EchoProvider), memory.clone());

        let mut ctx = AgentContext::new("hello");
        let result = agent.execute(&mut ctx).await.unwrap();
        assert!(result.success);
        assert_eq!(result.output, "echo:hello");

        // The agent turn itself is recorded by the execution engine
        // together with the stage's artifact write (see engine.rs), not by
        // the agent, so a standalone `execute()` call appends nothing here.
        let entries = memory.read("wf-1", "writer", None).await.unwrap();
        assert!(entries.is_empty());
    }
}
