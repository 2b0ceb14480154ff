//! Orchestrator Facade (C8). The one entry point applications construct:
//! register providers and tools once, then call [`Orchestrator::plan_and_execute`]
//! or [`Orchestrator::run_workflow`] per workflow run.

use std::collections::HashMap;
use std::sync::Arc;

use conductor_core::{
    AgentRef, ConductorConfig, ConductorResult, Stage, StageResult, StructuredError, TemplateCache,
    ToolExecutor, WorkflowId,
};
use conductor_llm::{CircuitBreakerRegistry, Provider, RateLimiterRegistry, ResilientProvider};
use conductor_memory::Memory;

use crate::agent::DefaultAgent;
use crate::engine::{ApprovalSink, AutoApproveSink, ExecutionEngine};
use crate::planner::Planner;

fn unknown_provider(name: &str) -> StructuredError {
    let mut err = StructuredError::config(format!("no provider registered under '{name}'"));
    err.code = "UNKNOWN_PROVIDER".to_string();
    err
}

/// Owns the shared Memory Store, Tool Registry, and provider pool behind
/// one or more workflow runs. Stateless across runs beyond the process-wide
/// circuit-breaker/rate-limiter registries every `ResilientProvider` it
/// mints shares (§3, §9).
pub struct Orchestrator {
    config: ConductorConfig,
    memory: Arc<dyn Memory>,
    tools: Option<Arc<dyn ToolExecutor>>,
    approval_sink: Arc<dyn ApprovalSink>,
    providers: HashMap<String, Arc<dyn Provider>>,
    breaker_registry: CircuitBreakerRegistry,
    rate_limiter_registry: RateLimiterRegistry,
    template_cache: Arc<TemplateCache>,
}

impl Orchestrator {
    pub fn new(config: ConductorConfig, memory: Arc<dyn Memory>) -> Self {
        let template_cache = Arc::new(TemplateCache::new(
            config.template.enabled,
            config.template.max_size,
            std::time::Duration::from_secs(config.template.ttl_secs),
        ));
        Self {
            config,
            memory,
            tools: None,
            approval_sink: Arc::new(AutoApproveSink),
            providers: HashMap::new(),
            breaker_registry: CircuitBreakerRegistry::new(),
            rate_limiter_registry: RateLimiterRegistry::new(),
            template_cache,
        }
    }

    pub fn with_provider(mut self, name: impl Into<String>, provider: Arc<dyn Provider>) -> Self {
        self.providers.insert(name.into(), provider);
        self
    }

    pub fn with_tools(mut self, tools: Arc<dyn ToolExecutor>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_approval_sink(mut self, sink: Arc<dyn ApprovalSink>) -> Self {
        self.approval_sink = sink;
        self
    }

    fn resilient_provider(&self, provider_ref: &str) -> ConductorResult<Arc<dyn Provider>> {
        let inner = self.providers.get(provider_ref).cloned().ok_or_else(|| unknown_provider(provider_ref))?;
        Ok(Arc::new(ResilientProvider::new(
            inner,
            "generate",
            &self.config,
            &self.breaker_registry,
            &self.rate_limiter_registry,
        )))
    }

    fn build_agents(&self, workflow_id: &WorkflowId, stages: &[Stage]) -> ConductorResult<HashMap<String, AgentRef>> {
        let mut agents: HashMap<String, AgentRef> = HashMap::new();
        for stage in stages {
            let binding = &stage.agent_binding;
            if agents.contains_key(&binding.name) {
                continue;
            }
            let provider = self.resilient_provider(&binding.provider_ref)?;
            let mut agent = DefaultAgent::new(
                binding.name.clone(),
                workflow_id.0.clone(),
                binding.system_prompt.clone(),
                provider,
                self.memory.clone(),
            )
            .with_memory_limit(self.config.memory.default_limit)
            .with_template_cache(self.template_cache.clone());

            if binding.tools_enabled {
                if let Some(tools) = &self.tools {
                    agent = agent.with_tools(tools.clone());
                }
            }

            agents.insert(binding.name.clone(), Arc::new(agent));
        }
        Ok(agents)
    }

    /// Runs an already-planned stage DAG to completion.
    pub async fn run_workflow(&self, workflow_id: impl Into<WorkflowId>, stages: Vec<Stage>) -> ConductorResult<Vec<StageResult>> {
        let workflow_id = workflow_id.into();
        let agents = self.build_agents(&workflow_id, &stages)?;
        let engine = Arc::new(ExecutionEngine::new(
            agents,
            self.memory.clone(),
            self.approval_sink.clone(),
            self.config.clone(),
        ));
        engine.run(&workflow_id, stages).await
    }

    /// Asks `planner_provider_ref` to turn `goal` into a stage list, then
    /// runs it. The planner call goes through the same resilience stack as
    /// any worker provider call (§4.6).
    pub async fn plan_and_execute(
        &self,
        workflow_id: impl Into<WorkflowId>,
        goal: &str,
        planner_provider_ref: &str,
    ) -> ConductorResult<Vec<StageResult>> {
        let provider = self.resilient_provider(planner_provider_ref)?;
        let planner = Planner::new(provider);
        let stages = planner.plan(goal).await?;
        self.run_workflow(workflow_id, stages).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use conductor_core::{AgentSpec, Stage, StageId, StageStatus};
    use conductor_llm::ProviderInfo;
    use conductor_memory::SimpleMemory;

    struct ScriptedProvider {
        response: String,
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        async fn generate(&self, _prompt: &str) -> ConductorResult<String> {
            Ok(self.response.clone())
        }

        fn info(&self) -> ProviderInfo {
            ProviderInfo { name: "scripted".into(), model: "scripted".into() }
        }
    }

    fn orchestrator_with(name: &str, response: &str) -> Orchestrator {
        let memory: Arc<dyn Memory> = Arc::new(SimpleMemory::in_memory());
        Orchestrator::new(ConductorConfig::default(), memory)
            .with_provider(name, Arc::new(ScriptedProvider { response: response.to_string() }))
    }

    #[tokio::test]
    async fn run_workflow_executes_a_single_stage() {
        let orchestrator = orchestrator_with("worker", "done");
        let binding = AgentSpec::new("writer", "{{prompt}}", "worker");
        let stage = Stage::new("only", "write something", binding);

        let results = orchestrator.run_workflow("wf-1", vec![stage]).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, StageStatus::Succeeded);
        assert_eq!(results[0].output.as_deref(), Some("done"));
    }

    #[tokio::test]
    async fn run_workflow_fails_closed_on_unbound_provider() {
        let orchestrator = orchestrator_with("worker", "done");
        let binding = AgentSpec::new("writer", "{{prompt}}", "missing-provider");
        let stage = Stage::new("only", "write something", binding);

        let err = orchestrator.run_workflow("wf-1", vec![stage]).await.unwrap_err();
        assert_eq!(err.code, "UNKNOWN_PROVIDER");
    }

    #[tokio::test]
    async fn plan_and_execute_drives_a_planner_then_runs_its_stages() {
        let memory: Arc<dyn Memory> = Arc::new(SimpleMemory::in_memory());
        let plan_response = r#"[{"name": "a", "promptTemplate": "go", "agentBinding": {"name": "a", "systemPrompt": "{{prompt}}", "providerRef": "worker"}}]"#;
        let orchestrator = Orchestrator::new(ConductorConfig::default(), memory)
            .with_provider("planner", Arc::new(ScriptedProvider { response: plan_response.to_string() }))
            .with_provider("worker", Arc::new(ScriptedProvider { response: "stage output".to_string() }));

        let results = orchestrator.plan_and_execute("wf-2", "ship it", "planner").await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].stage_id, StageId::from("a"));
        assert_eq!(results[0].output.as_deref(), Some("stage output"));
    }
}
