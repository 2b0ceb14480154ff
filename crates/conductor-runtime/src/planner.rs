//! Planner (C6). Turns a user goal into a stage list by asking a provider
//! for a structured plan; DAG validity (duplicate names, cycles, depth) is
//! the Execution Engine's job (§4.7), not the planner's.

use std::sync::Arc;

use conductor_core::{AgentSpec, ConductorResult, Stage, StageId, StructuredError};
use conductor_llm::Provider;
use serde::Deserialize;

/// One entry the planner provider is asked to emit.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlannedStage {
    name: String,
    prompt_template: String,
    #[serde(default)]
    depends_on: Vec<String>,
    agent_binding: PlannedAgentBinding,
    #[serde(default)]
    approval_required: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlannedAgentBinding {
    name: String,
    system_prompt: String,
    provider_ref: String,
    #[serde(default)]
    tools_enabled: bool,
}

const PLANNER_INSTRUCTIONS: &str = r#"You are a planning assistant for a multi-agent workflow engine. Given a goal, respond with ONLY a JSON array of stage objects, no prose, no markdown fences. Each stage object has the shape:
{"name": "stage-name", "promptTemplate": "...", "dependsOn": ["other-stage-name"], "agentBinding": {"name": "...", "systemPrompt": "...", "providerRef": "...", "toolsEnabled": false}, "approvalRequired": false}
Stage names must match [A-Za-z0-9_-]+ and dependsOn may only reference earlier stage names in the array. An empty goal should produce an empty array."#;

/// Calls a provider to emit a stage list for `goal`. The call itself goes
/// through whatever resilience wrapping the caller's `provider` already
/// carries (§4.6: "the planner is itself a provider call and thus subject
/// to C4").
pub struct Planner {
    provider: Arc<dyn Provider>,
}

impl Planner {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self { provider }
    }

    pub async fn plan(&self, goal: &str) -> ConductorResult<Vec<Stage>> {
        if goal.trim().is_empty() {
            return Ok(Vec::new());
        }

        let prompt = format!("{PLANNER_INSTRUCTIONS}\n\nGoal: {goal}");
        let response = self.provider.generate(&prompt).await?;
        parse_plan(&response)
    }
}

fn parse_plan(response: &str) -> ConductorResult<Vec<Stage>> {
    let trimmed = response.trim();
    let planned: Vec<PlannedStage> = serde_json::from_str(trimmed).map_err(|e| {
        let mut err = StructuredError::config(format!("planner response was not a JSON stage array: {e}"));
        err.code = "INVALID_PLAN".to_string();
        err
    })?;

    let mut stages = Vec::with_capacity(planned.len());
    for entry in planned {
        let agent_binding = AgentSpec::new(entry.agent_binding.name, entry.agent_binding.system_prompt, entry.agent_binding.provider_ref)
            .with_tools_enabled(entry.agent_binding.tools_enabled);

        let stage = Stage::new(entry.name, entry.prompt_template, agent_binding)
            .depends_on(entry.depends_on.into_iter().map(StageId::from))
            .with_approval_required(entry.approval_required);
        stages.push(stage);
    }

    Ok(stages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use conductor_llm::ProviderInfo;

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

    #[tokio::test]
    async fn empty_goal_yields_zero_stages() {
        let planner = Planner::new(Arc::new(ScriptedProvider { response: "[]".into() }));
        let stages = planner.plan("").await.unwrap();
        assert!(stages.is_empty());
    }

    #[tokio::test]
    async fn parses_a_linear_two_stage_plan() {
        let response = r#"[
            {"name": "a", "promptTemplate": "do a", "agentBinding": {"name": "a", "systemPrompt": "{{prompt}}", "providerRef": "openai"}},
            {"name": "b", "promptTemplate": "do b with ${a.output}", "dependsOn": ["a"], "agentBinding": {"name": "b", "systemPrompt": "{{prompt}}", "providerRef": "openai"}}
        ]"#;
        let planner = Planner::new(Arc::new(ScriptedProvider { response: response.into() }));
        let stages = planner.plan("ship the feature").await.unwrap();
        assert_eq!(stages.len(), 2);
        assert_eq!(stages[1].depends_on.len(), 1);
    }

    #[tokio::test]
    async fn malformed_plan_fails_as_invalid_plan() {
        let planner = Planner::new(Arc::new(ScriptedProvider { response: "not json".into() }));
        let err = planner.plan("ship it").await.unwrap_err();
        assert_eq!(err.code, "INVALID_PLAN");
    }
}
