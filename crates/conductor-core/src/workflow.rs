// Data model (§3): Workflow, Stage, AgentSpec, StageResult and the stage
// status state machine of §4.7.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StructuredError;

/// Opaque workflow identifier. Owns one logical memory namespace and one DAG
/// execution.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkflowId(pub String);

impl From<&str> for WorkflowId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for WorkflowId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stage identifier. Names must match `[A-Za-z0-9_\-]+`, length 1..128 (§6).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StageId(pub String);

impl From<&str> for StageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for StageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

const STAGE_NAME_MAX_LEN: usize = 128;

/// Validates a stage name against §6's `[A-Za-z0-9_\-]+`, 1..128 rule.
pub fn validate_stage_name(name: &str) -> Result<(), StructuredError> {
    if name.is_empty() || name.len() > STAGE_NAME_MAX_LEN {
        return Err(StructuredError::validation(format!(
            "stage name '{name}' must be 1..{STAGE_NAME_MAX_LEN} characters"
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(StructuredError::validation(format!(
            "stage name '{name}' must match [A-Za-z0-9_-]+"
        )));
    }
    Ok(())
}

/// `{ name, systemPrompt, providerRef, toolsEnabled }` (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSpec {
    pub name: String,
    pub system_prompt: String,
    pub provider_ref: String,
    #[serde(default)]
    pub tools_enabled: bool,
}

impl AgentSpec {
    pub fn new(name: impl Into<String>, system_prompt: impl Into<String>, provider_ref: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            system_prompt: system_prompt.into(),
            provider_ref: provider_ref.into(),
            tools_enabled: false,
        }
    }

    pub fn with_tools_enabled(mut self, enabled: bool) -> Self {
        self.tools_enabled = enabled;
        self
    }
}

/// One DAG node. Immutable after planning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage {
    pub id: StageId,
    pub name: String,
    pub prompt_template: String,
    #[serde(default)]
    pub depends_on: BTreeSet<StageId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_budget: Option<u32>,
    #[serde(default)]
    pub approval_required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_timeout_secs: Option<u64>,
    pub agent_binding: AgentSpec,
}

impl Stage {
    pub fn new(name: impl Into<String>, prompt_template: impl Into<String>, agent_binding: AgentSpec) -> Self {
        let name = name.into();
        Self {
            id: StageId(name.clone()),
            name,
            prompt_template: prompt_template.into(),
            depends_on: BTreeSet::new(),
            timeout_secs: None,
            retry_budget: None,
            approval_required: false,
            approval_timeout_secs: None,
            agent_binding,
        }
    }

    pub fn depends_on(mut self, deps: impl IntoIterator<Item = StageId>) -> Self {
        self.depends_on.extend(deps);
        self
    }

    pub fn with_approval_required(mut self, required: bool) -> Self {
        self.approval_required = required;
        self
    }

    pub fn with_approval_timeout_secs(mut self, secs: u64) -> Self {
        self.approval_timeout_secs = Some(secs);
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }
}

/// A DAG of stages executed under one workflow id, sharing one memory
/// namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub stages: Vec<Stage>,
}

impl Workflow {
    pub fn new(id: impl Into<WorkflowId>, stages: Vec<Stage>) -> Self {
        Self { id: id.into(), stages }
    }
}

/// Per-stage lifecycle status (§4.7's state machine). Status sequences are
/// monotone: no backward transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum StageStatus {
    Pending,
    Ready,
    Running,
    #[serde(rename = "Awaiting-Approval")]
    AwaitingApproval,
    Succeeded,
    Failed,
    Cancelled,
    Skipped,
}

impl StageStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StageStatus::Succeeded | StageStatus::Failed | StageStatus::Cancelled | StageStatus::Skipped
        )
    }

    /// `Succeeded` or `Skipped` — the two statuses that satisfy a
    /// dependent's "deps resolved favorably" condition (§3 invariant).
    pub fn satisfies_dependency(self) -> bool {
        matches!(self, StageStatus::Succeeded | StageStatus::Skipped)
    }
}

/// `{ stageId, status, output?, review?, startedAt, finishedAt, durationMs,
/// error?, approvalFeedback? }` (§3). Monotone state transitions only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    pub stage_id: StageId,
    pub status: StageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<StructuredError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_feedback: Option<String>,
}

impl StageResult {
    pub fn pending(stage_id: StageId) -> Self {
        Self {
            stage_id,
            status: StageStatus::Pending,
            output: None,
            review: None,
            started_at: None,
            finished_at: None,
            duration_ms: 0,
            error: None,
            approval_feedback: None,
        }
    }

    /// Transitions to a new status, recording the wall-clock timestamp. The
    /// caller is responsible for only requesting transitions that are valid
    /// per §4.7's diagram; this method does not itself validate the edge.
    pub fn transition_to(&mut self, status: StageStatus) {
        let now = Utc::now();
        if self.started_at.is_none() && matches!(status, StageStatus::Running) {
            self.started_at = Some(now);
        }
        if status.is_terminal() {
            self.finished_at = Some(now);
            if let Some(started) = self.started_at {
                self.duration_ms = (now - started).num_milliseconds().max(0) as u64;
            }
        }
        self.status = status;
    }
}

/// Transient provider-call bookkeeping (§3). Not persisted.
#[derive(Debug, Clone)]
pub struct ProviderCall {
    pub provider_name: String,
    pub model: String,
    pub prompt: String,
    pub started_at: DateTime<Utc>,
    pub attempt: u32,
    pub max_attempts: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_name_rejects_invalid_characters() {
        assert!(validate_stage_name("stage-one_2").is_ok());
        assert!(validate_stage_name("bad name!").is_err());
        assert!(validate_stage_name("").is_err());
    }

    #[test]
    fn stage_name_rejects_over_length() {
        let long = "a".repeat(STAGE_NAME_MAX_LEN + 1);
        assert!(validate_stage_name(&long).is_err());
    }

    #[test]
    fn stage_result_transition_sets_timestamps() {
        let mut result = StageResult::pending(StageId::from("a"));
        result.transition_to(StageStatus::Running);
        assert!(result.started_at.is_some());
        result.transition_to(StageStatus::Succeeded);
        assert!(result.finished_at.is_some());
        assert!(result.status.is_terminal());
    }

    #[test]
    fn satisfies_dependency_covers_succeeded_and_skipped() {
        assert!(StageStatus::Succeeded.satisfies_dependency());
        assert!(StageStatus::Skipped.satisfies_dependency());
        assert!(!StageStatus::Failed.satisfies_dependency());
    }
}
