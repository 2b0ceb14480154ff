//! Execution Engine (C7). Builds a DAG from a stage list, then drains a
//! ready queue through a bounded worker pool per §4.7's scheduling policy
//! and per-stage state machine.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use conductor_core::{
    AgentRef, ConductorConfig, ConductorResult, MemoryEntryKind, Stage, StageId, StageResult,
    StageStatus, StructuredError, WorkflowId, WorkflowSettings,
};
use conductor_memory::Memory;
use serde_json::json;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{info, warn};

/// The outcome handed to a stage awaiting a human (or automated) sign-off.
#[derive(Debug, Clone)]
pub enum ApprovalDecision {
    Approved { feedback: String },
    Rejected { feedback: Option<String> },
}

/// Where `approvalRequired` stages publish their request and wait for a
/// decision. The engine applies the stage's own `approvalTimeoutSecs`
/// (clamped to `workflow.approvalMaxTimeoutSecs`) around the call.
#[async_trait]
pub trait ApprovalSink: Send + Sync {
    async fn await_decision(&self, workflow_id: &str, stage_name: &str, output: &str) -> ApprovalDecision;
}

/// Approves every request immediately. Useful as a default for workflows
/// that never set `approvalRequired`, and in tests.
pub struct AutoApproveSink;

#[async_trait]
impl ApprovalSink for AutoApproveSink {
    async fn await_decision(&self, _workflow_id: &str, _stage_name: &str, _output: &str) -> ApprovalDecision {
        ApprovalDecision::Approved { feedback: "auto-approved".to_string() }
    }
}

fn config_err(code: &str, message: impl Into<String>) -> StructuredError {
    let mut err = StructuredError::config(message);
    err.code = code.to_string();
    err
}

/// Rejects duplicate stage names, dangling `dependsOn` references, cycles,
/// and over-deep dependency chains. Returns the dependents adjacency
/// (`stageId -> stages that depend on it`) on success.
fn validate_dag(stages: &[Stage], settings: &WorkflowSettings) -> ConductorResult<HashMap<StageId, Vec<StageId>>> {
    if stages.len() > settings.max_stages {
        return Err(config_err(
            "TOO_MANY_STAGES",
            format!("workflow has {} stages, exceeding max_stages={}", stages.len(), settings.max_stages),
        ));
    }

    let mut seen = HashSet::new();
    for stage in stages {
        if !seen.insert(stage.id.clone()) {
            return Err(config_err("DUPLICATE_STAGE", format!("duplicate stage name: {}", stage.name)));
        }
    }

    let ids: HashSet<StageId> = stages.iter().map(|s| s.id.clone()).collect();
    let mut dependents: HashMap<StageId, Vec<StageId>> = ids.iter().cloned().map(|id| (id, Vec::new())).collect();
    for stage in stages {
        for dep in &stage.depends_on {
            if !ids.contains(dep) {
                return Err(config_err(
                    "UNKNOWN_DEPENDENCY",
                    format!("stage '{}' depends on unknown stage '{}'", stage.name, dep.0),
                ));
            }
            dependents.get_mut(dep).unwrap().push(stage.id.clone());
        }
    }

    let by_id: HashMap<&StageId, &Stage> = stages.iter().map(|s| (&s.id, s)).collect();

    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Mark {
        Unvisited,
        InProgress,
        Done,
    }

    fn dfs(
        id: &StageId,
        by_id: &HashMap<&StageId, &Stage>,
        marks: &mut HashMap<StageId, Mark>,
        depths: &mut HashMap<StageId, usize>,
        max_depth: usize,
    ) -> ConductorResult<usize> {
        match marks.get(id) {
            Some(Mark::Done) => return Ok(*depths.get(id).unwrap_or(&0)),
            Some(Mark::InProgress) => {
                return Err(config_err("CYCLE_DETECTED", format!("dependency cycle detected at stage '{}'", id.0)));
            }
            _ => {}
        }
        marks.insert(id.clone(), Mark::InProgress);
        let stage = by_id.get(id).expect("stage id present in by_id");
        let mut depth = 0usize;
        for dep in &stage.depends_on {
            let dep_depth = dfs(dep, by_id, marks, depths, max_depth)?;
            depth = depth.max(dep_depth + 1);
        }
        if depth > max_depth {
            return Err(config_err(
                "MAX_DEPENDENCY_DEPTH_EXCEEDED",
                format!("stage '{}' exceeds max_dependency_depth={}", id.0, max_depth),
            ));
        }
        marks.insert(id.clone(), Mark::Done);
        depths.insert(id.clone(), depth);
        Ok(depth)
    }

    let mut marks: HashMap<StageId, Mark> = ids.iter().cloned().map(|id| (id, Mark::Unvisited)).collect();
    let mut depths = HashMap::new();
    for id in &ids {
        dfs(id, &by_id, &mut marks, &mut depths, settings.max_dependency_depth)?;
    }

    Ok(dependents)
}

/// Marks every still-non-terminal stage reachable from a `Failed`/`Cancelled`
/// stage as `Cancelled`, without executing it (§4.7 "failure propagation").
fn propagate_cancellation(dependents: &HashMap<StageId, Vec<StageId>>, results: &mut HashMap<StageId, StageResult>) {
    let mut queue: Vec<StageId> = results
        .iter()
        .filter(|(_, r)| matches!(r.status, StageStatus::Failed | StageStatus::Cancelled))
        .map(|(id, _)| id.clone())
        .collect();

    let mut visited: HashSet<StageId> = HashSet::new();
    while let Some(id) = queue.pop() {
        if !visited.insert(id.clone()) {
            continue;
        }
        for dependent in dependents.get(&id).into_iter().flatten() {
            let needs_cancel = results
                .get(dependent)
                .map(|r| !r.status.is_terminal())
                .unwrap_or(false);
            if needs_cancel {
                if let Some(r) = results.get_mut(dependent) {
                    r.transition_to(StageStatus::Cancelled);
                }
                queue.push(dependent.clone());
            }
        }
    }
}

enum RoundOutcome {
    Completed,
    BatchTimedOut,
}

/// Drains a validated stage DAG to completion. Constructed once per
/// workflow run by the Orchestrator Facade (C8), which supplies the bound
/// agents, the shared Memory Store, and the approval sink.
pub struct ExecutionEngine {
    agents: HashMap<String, AgentRef>,
    memory: Arc<dyn Memory>,
    approval_sink: Arc<dyn ApprovalSink>,
    config: ConductorConfig,
}

impl ExecutionEngine {
    pub fn new(
        agents: HashMap<String, AgentRef>,
        memory: Arc<dyn Memory>,
        approval_sink: Arc<dyn ApprovalSink>,
        config: ConductorConfig,
    ) -> Self {
        Self { agents, memory, approval_sink, config }
    }

    fn worker_pool_size(&self) -> usize {
        let available = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4);
        let max_threads = self.config.parallelism.max_threads.unwrap_or(available);
        max_threads.min(self.config.parallelism.max_tasks_per_batch).max(1)
    }

    /// Runs every stage in `stages` to a terminal status, returning results
    /// in the original (planner) order.
    pub async fn run(self: &Arc<Self>, workflow_id: &WorkflowId, stages: Vec<Stage>) -> ConductorResult<Vec<StageResult>> {
        let dependents = validate_dag(&stages, &self.config.workflow)?;
        let order: Vec<StageId> = stages.iter().map(|s| s.id.clone()).collect();
        let stage_map: HashMap<StageId, Stage> = stages.into_iter().map(|s| (s.id.clone(), s)).collect();

        let results: Arc<Mutex<HashMap<StageId, StageResult>>> = Arc::new(Mutex::new(
            order.iter().cloned().map(|id| (id.clone(), StageResult::pending(id))).collect(),
        ));

        let batch_timeout = Duration::from_secs(self.config.parallelism.batch_timeout_seconds);
        let started = Instant::now();

        loop {
            let ready = self.ready_stages(&order, &stage_map, &results).await;
            if ready.is_empty() {
                break;
            }

            let elapsed = started.elapsed();
            if elapsed >= batch_timeout {
                self.cancel_remaining(&order, &results).await;
                break;
            }
            let budget = batch_timeout - elapsed;

            // Stages in `ready` satisfied their deps this round, so none of
            // them depends on another member of the set — the ready set is
            // always an independent antichain, making the §4.7 "fraction of
            // independent ready stages" ratio 1.0 whenever it's evaluated.
            let independent_fraction = 1.0_f64;
            let parallel_eligible = self.config.parallelism.enabled
                && ready.len() >= self.config.parallelism.min_tasks_for_parallel_execution
                && independent_fraction >= self.config.parallelism.parallelism_threshold;
            let concurrency = if parallel_eligible { self.worker_pool_size() } else { 1 };

            match self.run_round(workflow_id, &ready, &stage_map, results.clone(), concurrency, budget).await {
                RoundOutcome::Completed => {}
                RoundOutcome::BatchTimedOut => {
                    self.cancel_remaining(&order, &results).await;
                    break;
                }
            }

            let mut locked = results.lock().await;
            propagate_cancellation(&dependents, &mut locked);
        }

        let locked = results.lock().await;
        Ok(order.iter().map(|id| locked.get(id).cloned().expect("every stage has a result")).collect())
    }

    async fn ready_stages(
        &self,
        order: &[StageId],
        stage_map: &HashMap<StageId, Stage>,
        results: &Arc<Mutex<HashMap<StageId, StageResult>>>,
    ) -> Vec<StageId> {
        let locked = results.lock().await;
        order
            .iter()
            .filter(|id| locked.get(*id).map(|r| r.status == StageStatus::Pending).unwrap_or(false))
            .filter(|id| {
                stage_map
                    .get(*id)
                    .map(|stage| {
                        stage.depends_on.iter().all(|dep| {
                            locked.get(dep).map(|r| r.status.satisfies_dependency()).unwrap_or(false)
                        })
                    })
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    async fn cancel_remaining(&self, order: &[StageId], results: &Arc<Mutex<HashMap<StageId, StageResult>>>) {
        let mut locked = results.lock().await;
        for id in order {
            if let Some(r) = locked.get_mut(id) {
                if !r.status.is_terminal() {
                    r.transition_to(StageStatus::Cancelled);
                }
            }
        }
    }

    async fn run_round(
        self: &Arc<Self>,
        workflow_id: &WorkflowId,
        ready: &[StageId],
        stage_map: &HashMap<StageId, Stage>,
        results: Arc<Mutex<HashMap<StageId, StageResult>>>,
        concurrency: usize,
        budget: Duration,
    ) -> RoundOutcome {
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let done: Arc<Mutex<HashSet<StageId>>> = Arc::new(Mutex::new(HashSet::new()));
        let mut set: JoinSet<()> = JoinSet::new();

        for stage_id in ready {
            let stage = stage_map.get(stage_id).expect("ready stage present in stage_map").clone();
            let sem = semaphore.clone();
            let results = results.clone();
            let done = done.clone();
            let engine = self.clone();
            let workflow_id = workflow_id.clone();
            set.spawn(async move {
                let _permit = sem.acquire_owned().await.expect("semaphore is never closed");
                engine.run_single_stage(&workflow_id, &stage, &results).await;
                done.lock().await.insert(stage.id.clone());
            });
        }

        let join_all = async {
            while set.join_next().await.is_some() {}
        };

        match tokio::time::timeout(budget, join_all).await {
            Ok(()) => {
                // `join_next` resolves with `Some(Err(..))` for a task that
                // panicked instead of running to completion; such a stage
                // never reaches `done`. Treat that as a worker-pool
                // submission failure for this batch rather than silently
                // leaving the stage stuck at `Running` forever.
                self.recover_unfinished_stages(workflow_id, ready, stage_map, &results, &done).await;
                RoundOutcome::Completed
            }
            Err(_) => {
                set.abort_all();
                let finished = done.lock().await;
                let mut locked = results.lock().await;
                for id in ready {
                    if finished.contains(id) {
                        continue;
                    }
                    if let Some(r) = locked.get_mut(id) {
                        if !r.status.is_terminal() {
                            r.transition_to(StageStatus::Failed);
                            r.error = Some(StructuredError::timeout(
                                "BATCH_TIMEOUT",
                                "execution batch exceeded its wall-clock timeout",
                            ));
                        }
                    }
                }
                RoundOutcome::BatchTimedOut
            }
        }
    }

    /// Handles stages whose worker-pool task never completed (panicked)
    /// this round. When `parallelism.fallback_sequential` is set, downgrades
    /// them to a direct, one-at-a-time re-run instead of aborting the batch
    /// (§6 `parallelism.fallbackToSequential`); otherwise marks them failed.
    async fn recover_unfinished_stages(
        self: &Arc<Self>,
        workflow_id: &WorkflowId,
        ready: &[StageId],
        stage_map: &HashMap<StageId, Stage>,
        results: &Arc<Mutex<HashMap<StageId, StageResult>>>,
        done: &Arc<Mutex<HashSet<StageId>>>,
    ) {
        let missing: Vec<StageId> = {
            let finished = done.lock().await;
            ready.iter().filter(|id| !finished.contains(*id)).cloned().collect()
        };
        if missing.is_empty() {
            return;
        }

        if self.config.parallelism.fallback_sequential {
            warn!(
                count = missing.len(),
                "worker-pool task(s) failed to complete; falling back to sequential execution"
            );
            for stage_id in &missing {
                let stage = stage_map.get(stage_id).expect("ready stage present in stage_map").clone();
                self.clone().run_single_stage(workflow_id, &stage, results).await;
            }
        } else {
            let mut locked = results.lock().await;
            for stage_id in &missing {
                if let Some(r) = locked.get_mut(stage_id) {
                    if !r.status.is_terminal() {
                        r.transition_to(StageStatus::Failed);
                        r.error = Some(config_err(
                            "WORKER_POOL_TASK_FAILED",
                            "stage's worker-pool task did not complete and fallback_sequential is disabled",
                        ));
                    }
                }
            }
        }
    }

    async fn run_single_stage(
        self: Arc<Self>,
        workflow_id: &WorkflowId,
        stage: &Stage,
        results: &Arc<Mutex<HashMap<StageId, StageResult>>>,
    ) {
        {
            let mut locked = results.lock().await;
            if let Some(r) = locked.get_mut(&stage.id) {
                r.transition_to(StageStatus::Running);
            }
        }
        info!(stage = %stage.name, "stage running");

        let Some(agent) = self.agents.get(&stage.agent_binding.name).cloned() else {
            self.finish_stage(
                results,
                &stage.id,
                StageStatus::Failed,
                None,
                Some(config_err("AGENT_UNBOUND", format!("no agent bound for stage '{}'", stage.name))),
                None,
            )
            .await;
            return;
        };

        let vars = self.resolve_vars(results, stage).await;
        let resolved_input = conductor_core::render(&stage.prompt_template, &vars);
        let mut ctx = conductor_core::AgentContext::new(resolved_input);

        let timeout = Duration::from_secs(stage.timeout_secs.unwrap_or(self.config.workflow.stage_default_timeout_secs));

        let outcome = tokio::time::timeout(timeout, agent.execute(&mut ctx)).await;
        let exec_result = match outcome {
            Err(_) => {
                self.finish_stage(
                    results,
                    &stage.id,
                    StageStatus::Failed,
                    None,
                    Some(StructuredError::timeout("STAGE_TIMEOUT", format!("stage '{}' exceeded its timeout", stage.name))),
                    None,
                )
                .await;
                return;
            }
            Ok(Err(err)) => {
                self.finish_stage(results, &stage.id, StageStatus::Failed, None, Some(err), None).await;
                return;
            }
            Ok(Ok(result)) => result,
        };

        if !exec_result.success {
            self.finish_stage(results, &stage.id, StageStatus::Failed, Some(exec_result.output), exec_result.error, None)
                .await;
            return;
        }

        // Records the agent's turn and the stage artifact as one
        // transaction, so a crash between the two never leaves only one of
        // them durable (§4.1's single-stage transaction boundary).
        if let Err(err) = self
            .memory
            .append_and_put_artifact(
                &workflow_id.0,
                &stage.agent_binding.name,
                MemoryEntryKind::AgentTurn,
                &exec_result.output,
                &stage.name,
                json!(exec_result.output),
            )
            .await
        {
            warn!(stage = %stage.name, error = %err.message, "failed to persist stage turn and artifact");
        }

        if !stage.approval_required {
            self.finish_stage(results, &stage.id, StageStatus::Succeeded, Some(exec_result.output), None, None).await;
            return;
        }

        {
            let mut locked = results.lock().await;
            if let Some(r) = locked.get_mut(&stage.id) {
                r.transition_to(StageStatus::AwaitingApproval);
            }
        }

        let approval_timeout = Duration::from_secs(
            stage
                .approval_timeout_secs
                .unwrap_or(self.config.workflow.approval_default_timeout_secs)
                .min(self.config.workflow.approval_max_timeout_secs),
        );

        let decision = tokio::time::timeout(
            approval_timeout,
            self.approval_sink.await_decision(&workflow_id.0, &stage.name, &exec_result.output),
        )
        .await;

        match decision {
            Err(_) => {
                self.finish_stage(
                    results,
                    &stage.id,
                    StageStatus::Failed,
                    Some(exec_result.output),
                    Some(StructuredError::timeout("APPROVAL_TIMEOUT", format!("approval for stage '{}' timed out", stage.name))),
                    None,
                )
                .await;
            }
            Ok(ApprovalDecision::Approved { feedback }) => {
                self.finish_stage(
                    results,
                    &stage.id,
                    StageStatus::Succeeded,
                    Some(exec_result.output),
                    None,
                    Some(feedback),
                )
                .await;
            }
            Ok(ApprovalDecision::Rejected { feedback }) => {
                let mut err = StructuredError::validation(format!("approval rejected for stage '{}'", stage.name));
                err.code = "APPROVAL_REJECTED".to_string();
                self.finish_stage(
                    results,
                    &stage.id,
                    StageStatus::Failed,
                    Some(exec_result.output),
                    Some(err),
                    feedback,
                )
                .await;
            }
        }
    }

    async fn finish_stage(
        &self,
        results: &Arc<Mutex<HashMap<StageId, StageResult>>>,
        stage_id: &StageId,
        status: StageStatus,
        output: Option<String>,
        error: Option<StructuredError>,
        approval_feedback: Option<String>,
    ) {
        let mut locked = results.lock().await;
        if let Some(r) = locked.get_mut(stage_id) {
            r.output = output;
            r.error = error;
            r.approval_feedback = approval_feedback;
            r.transition_to(status);
        }
    }

    async fn resolve_vars(
        &self,
        results: &Arc<Mutex<HashMap<StageId, StageResult>>>,
        stage: &Stage,
    ) -> HashMap<String, String> {
        let locked = results.lock().await;
        let mut vars = HashMap::new();
        for (id, result) in locked.iter() {
            if let Some(output) = &result.output {
                vars.insert(format!("{}.output", id.0), output.clone());
            }
        }
        let _ = stage;
        vars
    }
}
