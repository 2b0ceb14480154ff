//! Conductor Runtime - Agent Runtime (C5), Planner (C6), Execution Engine
//! (C7), and the Orchestrator Facade (C8) applications construct against.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use conductor_core::{AgentSpec, ConductorConfig, Stage};
//! use conductor_llm::Provider;
//! use conductor_memory::SimpleMemory;
//! use conductor_runtime::Orchestrator;
//!
//! # async fn example(worker: Arc<dyn Provider>) -> Result<(), Box<dyn std::error::Error>> {
//! let orchestrator = Orchestrator::new(ConductorConfig::default(), Arc::new(SimpleMemory::in_memory()))
//!     .with_provider("worker", worker);
//!
//! let binding = AgentSpec::new("writer", "{{prompt}}", "worker");
//! let stage = Stage::new("draft", "write a summary", binding);
//! let results = orchestrator.run_workflow("wf-1", vec![stage]).await?;
//! # let _ = results;
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod engine;
pub mod facade;
pub mod planner;

pub use agent::{parse_tool_call, DefaultAgent};
pub use engine::{ApprovalDecision, ApprovalSink, AutoApproveSink, ExecutionEngine};
pub use facade::Orchestrator;
pub use planner::Planner;
