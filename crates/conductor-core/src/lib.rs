// Conductor Core - foundation types, traits, and error taxonomy shared by
// every other Conductor crate.
//
// This crate owns the data model (workflows, stages, agent specs), the
// closed structured-error taxonomy (C9), the `Memory`/`MemoryBackend`,
// `Tool`/`ToolExecutor`, and `Agent` trait surfaces, prompt template
// rendering, and the typed settings struct the rest of the system consumes.
// Nothing it exports depends back on a satellite crate.

pub mod agent;
pub mod config;
pub mod error;
pub mod memory;
pub mod template;
pub mod tool;
pub mod workflow;

pub use agent::{
    Agent, AgentContext, AgentMetadata, AgentRef, ExecutionMetadata, ExecutionResult, Message,
    MessageRole,
};
pub use config::{
    CircuitBreakerSettings, ConductorConfig, EnvSecretResolver, FileReadSettings, MemorySettings,
    ParallelismSettings, RateLimiterSettings, RetrySettings, RetryStrategy, SecretResolver,
    ShellExecSettings, SlidingWindowType, TemplateCacheSettings, TimeLimiterSettings, ToolSettings,
    WorkflowSettings,
};
pub use error::{ConductorError, ConductorResult, ErrorCategory, RecoveryHint, StructuredError};
pub use memory::{Memory, MemoryBackend, MemoryEntry, MemoryEntryKind, MemoryQuery};
pub use template::{render, TemplateCache};
pub use tool::{Tool, ToolCall, ToolConfig, ToolExecutor, ToolInput, ToolResult, ToolType};
pub use workflow::{
    validate_stage_name, AgentSpec, ProviderCall, Stage, StageId, StageResult, StageStatus,
    Workflow, WorkflowId,
};

/// Crate version, surfaced for diagnostics.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default memory window read into a prompt when a stage doesn't override
/// it (§4.5 step 1, §6 `memory.defaultLimit`).
pub const DEFAULT_MEMORY_LIMIT: usize = 50;

/// Default maximum number of tool calls an agent may issue per turn before
/// the runtime insists on final text.
pub const MAX_PARALLEL_TOOLS: usize = 10;
