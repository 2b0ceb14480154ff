//! Conductor Tools - the baseline Tool Registry & Tools (C2).
//!
//! Three named, sandboxed side-effect operations per spec §4.2: `shell-exec`
//! (allow-listed single-command execution), `file-read` (base-directory
//! confined reads), and `web-search` (bounded `(title, url, snippet)` list,
//! stubbed when no endpoint is configured). All tool errors come back as
//! `ToolResult{ok:false, error}` values — never panics or thrown exceptions —
//! so an agent can observe and react.
//!
//! # Feature flags
//!
//! - `file` - the file-read tool
//! - `shell` - the shell-exec tool
//! - `web-search` - the web-search tool (pulls in `reqwest`)
//! - `all` - every baseline tool (the default)

pub mod registry;
pub mod tools;

pub use registry::{BuiltinToolExecutor, CompositeToolExecutor, ToolRegistry};

#[cfg(feature = "file")]
pub use tools::file::FileReadTool;

#[cfg(feature = "shell")]
pub use tools::shell::ShellExecTool;

#[cfg(feature = "web-search")]
pub use tools::web_search::WebSearchTool;

/// Convenience prelude for embedders wiring up a registry.
pub mod prelude {
    pub use super::registry::{BuiltinToolExecutor, CompositeToolExecutor, ToolRegistry};
    pub use conductor_core::{Tool, ToolConfig, ToolExecutor, ToolInput, ToolResult};

    #[cfg(feature = "file")]
    pub use super::tools::file::FileReadTool;

    #[cfg(feature = "shell")]
    pub use super::tools::shell::ShellExecTool;

    #[cfg(feature = "web-search")]
    pub use super::tools::web_search::WebSearchTool;
}
