//! file-read (C2): reads a file confined to a configured base directory.
//!
//! Rejects paths containing `..`, symlinks (unless explicitly allowed),
//! absolute paths, device names, or control characters; enforces `maxBytes`
//! and `maxPathLength` (spec §4.2, §8 boundary behaviors).

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use conductor_core::{FileReadSettings, StructuredError, Tool, ToolConfig, ToolInput, ToolResult};
use tokio::io::AsyncReadExt;
use tracing::debug;

use super::common::{schema, tool_config};

/// Windows reserved device names; rejected regardless of host platform so
/// the validation rule is portable across deployments.
const DEVICE_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

pub struct FileReadTool {
    settings: FileReadSettings,
}

impl FileReadTool {
    pub fn new(settings: FileReadSettings) -> Self {
        Self { settings }
    }

    /// Validates a caller-supplied relative path against §4.2's rejection
    /// rules before any filesystem access occurs.
    fn validate(&self, raw: &str) -> Result<PathBuf, StructuredError> {
        if raw.len() > self.settings.max_path_length {
            return Err(StructuredError::validation(format!(
                "path exceeds max length of {}",
                self.settings.max_path_length
            )));
        }
        if raw.chars().any(|c| c.is_control()) {
            return Err(StructuredError::validation("path contains control characters"));
        }
        let candidate = Path::new(raw);
        if candidate.is_absolute() {
            return Err(StructuredError::validation("absolute paths are not allowed"));
        }
        if candidate.components().any(|c| c.as_os_str() == "..") {
            return Err(StructuredError::validation("path must not contain '..'"));
        }
        if let Some(stem) = candidate.file_stem().and_then(|s| s.to_str()) {
            if DEVICE_NAMES.iter().any(|d| d.eq_ignore_ascii_case(stem)) {
                return Err(StructuredError::validation(format!("'{stem}' is a reserved device name")));
            }
        }

        let base = PathBuf::from(&self.settings.base_dir);
        Ok(base.join(candidate))
    }
}

#[async_trait]
impl Tool for FileReadTool {
    fn name(&self) -> &str {
        "file-read"
    }

    fn config(&self) -> ToolConfig {
        tool_config(
            "file-read",
            "Reads the contents of a file inside the configured base directory.",
            schema(
                serde_json::json!({
                    "path": {
                        "type": "string",
                        "description": "Path relative to the configured base directory",
                    },
                }),
                &["path"],
            ),
        )
    }

    async fn invoke(&self, input: ToolInput) -> ToolResult {
        let path: String = match input.require_arg("path") {
            Ok(p) => p,
            Err(e) => return ToolResult::error(self.name(), e),
        };

        let resolved = match self.validate(&path) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(self.name(), e),
        };

        match resolved.symlink_metadata() {
            Ok(meta) if meta.file_type().is_symlink() && !self.settings.allow_symlinks => {
                return ToolResult::error(
                    self.name(),
                    StructuredError::validation("symlinks are not allowed"),
                );
            }
            Ok(_) => {}
            Err(e) => return ToolResult::error(self.name(), StructuredError::not_found(e.to_string())),
        }

        debug!(path = %resolved.display(), "reading file");
        let mut file = match tokio::fs::File::open(&resolved).await {
            Ok(f) => f,
            Err(e) => return ToolResult::error(self.name(), StructuredError::not_found(e.to_string())),
        };

        let max_bytes = self.settings.max_bytes;
        let mut buffer = Vec::with_capacity(max_bytes.min(64 * 1024));
        let mut limited = (&mut file).take(max_bytes as u64 + 1);
        if let Err(e) = limited.read_to_end(&mut buffer).await {
            return ToolResult::error(self.name(), StructuredError::internal(e.to_string()));
        }

        if buffer.len() > max_bytes {
            return ToolResult::error(
                self.name(),
                StructuredError::size_exceeded(format!("file exceeds max_bytes={max_bytes}")),
            );
        }

        match String::from_utf8(buffer) {
            Ok(contents) => ToolResult::success(self.name(), contents),
            Err(_) => ToolResult::error(self.name(), StructuredError::validation("file is not valid UTF-8")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(base: &str) -> FileReadSettings {
        FileReadSettings {
            base_dir: base.to_string(),
            allow_symlinks: false,
            max_bytes: 1024,
            max_path_length: 256,
        }
    }

    #[tokio::test]
    async fn reads_file_inside_base_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "hello").unwrap();
        let tool = FileReadTool::new(settings(dir.path().to_str().unwrap()));

        let result = tool
            .invoke(ToolInput::new(serde_json::json!({"path": "a.txt"})))
            .await;
        assert!(result.ok);
        assert_eq!(result.output.unwrap(), "hello");
    }

    #[tokio::test]
    async fn rejects_parent_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FileReadTool::new(settings(dir.path().to_str().unwrap()));
        let result = tool
            .invoke(ToolInput::new(serde_json::json!({"path": "../etc/passwd"})))
            .await;
        assert!(!result.ok);
        assert_eq!(result.error.unwrap().category, conductor_core::ErrorCategory::Validation);
    }

    #[tokio::test]
    async fn rejects_absolute_path() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FileReadTool::new(settings(dir.path().to_str().unwrap()));
        let result = tool
            .invoke(ToolInput::new(serde_json::json!({"path": "/etc/passwd"})))
            .await;
        assert!(!result.ok);
    }

    #[tokio::test]
    async fn rejects_control_characters() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FileReadTool::new(settings(dir.path().to_str().unwrap()));
        let result = tool
            .invoke(ToolInput::new(serde_json::json!({"path": "a\u{0}.txt"})))
            .await;
        assert!(!result.ok);
    }

    #[tokio::test]
    async fn rejects_oversized_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("big.txt"), "x".repeat(2048)).unwrap();
        let tool = FileReadTool::new(settings(dir.path().to_str().unwrap()));
        let result = tool
            .invoke(ToolInput::new(serde_json::json!({"path": "big.txt"})))
            .await;
        assert!(!result.ok);
        assert_eq!(result.error.unwrap().category, conductor_core::ErrorCategory::SizeExceeded);
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FileReadTool::new(settings(dir.path().to_str().unwrap()));
        let result = tool
            .invoke(ToolInput::new(serde_json::json!({"path": "missing.txt"})))
            .await;
        assert!(!result.ok);
        assert_eq!(result.error.unwrap().category, conductor_core::ErrorCategory::NotFound);
    }
}
