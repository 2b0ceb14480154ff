//! shell-exec (C2): runs a single allow-listed command under a wall-clock
//! timeout, truncating captured stdout/stderr at a configured byte ceiling.
//! On timeout the spawned process tree is terminated (spec §4.2).

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use conductor_core::{ShellExecSettings, StructuredError, Tool, ToolConfig, ToolInput, ToolResult};
use tokio::process::Command;
use tracing::{debug, warn};

use super::common::{schema, tool_config};

pub struct ShellExecTool {
    settings: ShellExecSettings,
}

impl ShellExecTool {
    pub fn new(settings: ShellExecSettings) -> Self {
        Self { settings }
    }

    fn is_allowed(&self, program: &str) -> bool {
        self.settings.allowed_commands.iter().any(|c| c == program)
    }
}

#[async_trait]
impl Tool for ShellExecTool {
    fn name(&self) -> &str {
        "shell-exec"
    }

    fn config(&self) -> ToolConfig {
        tool_config(
            "shell-exec",
            "Runs a single allow-listed command and returns its captured stdout/stderr.",
            schema(
                serde_json::json!({
                    "command": {
                        "type": "string",
                        "description": "The program name (argv[0]); must be in the configured allow-list",
                    },
                    "args": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Positional arguments passed to the command",
                    },
                }),
                &["command"],
            ),
        )
        .with_timeout(self.settings.timeout_secs)
    }

    async fn invoke(&self, input: ToolInput) -> ToolResult {
        let command: String = match input.require_arg("command") {
            Ok(c) => c,
            Err(e) => return ToolResult::error(self.name(), e),
        };
        let args: Vec<String> = input.get_arg("args").unwrap_or_default();

        if !self.is_allowed(&command) {
            warn!(command = %command, "shell command rejected: not in allow-list");
            return ToolResult::error(
                self.name(),
                StructuredError::permission(format!("command '{command}' is not in the allow-list")),
            );
        }

        debug!(command = %command, args = ?args, "spawning shell-exec command");

        let mut cmd = Command::new(&command);
        cmd.args(&args);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        // Places the child in its own process group on unix so the whole
        // tree can be terminated together on timeout.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let mut child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => {
                return ToolResult::error(self.name(), StructuredError::internal(format!("failed to spawn: {e}")))
            }
        };

        let timeout = Duration::from_secs(self.settings.timeout_secs);
        let max_bytes = self.settings.max_output_bytes;

        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let stdout = truncate(&output.stdout, max_bytes);
                let stderr = truncate(&output.stderr, max_bytes);
                if output.status.success() {
                    ToolResult::success(self.name(), format_output(&stdout, &stderr))
                } else {
                    ToolResult::error(
                        self.name(),
                        StructuredError::validation(format!(
                            "command exited with status {:?}: {}",
                            output.status.code(),
                            stderr
                        )),
                    )
                }
            }
            Ok(Err(e)) => ToolResult::error(self.name(), StructuredError::internal(e.to_string())),
            Err(_) => {
                kill_process_tree(&mut child).await;
                ToolResult::error(
                    self.name(),
                    StructuredError::timeout("SHELL_EXEC_TIMEOUT", format!("command timed out after {timeout:?}")),
                )
            }
        }
    }
}

fn truncate(bytes: &[u8], max: usize) -> String {
    let text = String::from_utf8_lossy(bytes);
    if text.len() > max {
        let boundary = text
            .char_indices()
            .map(|(i, _)| i)
            .take_while(|i| *i <= max)
            .last()
            .unwrap_or(0);
        format!("{}...(truncated)", &text[..boundary])
    } else {
        text.into_owned()
    }
}

fn format_output(stdout: &str, stderr: &str) -> String {
    if stderr.is_empty() {
        stdout.to_string()
    } else {
        format!("{stdout}\n--- stderr ---\n{stderr}")
    }
}

async fn kill_process_tree(child: &mut tokio::process::Child) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            unsafe {
                libc::kill(-(pid as libc::pid_t), libc::SIGKILL);
            }
        }
    }
    let _ = child.kill().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(allowed: &[&str]) -> ShellExecSettings {
        ShellExecSettings {
            timeout_secs: 5,
            allowed_commands: allowed.iter().map(|s| s.to_string()).collect(),
            max_output_bytes: 4096,
        }
    }

    #[tokio::test]
    async fn rejects_command_outside_allow_list() {
        let tool = ShellExecTool::new(settings(&["echo"]));
        let result = tool
            .invoke(ToolInput::new(serde_json::json!({"command": "rm", "args": ["-rf", "/"]})))
            .await;
        assert!(!result.ok);
        assert_eq!(result.error.unwrap().category, conductor_core::ErrorCategory::Permission);
    }

    #[tokio::test]
    async fn runs_allowed_command() {
        let tool = ShellExecTool::new(settings(&["echo"]));
        let result = tool
            .invoke(ToolInput::new(serde_json::json!({"command": "echo", "args": ["hi"]})))
            .await;
        assert!(result.ok);
        assert!(result.output.unwrap().contains("hi"));
    }

    #[test]
    fn truncate_does_not_split_a_multibyte_char() {
        let bytes = "héllo".repeat(400).into_bytes();
        let result = truncate(&bytes, 10);
        assert!(result.ends_with("...(truncated)"));
    }

    #[tokio::test]
    async fn times_out_long_running_command() {
        let mut s = settings(&["sleep"]);
        s.timeout_secs = 1;
        let tool = ShellExecTool::new(s);
        let result = tool
            .invoke(ToolInput::new(serde_json::json!({"command": "sleep", "args": ["5"]})))
            .await;
        assert!(!result.ok);
        assert_eq!(result.error.unwrap().category, conductor_core::ErrorCategory::Timeout);
    }
}
