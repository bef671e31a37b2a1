use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::process::Command;

use crate::error::{HarrierError, Result};
use crate::tool::Tool;
use crate::types::ToolResponse;

/// Limits applied to shell execution.
#[derive(Debug, Clone)]
pub struct CodeConfig {
    /// Working directory for spawned commands.
    pub working_dir: Option<PathBuf>,
    pub timeout_secs: u64,
    /// Only the last N output lines are kept.
    pub max_output_lines: usize,
    /// Commands containing any of these are refused outright.
    pub blocked_patterns: Vec<String>,
}

impl Default for CodeConfig {
    fn default() -> Self {
        Self {
            working_dir: None,
            timeout_secs: 30,
            max_output_lines: 100,
            blocked_patterns: vec![
                "rm -rf /".into(),
                "rm -rf /*".into(),
                "mkfs".into(),
                "dd if=".into(),
                ":(){:|:&};:".into(), // fork bomb
            ],
        }
    }
}

/// Runs shell commands with a timeout, a safety blocklist, and output
/// truncation.
pub struct CodeExecutionTool {
    config: CodeConfig,
}

impl CodeExecutionTool {
    pub fn new() -> Self {
        Self {
            config: CodeConfig::default(),
        }
    }

    pub fn with_config(config: CodeConfig) -> Self {
        Self { config }
    }
}

impl Default for CodeExecutionTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for CodeExecutionTool {
    fn name(&self) -> &str {
        "execute_code"
    }

    fn description(&self) -> &str {
        "Execute a shell command and return its output"
    }

    fn parameters(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to run"
                }
            },
            "required": ["command"]
        }))
    }

    fn validate_params(&self, params: &Map<String, Value>) -> bool {
        params
            .get("command")
            .and_then(Value::as_str)
            .map_or(false, |command| !command.trim().is_empty())
    }

    async fn execute(&self, params: Map<String, Value>) -> Result<ToolResponse> {
        let Some(command) = params.get("command").and_then(Value::as_str) else {
            return Ok(ToolResponse::fail("Missing required 'command' parameter"));
        };

        if let Some(pattern) = self
            .config
            .blocked_patterns
            .iter()
            .find(|pattern| command.contains(pattern.as_str()))
        {
            return Ok(ToolResponse::fail(format!(
                "Command blocked for safety: contains '{pattern}'"
            )));
        }

        let mut cmd = if cfg!(windows) {
            let mut cmd = Command::new("cmd");
            cmd.args(["/C", command]);
            cmd
        } else {
            let mut cmd = Command::new("sh");
            cmd.args(["-c", command]);
            cmd
        };
        if let Some(dir) = &self.config.working_dir {
            cmd.current_dir(dir);
        }

        let output = tokio::time::timeout(
            Duration::from_secs(self.config.timeout_secs),
            cmd.output(),
        )
        .await
        .map_err(|_| HarrierError::ToolInvocation {
            name: self.name().to_string(),
            source: format!("command timed out after {}s", self.config.timeout_secs).into(),
        })?
        .map_err(|err| HarrierError::ToolInvocation {
            name: self.name().to_string(),
            source: Box::new(err),
        })?;

        let stdout = truncate_lines(
            &String::from_utf8_lossy(&output.stdout),
            self.config.max_output_lines,
        );
        let stderr = truncate_lines(
            &String::from_utf8_lossy(&output.stderr),
            self.config.max_output_lines,
        );
        let exit_code = output.status.code().unwrap_or(-1);
        let payload = json!({ "stdout": stdout, "exit_code": exit_code });

        if output.status.success() {
            Ok(ToolResponse::ok(payload))
        } else {
            Ok(ToolResponse {
                success: false,
                result: Some(payload),
                error: Some(if stderr.is_empty() {
                    format!("command exited with status {exit_code}")
                } else {
                    stderr
                }),
            })
        }
    }
}

/// Keeps the last `max_lines` lines, noting how many were dropped.
fn truncate_lines(text: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    if lines.len() <= max_lines {
        return text.trim_end().to_string();
    }
    let dropped = lines.len() - max_lines;
    format!(
        "... ({dropped} lines truncated)\n{}",
        lines[dropped..].join("\n")
    )
}
