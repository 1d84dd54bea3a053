//! Shell command execution tool

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::{timeout, Duration};

use crate::tools::{parse_input, ParameterProperty, ParameterSchema, Tool, ToolContext};
use crate::types::ToolOutput;

#[derive(Debug, Deserialize)]
struct RunCommandInput {
    #[serde(alias = "cmd")]
    command: String,
    #[serde(default)]
    timeout: Option<u64>,
}

/// Tool for executing shell commands in the working directory
pub struct RunCommandTool;

#[async_trait]
impl Tool for RunCommandTool {
    fn name(&self) -> &str {
        "run_command"
    }

    fn description(&self) -> &str {
        "Execute a shell command in the workspace and return its combined output."
    }

    fn parameters_schema(&self) -> ParameterSchema {
        ParameterSchema::new()
            .with_required(
                "command",
                ParameterProperty::string("The shell command to execute").with_aliases(&["cmd"]),
            )
            .with_property(
                "timeout",
                ParameterProperty::integer("Timeout in seconds (default: 120)")
                    .with_default(Value::Number(120.into())),
            )
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<ToolOutput> {
        let input: RunCommandInput = match parse_input(self.name(), args) {
            Ok(i) => i,
            Err(e) => return Ok(ToolOutput::failure(e.to_string())),
        };
        let timeout_secs = input.timeout.unwrap_or(ctx.command_timeout_secs);

        if !ctx.working_dir.exists() {
            return Ok(ToolOutput::failure(format!(
                "Working directory does not exist: {}",
                ctx.working_dir.display()
            )));
        }

        let (shell, shell_arg) = if cfg!(target_os = "windows") {
            ("cmd", "/C")
        } else {
            ("sh", "-c")
        };

        let mut cmd = Command::new(shell);
        cmd.arg(shell_arg)
            .arg(&input.command)
            .current_dir(&ctx.working_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match timeout(Duration::from_secs(timeout_secs), cmd.output()).await {
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);

                let mut combined = stdout.into_owned();
                if !stderr.is_empty() {
                    if !combined.is_empty() {
                        combined.push_str("\n--- stderr ---\n");
                    }
                    combined.push_str(&stderr);
                }
                let combined = ctx.truncate(combined);

                if output.status.success() {
                    Ok(ToolOutput::success(combined))
                } else {
                    let code = output
                        .status
                        .code()
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| "unknown".to_string());
                    let mut error = format!("Command exited with code {}", code);
                    if !combined.trim().is_empty() {
                        error.push_str(": ");
                        error.push_str(combined.trim());
                    }
                    Ok(ToolOutput::failure(error))
                }
            }
            Ok(Err(e)) => Ok(ToolOutput::failure(format!("Failed to execute command: {}", e))),
            Err(_) => Ok(ToolOutput::failure(format!(
                "Command timed out after {} seconds",
                timeout_secs
            ))),
        }
    }
}
