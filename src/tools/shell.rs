//! Shell tool for CodeCLI
//!
//! `run_command` runs a command line through the platform shell after the
//! permission gate approves it.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{CodeCliError, Result};
use crate::runtime::{ctrl_c_interrupt, ProcessRequest, DEFAULT_COMMAND_TIMEOUT};

use super::types::{str_arg, usize_arg};
use super::{Tool, ToolContext, ToolOutput};

/// Tool for executing shell commands.
///
/// # Parameters
/// - `command`: the command line (required)
/// - `cwd`: working directory, relative to the context's (optional)
/// - `timeout`: milliseconds before the process is killed, default 30000
///
/// The result always carries `exitCode`, `stdout`, `stderr`, `success`,
/// `timedOut` and `interrupted`. A command that exceeds its timeout reports
/// `timedOut: true` with a non-zero exit code.
///
/// # Example
/// ```rust,ignore
/// use codecli::tools::{Tool, ToolContext};
/// use codecli::tools::shell::RunCommandTool;
/// use serde_json::json;
///
/// let ctx = ToolContext::non_interactive("/tmp");
/// let out = RunCommandTool.execute(json!({"command": "ls -la"}), &ctx).await?;
/// assert_eq!(out.value["success"], true);
/// ```
pub struct RunCommandTool;

#[async_trait]
impl Tool for RunCommandTool {
    fn name(&self) -> &str {
        "run_command"
    }

    fn description(&self) -> &str {
        "Execute a shell command and return its output. Use this for running tests, \
         builds, git operations, and other shell tasks."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                },
                "cwd": {
                    "type": "string",
                    "description": "Working directory for the command (defaults to project root)"
                },
                "timeout": {
                    "type": "integer",
                    "description": "Timeout in milliseconds (default: 30000)"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolOutput> {
        let command = str_arg(&args, "command")
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| CodeCliError::Tool("Missing 'command' argument".into()))?;

        if !ctx.permissions.check_execute(command).await {
            return Ok(ToolOutput::permission_denied());
        }

        let cwd = match str_arg(&args, "cwd").filter(|c| !c.trim().is_empty()) {
            Some(dir) => ctx.resolve(dir),
            None => ctx.workdir().to_path_buf(),
        };
        let timeout = usize_arg(&args, "timeout")
            .map(|ms| Duration::from_millis(ms.max(1) as u64))
            .unwrap_or(DEFAULT_COMMAND_TIMEOUT);

        let request = ProcessRequest::new(command)
            .with_cwd(cwd)
            .with_timeout(timeout)
            .with_echo(ctx.interactive);

        let output = if ctx.interactive {
            ctx.runner.run(&request, ctrl_c_interrupt()).await
        } else {
            ctx.runner.run(&request, std::future::pending()).await
        };

        Ok(ToolOutput::ok(serde_json::to_value(output)?))
    }

    fn summarize_args(&self, args: &Value) -> String {
        str_arg(args, "command").unwrap_or_default().to_string()
    }

    fn describe_result(&self, result: &Value) -> Option<String> {
        let flag = |key: &str| result.get(key).and_then(Value::as_bool).unwrap_or(false);
        if flag("timedOut") {
            return Some("timed out".into());
        }
        if flag("interrupted") {
            return Some("interrupted".into());
        }
        match result.get("stdout").and_then(Value::as_str) {
            Some(out) if !out.is_empty() => Some(format!("{} lines output", out.split('\n').count())),
            _ => Some("completed".into()),
        }
    }
}
