//! Tool registry for CodeCLI
//!
//! Holds the tools offered to the model and runs the calls it makes. A call
//! never fails the batch: unknown tools, malformed arguments and tool errors
//! all become `{"error": ...}` results.

use std::collections::HashMap;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::CodeCliError;
use crate::providers::ToolDefinition;
use crate::session::{Message, ToolCall};

use super::{Tool, ToolContext, ToolOutput};

/// Outcome of one tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    /// Id of the call this answers
    pub tool_call_id: String,
    /// Tool name as requested by the model
    pub name: String,
    /// JSON payload, serialized
    pub content: String,
    pub is_error: bool,
    /// Display summary of the arguments (path, command, pattern)
    pub summary: String,
    /// Display info about the result (`12 lines`), or the error message
    pub detail: Option<String>,
    pub duration_ms: u64,
}

impl ToolResult {
    /// Tool message for the conversation history.
    pub fn to_message(&self) -> Message {
        Message::tool_result(&self.tool_call_id, &self.name, &self.content)
    }
}

/// A registry that holds and runs tools.
///
/// # Example
///
/// ```rust
/// use codecli::tools::{ToolContext, ToolRegistry};
/// use codecli::session::ToolCall;
///
/// # tokio_test::block_on(async {
/// let registry = ToolRegistry::with_builtins();
/// let ctx = ToolContext::non_interactive(std::env::temp_dir());
/// let calls = vec![ToolCall::new("call_1", "no_such_tool", "{}")];
///
/// let results = registry.execute_tool_calls(&calls, &ctx).await;
/// assert_eq!(results.len(), 1);
/// assert_eq!(results[0].content, r#"{"error":"Unknown tool: no_such_tool"}"#);
/// # });
/// ```
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Registry with every built-in tool.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(super::filesystem::ReadFileTool));
        registry.register(Box::new(super::filesystem::WriteFileTool));
        registry.register(Box::new(super::filesystem::ListDirTool));
        registry.register(Box::new(super::search::FileSearchTool));
        registry.register(Box::new(super::search::CodeSearchTool));
        registry.register(Box::new(super::shell::RunCommandTool));
        registry
    }

    /// Register a tool, replacing any tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        debug!(tool = %name, "Registering tool");
        self.tools.insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Definitions for the provider, sorted by name so requests are stable.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .values()
            .map(|t| ToolDefinition::new(t.name(), t.description(), t.parameters()))
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Display summary of a call before it runs.
    pub fn summarize_call(&self, call: &ToolCall) -> String {
        match self.tools.get(&call.name) {
            Some(tool) => tool.summarize_args(&call.arguments_value()),
            None => crate::utils::string::preview(&call.arguments, 60),
        }
    }

    /// Run every call in order, one at a time.
    ///
    /// Returns exactly one result per call, in the same order.
    pub async fn execute_tool_calls(&self, calls: &[ToolCall], ctx: &ToolContext) -> Vec<ToolResult> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            results.push(self.execute_call(call, ctx).await);
        }
        results
    }

    /// Run a single call.
    pub async fn execute_call(&self, call: &ToolCall, ctx: &ToolContext) -> ToolResult {
        let start = Instant::now();
        let args = call.arguments_value();

        let (output, summary, detail) = match self.tools.get(&call.name) {
            None => {
                warn!(tool = %call.name, "Model requested unknown tool");
                let output = ToolOutput::error(format!("Unknown tool: {}", call.name));
                let summary = crate::utils::string::preview(&call.arguments, 60);
                (output, summary, None)
            }
            Some(tool) => {
                let summary = tool.summarize_args(&args);
                let output = match tool.execute(args, ctx).await {
                    Ok(output) => output,
                    Err(e) => ToolOutput::error(error_message(e)),
                };
                let detail = if output.is_error {
                    output.error_message().map(str::to_string)
                } else {
                    tool.describe_result(&output.value)
                };
                (output, summary, detail)
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        if output.is_error {
            warn!(
                tool = %call.name,
                error = output.error_message().unwrap_or_default(),
                duration_ms,
                "Tool call failed"
            );
        } else {
            info!(tool = %call.name, duration_ms, "Tool call succeeded");
        }

        ToolResult {
            tool_call_id: call.id.clone(),
            name: call.name.clone(),
            content: output.to_content(),
            is_error: output.is_error,
            summary,
            detail,
            duration_ms,
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn error_message(error: CodeCliError) -> String {
    match error {
        CodeCliError::Tool(msg) => msg,
        other => other.to_string(),
    }
}

/// Helper for tools whose result info is a count of some array field.
pub(crate) fn count_of(result: &Value, key: &str) -> Option<usize> {
    result.get(key).and_then(Value::as_array).map(Vec::len)
}
