//! Tool types for CodeCLI
//!
//! This module defines the core types for tool execution, including the `Tool` trait
//! that all tools must implement, and the `ToolContext` struct that provides
//! execution context to tools.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::Result;
use crate::runtime::ProcessRunner;
use crate::security::{resolve_path, DenyPrompter, PermissionGate};

/// Machine-readable tool result handed back to the model.
///
/// The payload is always a JSON object. Failures carry a single `error` key.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub value: Value,
    pub is_error: bool,
}

impl ToolOutput {
    /// Successful result.
    pub fn ok(value: Value) -> Self {
        Self {
            value,
            is_error: false,
        }
    }

    /// `{"error": message}`
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            value: json!({ "error": message.into() }),
            is_error: true,
        }
    }

    /// `{"error": "Permission denied"}`
    pub fn permission_denied() -> Self {
        Self::error("Permission denied")
    }

    /// The error message, if this is an error result.
    pub fn error_message(&self) -> Option<&str> {
        if self.is_error {
            self.value.get("error").and_then(Value::as_str)
        } else {
            None
        }
    }

    /// Serialized payload as sent in the tool message.
    pub fn to_content(&self) -> String {
        self.value.to_string()
    }
}

/// Trait that all tools must implement.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use serde_json::{json, Value};
/// use codecli::tools::{Tool, ToolContext, ToolOutput};
/// use codecli::error::Result;
///
/// struct PingTool;
///
/// #[async_trait]
/// impl Tool for PingTool {
///     fn name(&self) -> &str { "ping" }
///     fn description(&self) -> &str { "Answers pong" }
///     fn parameters(&self) -> Value {
///         json!({ "type": "object", "properties": {}, "required": [] })
///     }
///     async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<ToolOutput> {
///         Ok(ToolOutput::ok(json!({ "reply": "pong" })))
///     }
/// }
/// ```
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name the model uses to call the tool. Unique within a registry.
    fn name(&self) -> &str;

    /// Description sent to the model.
    fn description(&self) -> &str;

    /// JSON schema of the arguments object.
    fn parameters(&self) -> Value;

    /// Run the tool.
    ///
    /// # Arguments
    /// * `args` - Parsed arguments object (`{}` when the model sent malformed JSON)
    /// * `ctx` - Working directory, permission gate and process runner
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolOutput>;

    /// Short description of a call for display, such as the target path.
    fn summarize_args(&self, args: &Value) -> String {
        crate::utils::string::preview(&args.to_string(), 60)
    }

    /// Condensed info about a successful result for display, such as `12 lines`.
    fn describe_result(&self, _result: &Value) -> Option<String> {
        None
    }
}

/// Context provided to tools during execution.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Base directory for relative paths and commands
    pub workdir: PathBuf,
    /// Gate consulted before every read, write and execute
    pub permissions: Arc<PermissionGate>,
    /// Spawns shell commands
    pub runner: ProcessRunner,
    /// A user is at the terminal: echo command output and honour Ctrl-C
    pub interactive: bool,
}

impl ToolContext {
    /// Create a context rooted at `workdir`.
    pub fn new(workdir: impl Into<PathBuf>, permissions: Arc<PermissionGate>) -> Self {
        Self {
            workdir: workdir.into(),
            permissions,
            runner: ProcessRunner::new(),
            interactive: false,
        }
    }

    /// Context whose gate denies everything it cannot settle without asking.
    ///
    /// # Example
    /// ```
    /// use codecli::tools::ToolContext;
    ///
    /// let ctx = ToolContext::non_interactive("/tmp");
    /// assert!(!ctx.interactive);
    /// ```
    pub fn non_interactive(workdir: impl Into<PathBuf>) -> Self {
        let workdir = workdir.into();
        let gate = PermissionGate::new(Default::default(), Arc::new(DenyPrompter))
            .with_workdir(workdir.clone());
        Self::new(workdir, Arc::new(gate))
    }

    pub fn with_interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    /// Resolve a tool-supplied path against the working directory.
    pub fn resolve(&self, path: &str) -> PathBuf {
        resolve_path(&self.workdir, path)
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }
}

/// Required string argument.
pub(crate) fn str_arg<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

/// Optional positive integer argument. Accepts numbers and numeric strings.
pub(crate) fn usize_arg(args: &Value, key: &str) -> Option<usize> {
    match args.get(key)? {
        Value::Number(n) => n.as_u64().map(|n| n as usize),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Optional boolean argument.
pub(crate) fn bool_arg(args: &Value, key: &str) -> Option<bool> {
    match args.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_constructors() {
        let ok = ToolOutput::ok(json!({"success": true}));
        assert!(!ok.is_error);
        assert_eq!(ok.error_message(), None);

        let err = ToolOutput::error("boom");
        assert!(err.is_error);
        assert_eq!(err.value, json!({"error": "boom"}));
        assert_eq!(err.error_message(), Some("boom"));

        assert_eq!(
            ToolOutput::permission_denied().to_content(),
            r#"{"error":"Permission denied"}"#
        );
    }

    #[test]
    fn test_context_resolve() {
        let ctx = ToolContext::non_interactive("/work/project");
        assert_eq!(ctx.resolve("src/lib.rs"), PathBuf::from("/work/project/src/lib.rs"));
        assert_eq!(ctx.resolve("/etc/hosts"), PathBuf::from("/etc/hosts"));
        assert_eq!(ctx.permissions.workdir(), Path::new("/work/project"));
    }

    #[test]
    fn test_argument_helpers() {
        let args = json!({"path": "a", "n": 3, "s": "7", "flag": true, "sflag": "false", "neg": -1});
        assert_eq!(str_arg(&args, "path"), Some("a"));
        assert_eq!(str_arg(&args, "n"), None);
        assert_eq!(usize_arg(&args, "n"), Some(3));
        assert_eq!(usize_arg(&args, "s"), Some(7));
        assert_eq!(usize_arg(&args, "neg"), None);
        assert_eq!(bool_arg(&args, "flag"), Some(true));
        assert_eq!(bool_arg(&args, "sflag"), Some(false));
        assert_eq!(bool_arg(&args, "missing"), None);
    }
}
