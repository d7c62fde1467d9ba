//! Runtime context and system prompt construction
//!
//! `RuntimeContext` is the single owner of process-wide mutable state: the
//! permission gate (and its session cache and God Mode root) and the token
//! usage counters. It is created once by the application and shared with
//! the agent loop and tools through an `Arc`.
//!
//! `SystemPromptBuilder` assembles the system prompt from the base
//! instructions, the environment, project memory files and user overrides.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::config::Config;
use crate::providers::Usage;
use crate::security::{PermissionGate, PermissionPrompter};
use crate::tools::ToolContext;

/// Project memory file names, checked in order. The first one found wins.
pub const PROJECT_CONTEXT_FILES: &[&str] = &["CODECLI.md", ".codecli.md", "codecli.md"];

const BASE_SYSTEM_PROMPT: &str = r#"You are CodeCLI, an AI-powered coding assistant running in the terminal. You are an expert software engineer helping the user with coding tasks.

## Your Capabilities
- Read, write, and edit files in the user's project
- Execute shell commands
- Search code and files
- Analyze images
- Manage project context and memory

## Guidelines
- Be concise but thorough in explanations
- Ask for confirmation before destructive operations
- Use the available tools to complete tasks
- When writing code, follow the project's existing style and conventions
- Provide clear explanations of what you're doing and why"#;

// ============================================================================
// Token usage
// ============================================================================

/// Process-lifetime token counters. Only ever grow.
#[derive(Debug, Default)]
pub struct TokenUsage {
    prompt: AtomicU64,
    completion: AtomicU64,
}

/// Point-in-time copy of [`TokenUsage`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSnapshot {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one round trip's usage.
    pub fn record(&self, usage: &Usage) {
        self.prompt
            .fetch_add(u64::from(usage.prompt_tokens), Ordering::Relaxed);
        self.completion
            .fetch_add(u64::from(usage.completion_tokens), Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> UsageSnapshot {
        let prompt_tokens = self.prompt.load(Ordering::Relaxed);
        let completion_tokens = self.completion.load(Ordering::Relaxed);
        UsageSnapshot {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

// ============================================================================
// Runtime context
// ============================================================================

/// Shared state for one running application.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use codecli::agent::RuntimeContext;
/// use codecli::config::Config;
/// use codecli::security::DenyPrompter;
///
/// let ctx = RuntimeContext::new(Config::default(), "/work/project", Arc::new(DenyPrompter));
/// assert_eq!(ctx.usage().total_tokens, 0);
/// assert!(!ctx.permissions.is_god_mode());
/// ```
#[derive(Debug)]
pub struct RuntimeContext {
    pub config: Config,
    pub workdir: PathBuf,
    pub permissions: Arc<PermissionGate>,
    pub token_usage: TokenUsage,
    /// A user is at the terminal
    pub interactive: bool,
}

impl RuntimeContext {
    /// Build the context. The permission gate takes its policy from
    /// `config.permissions` and resolves targets against `workdir`.
    pub fn new(
        config: Config,
        workdir: impl Into<PathBuf>,
        prompter: Arc<dyn PermissionPrompter>,
    ) -> Self {
        let workdir = workdir.into();
        let permissions =
            PermissionGate::new(config.permissions.clone(), prompter).with_workdir(workdir.clone());
        Self {
            config,
            workdir,
            permissions: Arc::new(permissions),
            token_usage: TokenUsage::new(),
            interactive: false,
        }
    }

    pub fn with_interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    /// Context handed to each tool call.
    pub fn tool_context(&self) -> ToolContext {
        ToolContext::new(self.workdir.clone(), Arc::clone(&self.permissions))
            .with_interactive(self.interactive)
    }

    pub fn record_usage(&self, usage: &Usage) {
        self.token_usage.record(usage);
    }

    pub fn usage(&self) -> UsageSnapshot {
        self.token_usage.snapshot()
    }
}

// ============================================================================
// System prompt
// ============================================================================

/// Builder for the system prompt sent with every request.
///
/// Sections, in order: base instructions, working directory and platform,
/// project memory, global memory, custom instructions, appended text.
///
/// # Example
///
/// ```rust
/// use codecli::agent::SystemPromptBuilder;
///
/// let prompt = SystemPromptBuilder::new("/work/project")
///     .with_custom_instructions("Answer in French.")
///     .build();
/// assert!(prompt.contains("## Current Working Directory\n/work/project"));
/// assert!(prompt.contains("## Custom Instructions\nAnswer in French."));
/// ```
#[derive(Debug, Clone)]
pub struct SystemPromptBuilder {
    workdir: PathBuf,
    base: String,
    project_context: Option<String>,
    global_context: Option<String>,
    custom: Option<String>,
    append: Option<String>,
}

impl SystemPromptBuilder {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            base: BASE_SYSTEM_PROMPT.to_string(),
            project_context: None,
            global_context: None,
            custom: None,
            append: None,
        }
    }

    /// Replace the base instructions entirely.
    pub fn with_base_prompt(mut self, prompt: &str) -> Self {
        self.base = prompt.to_string();
        self
    }

    /// Load memory files from the project directory and the global config
    /// directory.
    pub fn with_project_files(mut self, global_dir: &Path) -> Self {
        if let Some((name, body)) = read_context_file(&self.workdir) {
            self.project_context = Some(format!("# Project Context ({})\n{}", name, body));
        }
        if let Some((_, body)) = read_context_file(global_dir) {
            self.global_context = Some(format!("# Global Memory\n{}", body));
        }
        self
    }

    pub fn with_custom_instructions(mut self, text: &str) -> Self {
        if !text.trim().is_empty() {
            self.custom = Some(text.to_string());
        }
        self
    }

    pub fn with_append(mut self, text: &str) -> Self {
        if !text.trim().is_empty() {
            self.append = Some(text.to_string());
        }
        self
    }

    pub fn has_project_context(&self) -> bool {
        self.project_context.is_some() || self.global_context.is_some()
    }

    pub fn build(&self) -> String {
        let mut parts = vec![
            self.base.clone(),
            format!("## Current Working Directory\n{}", self.workdir.display()),
            format!(
                "## Operating System\n{} ({})",
                std::env::consts::OS,
                std::env::consts::ARCH
            ),
        ];

        let memory: Vec<&str> = [&self.project_context, &self.global_context]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .collect();
        if !memory.is_empty() {
            parts.push(memory.join("\n\n---\n\n"));
        }
        if let Some(ref custom) = self.custom {
            parts.push(format!("## Custom Instructions\n{}", custom));
        }
        if let Some(ref append) = self.append {
            parts.push(append.clone());
        }
        parts.join("\n\n")
    }
}

fn read_context_file(dir: &Path) -> Option<(&'static str, String)> {
    PROJECT_CONTEXT_FILES.iter().find_map(|name| {
        let path = dir.join(name);
        match std::fs::read_to_string(&path) {
            Ok(body) => {
                debug!(path = %path.display(), "Loaded context file");
                Some((*name, body))
            }
            Err(_) => None,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::DenyPrompter;
    use tempfile::TempDir;

    #[test]
    fn test_token_usage_accumulates() {
        let usage = TokenUsage::new();
        usage.record(&Usage::new(100, 20));
        usage.record(&Usage::new(50, 5));
        assert_eq!(
            usage.snapshot(),
            UsageSnapshot {
                prompt_tokens: 150,
                completion_tokens: 25,
                total_tokens: 175
            }
        );
    }

    #[test]
    fn test_runtime_context_tool_context() {
        let ctx = RuntimeContext::new(Config::default(), "/work/p", Arc::new(DenyPrompter))
            .with_interactive(true);
        let tool_ctx = ctx.tool_context();
        assert_eq!(tool_ctx.workdir, PathBuf::from("/work/p"));
        assert!(tool_ctx.interactive);
        assert!(Arc::ptr_eq(&tool_ctx.permissions, &ctx.permissions));

        ctx.permissions.enable_god_mode(".");
        assert!(tool_ctx.permissions.is_god_mode());
    }

    #[test]
    fn test_system_prompt_sections() {
        let prompt = SystemPromptBuilder::new("/w")
            .with_custom_instructions("custom")
            .with_append("appended")
            .build();
        assert!(prompt.starts_with("You are CodeCLI"));
        assert!(prompt.contains("## Operating System\n"));
        let custom = prompt.find("## Custom Instructions\ncustom").unwrap();
        let append = prompt.find("appended").unwrap();
        assert!(custom < append);
        assert!(prompt.ends_with("appended"));
    }

    #[test]
    fn test_blank_overrides_ignored() {
        let prompt = SystemPromptBuilder::new("/w").with_custom_instructions("  ").build();
        assert!(!prompt.contains("Custom Instructions"));
    }

    #[test]
    fn test_project_and_global_files() {
        let project = TempDir::new().unwrap();
        let global = TempDir::new().unwrap();
        std::fs::write(project.path().join(".codecli.md"), "use tabs").unwrap();
        std::fs::write(global.path().join("CODECLI.md"), "be kind").unwrap();

        let builder = SystemPromptBuilder::new(project.path()).with_project_files(global.path());
        assert!(builder.has_project_context());
        let prompt = builder.build();
        assert!(prompt.contains("# Project Context (.codecli.md)\nuse tabs\n\n---\n\n# Global Memory\nbe kind"));
    }

    #[test]
    fn test_first_project_file_wins() {
        let project = TempDir::new().unwrap();
        let empty = TempDir::new().unwrap();
        std::fs::write(project.path().join("CODECLI.md"), "first").unwrap();
        std::fs::write(project.path().join("codecli.md"), "second").unwrap();

        let prompt = SystemPromptBuilder::new(project.path())
            .with_project_files(empty.path())
            .build();
        assert!(prompt.contains("# Project Context (CODECLI.md)\nfirst"));
        assert!(!prompt.contains("second"));
        assert!(!prompt.contains("Global Memory"));
    }
}
