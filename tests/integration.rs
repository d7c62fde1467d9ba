//! Integration tests for CodeCLI
//!
//! These exercise the public API end to end: the agent loop against a
//! scripted provider, the real tool registry, the permission gate and the
//! session store. No network access is needed.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mockall::mock;
use serde_json::{json, Value};
use tempfile::{tempdir, TempDir};
use tokio::sync::mpsc;

use codecli::agent::{AgentLoop, AgentSettings, ContextManager, NullObserver, RuntimeContext};
use codecli::config::{CompactionConfig, Config, PermissionsConfig};
use codecli::error::{ProviderError, Result};
use codecli::providers::{ChatOptions, LLMProvider, LLMResponse, StreamEvent, ToolDefinition};
use codecli::security::{
    DenyPrompter, PermissionChoice, PermissionGate, PermissionPrompter, PermissionRequest,
};
use codecli::session::{Message, Role, SessionStore, ToolCall};
use codecli::tools::{Tool, ToolContext, ToolOutput, ToolRegistry};

// ============================================================================
// Helpers
// ============================================================================

mock! {
    Prompter {}

    #[async_trait]
    impl PermissionPrompter for Prompter {
        async fn prompt(&self, request: &PermissionRequest) -> PermissionChoice;
    }
}

/// Provider that answers blocking requests from a queue and refuses to
/// stream.
struct QueueProvider {
    replies: Mutex<VecDeque<Result<LLMResponse>>>,
    window: usize,
}

impl QueueProvider {
    fn new(replies: Vec<Result<LLMResponse>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            window: 8192,
        }
    }
}

#[async_trait]
impl LLMProvider for QueueProvider {
    async fn chat(
        &self,
        _messages: Vec<Message>,
        _tools: Vec<ToolDefinition>,
        _options: ChatOptions,
    ) -> Result<LLMResponse> {
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(LLMResponse::text("done")))
    }

    async fn stream(
        &self,
        _messages: Vec<Message>,
        _tools: Vec<ToolDefinition>,
        _options: ChatOptions,
    ) -> Result<mpsc::Receiver<StreamEvent>> {
        Err(ProviderError::from_status(501, "streaming not scripted").into())
    }

    async fn list_models(&self) -> Vec<String> {
        vec!["queue".into()]
    }

    fn format_tools(&self, _tools: &[ToolDefinition]) -> Value {
        Value::Null
    }

    fn name(&self) -> &str {
        "queue"
    }

    fn model(&self) -> &str {
        "queue-model"
    }

    fn context_window(&self) -> usize {
        self.window
    }
}

fn gate(dir: &Path, prompter: impl PermissionPrompter + 'static) -> PermissionGate {
    PermissionGate::new(PermissionsConfig::default(), Arc::new(prompter)).with_workdir(dir)
}

async fn agent_in(dir: &TempDir, provider: QueueProvider) -> AgentLoop {
    let ctx = RuntimeContext::new(Config::default(), dir.path(), Arc::new(DenyPrompter));
    let session = SessionStore::new(dir.path().join("sessions"), dir.path().to_path_buf());
    session.create("queue").await;
    let settings = AgentSettings {
        streaming: false,
        ..AgentSettings::default()
    };
    AgentLoop::new(
        Arc::new(provider),
        ToolRegistry::with_builtins(),
        session,
        Arc::new(ctx),
        settings,
    )
}

// ============================================================================
// Session Checkpoints
// ============================================================================

#[tokio::test]
async fn test_rewind_restores_length_and_drops_later_checkpoints() {
    let dir = tempdir().unwrap();
    let store = SessionStore::new(dir.path().join("sessions"), dir.path().to_path_buf());
    store.create("ollama").await;

    let mut checkpoints = Vec::new();
    for i in 0..12 {
        store.add_message(Message::user(&format!("message {}", i))).await;
        if i % 3 == 2 {
            checkpoints.push(store.create_checkpoint(None).await);
        }
    }
    assert_eq!(checkpoints.len(), 4);

    let target = &checkpoints[1];
    assert!(store.rewind_to(&target.id).await);

    assert_eq!(store.message_count().await, target.message_index);
    let remaining = store.checkpoints().await;
    assert!(remaining.iter().all(|c| c.message_index <= target.message_index));
    assert_eq!(remaining.last().map(|c| c.id.as_str()), Some(target.id.as_str()));
}

#[tokio::test]
async fn test_session_survives_save_and_load() {
    let dir = tempdir().unwrap();
    let sessions = dir.path().join("sessions");
    let store = SessionStore::new(sessions.clone(), dir.path().to_path_buf());
    let info = store.create("gemini").await;
    store.add_message(Message::user("hello")).await;
    store.add_message(Message::assistant("hi there")).await;
    store.save().await.unwrap();

    let reopened = SessionStore::new(sessions, dir.path().to_path_buf());
    let loaded = reopened.load_local().await.unwrap();
    assert_eq!(loaded.id, info.id);
    let messages = reopened.messages().await;
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].content.text(), "hi there");
}

// ============================================================================
// Tool Batches
// ============================================================================

struct FailingTool;

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &str {
        "explode"
    }
    fn description(&self) -> &str {
        "Always fails"
    }
    fn parameters(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }
    async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<ToolOutput> {
        Err(codecli::CodeCliError::Tool("kaboom".into()))
    }
}

#[tokio::test]
async fn test_batch_yields_one_result_per_call_in_order() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("notes.txt"), "one\ntwo\n").unwrap();

    let mut registry = ToolRegistry::with_builtins();
    registry.register(Box::new(FailingTool));
    let ctx = ToolContext::new(dir.path(), Arc::new(gate(dir.path(), DenyPrompter)));

    let calls = vec![
        ToolCall::new("c1", "read_file", r#"{"path":"notes.txt"}"#),
        ToolCall::new("c2", "explode", "{}"),
        ToolCall::new("c3", "no_such_tool", "{}"),
        ToolCall::new("c4", "list_directory", "not json at all"),
        ToolCall::new("c5", "write_file", r#"{"path":"out.txt","content":"x"}"#),
    ];
    let results = registry.execute_tool_calls(&calls, &ctx).await;

    assert_eq!(results.len(), calls.len());
    for (call, result) in calls.iter().zip(&results) {
        assert_eq!(result.tool_call_id, call.id);
        assert_eq!(result.name, call.name);
    }
    assert!(!results[0].is_error);
    assert_eq!(results[1].content, r#"{"error":"kaboom"}"#);
    assert!(results[2].is_error);
    // Malformed arguments are treated as {} so the listing still runs.
    assert!(!results[3].is_error);
    // Writes need approval and the prompter denies.
    assert_eq!(results[4].content, r#"{"error":"Permission denied"}"#);
    assert!(!dir.path().join("out.txt").exists());
}

// ============================================================================
// Compaction
// ============================================================================

fn long_conversation(count: usize, chars: usize) -> Vec<Message> {
    (0..count)
        .map(|i| {
            let body = format!("{} {}", i, "x".repeat(chars));
            if i % 2 == 0 {
                Message::user(&body)
            } else {
                Message::assistant(&body)
            }
        })
        .collect()
}

#[tokio::test]
async fn test_failed_compaction_returns_original_messages() {
    let manager = ContextManager::new(8192, CompactionConfig::default());
    let messages = long_conversation(10, 2600);
    let provider = QueueProvider::new(vec![Err(ProviderError::from_status(500, "down").into())]);

    let result = manager.compact(&messages, &provider).await;
    assert_eq!(result, messages);
}

#[tokio::test]
async fn test_scenario_b_compaction_keeps_recent_tail() {
    let manager = ContextManager::new(8192, CompactionConfig::default());
    let messages = long_conversation(10, 2600);

    let usage = manager.estimate_usage("", &messages);
    assert!(usage.percentage >= 75.0, "usage was {}%", usage.percentage);
    assert!(manager.needs_compaction("", &messages));

    let provider = QueueProvider::new(vec![Ok(LLMResponse::text("Refactoring the parser."))]);
    let compacted = manager.compact(&messages, &provider).await;

    assert!(compacted.len() < messages.len());
    assert_eq!(compacted[0].role, Role::System);
    assert_eq!(
        compacted[0].content.text(),
        "## Previous Conversation Summary\nRefactoring the parser."
    );
    assert_eq!(&compacted[compacted.len() - 4..], &messages[messages.len() - 4..]);
    assert!(!manager.needs_compaction("", &compacted));
}

// ============================================================================
// Permissions
// ============================================================================

#[tokio::test]
async fn test_session_allow_is_remembered() {
    let dir = tempdir().unwrap();
    let mut prompter = MockPrompter::new();
    prompter
        .expect_prompt()
        .withf(|req| req.key() == "write:/tmp/a.txt")
        .times(1)
        .returning(|_| PermissionChoice::AllowSession);
    let gate = gate(dir.path(), prompter);

    assert!(gate.check_write("/tmp/a.txt").await);
    assert!(gate.check_write("/tmp/a.txt").await);
}

#[tokio::test]
async fn test_deny_is_remembered() {
    let dir = tempdir().unwrap();
    let mut prompter = MockPrompter::new();
    prompter
        .expect_prompt()
        .times(1)
        .returning(|_| PermissionChoice::Deny);
    let gate = gate(dir.path(), prompter);

    assert!(!gate.check_write("/tmp/a.txt").await);
    assert!(!gate.check_write("/tmp/a.txt").await);
}

#[tokio::test]
async fn test_god_mode_scopes_writes_to_root() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("project");
    std::fs::create_dir_all(&root).unwrap();

    let mut prompter = MockPrompter::new();
    // Only the path outside the root reaches the prompter.
    prompter
        .expect_prompt()
        .withf(|req| req.target.ends_with("project2/x.txt"))
        .times(1)
        .returning(|_| PermissionChoice::Deny);
    let gate = gate(dir.path(), prompter);
    gate.enable_god_mode("project");

    assert!(gate.check_write("project/src/main.rs").await);
    assert!(gate.check_write(&root.join("deep/nested/file.txt").display().to_string()).await);
    assert!(!gate.check_write("project2/x.txt").await);
}

// ============================================================================
// Agent Loop
// ============================================================================

#[tokio::test]
async fn test_scenario_a_list_files() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("Cargo.toml"), "[package]\n").unwrap();
    std::fs::create_dir(dir.path().join("src")).unwrap();

    let provider = QueueProvider::new(vec![
        Ok(LLMResponse::with_tools(
            "",
            vec![ToolCall::new("call_1", "list_directory", "{}")],
        )),
        Ok(LLMResponse::text("There is a Cargo.toml and a src directory.")),
    ]);
    let agent = agent_in(&dir, provider).await;

    let outcome = agent
        .process_message(Message::user("list files"), &NullObserver)
        .await
        .unwrap();
    assert_eq!(outcome.content, "There is a Cargo.toml and a src directory.");
    assert_eq!(outcome.iterations, 2);
    assert!(!outcome.hit_iteration_cap);

    let messages = agent.session().messages().await;
    let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]
    );
    assert!(messages[1].has_tool_calls());
    assert_eq!(messages[2].tool_call_id(), Some("call_1"));

    let payload: Value = serde_json::from_str(&messages[2].content.text()).unwrap();
    let names: Vec<&str> = payload["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"Cargo.toml"));
    assert!(names.contains(&"src"));
}

#[tokio::test]
async fn test_transport_failure_surfaces_after_fallback() {
    let dir = tempdir().unwrap();
    let provider = QueueProvider::new(vec![Err(ProviderError::from_status(401, "bad key").into())]);
    let ctx = RuntimeContext::new(Config::default(), dir.path(), Arc::new(DenyPrompter));
    let sessions = dir.path().join("sessions");
    let session = SessionStore::new(sessions.clone(), dir.path().to_path_buf());
    let info = session.create("queue").await;
    // Streaming is on, so the failed stream falls back to the blocking call.
    let agent = AgentLoop::new(
        Arc::new(provider),
        ToolRegistry::with_builtins(),
        session,
        Arc::new(ctx),
        AgentSettings::default(),
    );

    let err = agent
        .process_message(Message::user("hello"), &NullObserver)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("401"), "unexpected error: {}", err);

    // The user message is still persisted.
    assert!(sessions.join(format!("{}.json", info.id)).exists());
    assert_eq!(agent.session().message_count().await, 1);
}

// ============================================================================
// Shell
// ============================================================================

#[cfg(unix)]
#[tokio::test]
async fn test_scenario_c_shell_timeout() {
    let dir = tempdir().unwrap();
    let config = PermissionsConfig {
        auto_approve_execute: true,
        ..PermissionsConfig::default()
    };
    let gate = PermissionGate::new(config, Arc::new(DenyPrompter)).with_workdir(dir.path());
    let ctx = ToolContext::new(dir.path(), Arc::new(gate));
    let registry = ToolRegistry::with_builtins();

    let call = ToolCall::new("c1", "run_command", r#"{"command":"sleep 5","timeout":200}"#);
    let result = registry.execute_call(&call, &ctx).await;

    let payload: Value = serde_json::from_str(&result.content).unwrap();
    assert_eq!(payload["timedOut"], true);
    assert_eq!(payload["success"], false);
    assert_ne!(payload["exitCode"].as_i64().unwrap(), 0);
    assert_eq!(result.detail.as_deref(), Some("timed out"));
}
