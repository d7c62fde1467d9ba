//! Agent loop implementation
//!
//! This module provides the core agent loop that processes messages,
//! calls LLM providers, and executes tools.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::{CompactionConfig, Config};
use crate::error::Result;
use crate::providers::{ChatOptions, LLMProvider, LLMResponse, StreamEvent, ToolDefinition, Usage};
use crate::session::{Checkpoint, Message, SessionStore};
use crate::tools::{ToolRegistry, ToolResult};

use super::compaction::{ContextManager, UsageEstimate};
use super::context::RuntimeContext;

/// Conversations shorter than this are not worth a manual `/compact`.
pub const MIN_MANUAL_COMPACT_MESSAGES: usize = 6;

// ============================================================================
// Settings and outcomes
// ============================================================================

/// Knobs for one [`AgentLoop`], usually taken from [`Config`].
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub max_iterations: u32,
    pub god_mode_max_iterations: u32,
    /// Checkpoint whenever the message count is a multiple of this (0 disables)
    pub checkpoint_interval: usize,
    pub streaming: bool,
    pub temperature: f32,
    pub max_tokens: u32,
    pub system_prompt: String,
    pub compaction: CompactionConfig,
}

impl AgentSettings {
    pub fn from_config(config: &Config, system_prompt: impl Into<String>) -> Self {
        Self {
            max_iterations: config.agent.max_iterations,
            god_mode_max_iterations: config.agent.god_mode_max_iterations,
            checkpoint_interval: config.agent.checkpoint_interval,
            streaming: config.agent.streaming,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            system_prompt: system_prompt.into(),
            compaction: config.compaction.clone(),
        }
    }
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self::from_config(&Config::default(), String::new())
    }
}

/// Result of one turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    /// Text of the last assistant response
    pub content: String,
    /// Model round trips made
    pub iterations: u32,
    /// The turn stopped because the iteration cap was reached
    pub hit_iteration_cap: bool,
    /// Usage summed over every round trip of the turn, if the backend reported any
    pub usage: Option<Usage>,
}

/// Result of a successful compaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionReport {
    pub before: usize,
    pub after: usize,
}

/// Receives progress from a running turn.
///
/// The loop never renders anything itself. Every method has an empty
/// default so observers only implement what they display.
pub trait TurnObserver: Send + Sync {
    /// A chunk of answer text.
    fn on_text(&self, _text: &str) {}

    /// A chunk of reasoning trace.
    fn on_thought(&self, _text: &str) {}

    /// A tool call is about to run.
    fn on_tool_start(&self, _name: &str, _summary: &str) {}

    /// A tool call finished (successfully or not).
    fn on_tool_result(&self, _result: &ToolResult) {}

    /// History was compacted before a model call.
    fn on_compaction(&self, _report: &CompactionReport) {}

    /// Something went wrong but the turn continues.
    fn on_warning(&self, _message: &str) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl TurnObserver for NullObserver {}

// ============================================================================
// Agent loop
// ============================================================================

/// The agent loop: send the conversation to the model, run the tools it
/// asks for, feed the results back, and repeat until it answers in text.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use codecli::agent::{AgentLoop, AgentSettings, NullObserver, RuntimeContext};
/// use codecli::config::Config;
/// use codecli::providers::OllamaProvider;
/// use codecli::security::DenyPrompter;
/// use codecli::session::{Message, SessionStore};
/// use codecli::tools::ToolRegistry;
///
/// let config = Config::default();
/// let ctx = Arc::new(RuntimeContext::new(config.clone(), "/work", Arc::new(DenyPrompter)));
/// let session = SessionStore::new(SessionStore::default_dir(), "/work".into());
/// session.create("ollama").await;
///
/// let agent = AgentLoop::new(
///     Arc::new(OllamaProvider::new("http://localhost:11434", "llama3.2")),
///     ToolRegistry::with_builtins(),
///     session,
///     ctx,
///     AgentSettings::from_config(&config, "You are helpful."),
/// );
/// let outcome = agent.process_message(Message::user("list files"), &NullObserver).await?;
/// println!("{}", outcome.content);
/// ```
pub struct AgentLoop {
    provider: Arc<dyn LLMProvider>,
    tools: ToolRegistry,
    session: SessionStore,
    ctx: Arc<RuntimeContext>,
    settings: AgentSettings,
    context: ContextManager,
}

impl AgentLoop {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        tools: ToolRegistry,
        session: SessionStore,
        ctx: Arc<RuntimeContext>,
        settings: AgentSettings,
    ) -> Self {
        let context = ContextManager::new(provider.context_window(), settings.compaction.clone());
        Self {
            provider,
            tools,
            session,
            ctx,
            settings,
            context,
        }
    }

    pub fn provider(&self) -> &dyn LLMProvider {
        self.provider.as_ref()
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn runtime(&self) -> &Arc<RuntimeContext> {
        &self.ctx
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    /// Round-trip cap for the next turn, depending on God Mode.
    pub fn iteration_cap(&self) -> u32 {
        if self.ctx.permissions.is_god_mode() {
            self.settings.god_mode_max_iterations
        } else {
            self.settings.max_iterations
        }
    }

    /// Run one turn for `message`.
    ///
    /// The session is saved afterwards whether or not the turn succeeded.
    /// Save failures are logged and never fail the turn.
    ///
    /// # Errors
    ///
    /// Returns the provider error when both the streaming request and the
    /// blocking fallback fail. Tool and compaction failures never surface
    /// here.
    pub async fn process_message(
        &self,
        message: Message,
        observer: &dyn TurnObserver,
    ) -> Result<TurnOutcome> {
        let session_id = self.session_id().await.unwrap_or_default();
        let span = info_span!("turn", session = %session_id, provider = %self.provider.name());
        let result = self.run_turn(message, observer).instrument(span).await;

        if let Err(e) = self.session.save().await {
            warn!(error = %e, "Failed to save session");
        }
        result
    }

    async fn run_turn(&self, message: Message, observer: &dyn TurnObserver) -> Result<TurnOutcome> {
        self.session.add_message(message).await;

        let interval = self.settings.checkpoint_interval;
        let count = self.session.message_count().await;
        if interval > 0 && count % interval == 0 {
            let checkpoint = self.session.create_checkpoint(None).await;
            debug!(label = %checkpoint.label, messages = count, "Automatic checkpoint");
        }

        let cap = self.iteration_cap();
        let definitions = self.tools.definitions();
        let tool_ctx = self.ctx.tool_context();

        let mut iterations = 0;
        let mut usage: Option<Usage> = None;
        let mut content = String::new();
        let mut finished = false;

        while iterations < cap {
            iterations += 1;
            debug!(iteration = iterations, cap, "Agent iteration");

            self.compact_if_needed(observer).await;

            let messages = self.session.messages().await;
            let response = self.request(messages, definitions.clone(), observer).await?;

            if let Some(u) = response.usage {
                self.ctx.record_usage(&u);
                usage = Some(usage.map_or(u, |total| total.add(u)));
            }

            let thought = response.thought.clone().unwrap_or_default();
            content = response.content;

            if response.tool_calls.is_empty() {
                self.session
                    .add_message(Message::assistant(&content).with_thought(&thought))
                    .await;
                finished = true;
                break;
            }

            let calls = response.tool_calls;
            self.session
                .add_message(Message::assistant_with_tools(&content, calls.clone()).with_thought(&thought))
                .await;

            for call in &calls {
                observer.on_tool_start(&call.name, &self.tools.summarize_call(call));
                let result = self.tools.execute_call(call, &tool_ctx).await;
                observer.on_tool_result(&result);
                self.session.add_message(result.to_message()).await;
            }
        }

        if !finished {
            warn!(iterations, cap, "Reached maximum tool iterations, ending turn");
            observer.on_warning(&format!(
                "Reached the maximum of {} iterations; stopping this turn",
                cap
            ));
        }

        info!(iterations, finished, "Turn complete");
        Ok(TurnOutcome {
            content,
            iterations,
            hit_iteration_cap: !finished,
            usage,
        })
    }

    /// One model round trip: stream if enabled, falling back once to a
    /// blocking call when streaming fails.
    async fn request(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
        observer: &dyn TurnObserver,
    ) -> Result<LLMResponse> {
        let options = self.chat_options();

        if self.settings.streaming {
            let streamed = match self
                .provider
                .stream(messages.clone(), tools.clone(), options.clone())
                .await
            {
                Ok(rx) => consume_stream(rx, observer).await,
                Err(e) => Err(e),
            };
            match streamed {
                Ok(response) => return Ok(response),
                Err(e) => {
                    warn!(error = %e, "Streaming failed, falling back to blocking chat");
                    observer.on_warning(&format!("Streaming failed ({}), retrying without streaming", e));
                }
            }
        }

        let response = self.provider.chat(messages, tools, options).await?;
        if let Some(ref thought) = response.thought {
            observer.on_thought(thought);
        }
        if !response.content.is_empty() {
            observer.on_text(&response.content);
        }
        Ok(response)
    }

    fn chat_options(&self) -> ChatOptions {
        ChatOptions::new()
            .with_system_prompt(&self.settings.system_prompt)
            .with_max_tokens(self.settings.max_tokens)
            .with_temperature(self.settings.temperature)
    }

    async fn compact_if_needed(&self, observer: &dyn TurnObserver) {
        let messages = self.session.messages().await;
        if !self.context.needs_compaction(&self.settings.system_prompt, &messages) {
            return;
        }
        let estimate = self.context.estimate_usage(&self.settings.system_prompt, &messages);
        crate::log_component!(
            info,
            "context",
            "Context threshold reached, compacting",
            used = estimate.used as u64,
            max = estimate.max as u64
        );
        match self.context.try_compact(&messages, self.provider.as_ref()).await {
            Ok(Some(compacted)) => {
                let report = CompactionReport {
                    before: messages.len(),
                    after: compacted.len(),
                };
                self.session.replace_messages(compacted).await;
                observer.on_compaction(&report);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "Automatic compaction failed");
                observer.on_warning("Context compaction failed; continuing with full history");
            }
        }
    }

    // ------------------------------------------------------------------
    // Session operations used by the interactive commands
    // ------------------------------------------------------------------

    /// Compact on request, regardless of the threshold.
    ///
    /// Returns `Ok(None)` for conversations shorter than
    /// [`MIN_MANUAL_COMPACT_MESSAGES`] or with too little history to
    /// summarize.
    pub async fn manual_compact(&self) -> Result<Option<CompactionReport>> {
        let messages = self.session.messages().await;
        if messages.len() < MIN_MANUAL_COMPACT_MESSAGES {
            return Ok(None);
        }
        let Some(compacted) = self.context.try_compact(&messages, self.provider.as_ref()).await? else {
            return Ok(None);
        };
        let report = CompactionReport {
            before: messages.len(),
            after: compacted.len(),
        };
        self.session.replace_messages(compacted).await;
        Ok(Some(report))
    }

    /// Truncate to a checkpoint. `false` when the id is unknown.
    pub async fn rewind(&self, checkpoint_id: &str) -> bool {
        self.session.rewind_to(checkpoint_id).await
    }

    pub async fn create_checkpoint(&self, label: Option<&str>) -> Checkpoint {
        self.session.create_checkpoint(label).await
    }

    pub async fn checkpoints(&self) -> Vec<Checkpoint> {
        self.session.checkpoints().await
    }

    pub async fn session_id(&self) -> Option<String> {
        self.session.current().await.map(|info| info.id)
    }

    /// Context usage of the current conversation, system prompt included.
    pub async fn estimate_usage(&self) -> UsageEstimate {
        let messages = self.session.messages().await;
        self.context
            .estimate_usage(&self.settings.system_prompt, &messages)
    }
}

/// Drain a stream, forwarding text and thoughts to `observer` as they
/// arrive. A channel that closes without `Done` still yields what came.
async fn consume_stream(
    mut rx: mpsc::Receiver<StreamEvent>,
    observer: &dyn TurnObserver,
) -> Result<LLMResponse> {
    let mut response = LLMResponse::default();
    let mut thought = String::new();
    while let Some(event) = rx.recv().await {
        match event {
            StreamEvent::Delta(text) => {
                observer.on_text(&text);
                response.content.push_str(&text);
            }
            StreamEvent::Thought(text) => {
                observer.on_thought(&text);
                thought.push_str(&text);
            }
            StreamEvent::ToolCalls(calls) => response.tool_calls.extend(calls),
            StreamEvent::Done {
                usage,
                finish_reason,
            } => {
                response.usage = usage;
                response.finish_reason = finish_reason;
                break;
            }
            StreamEvent::Error(e) => return Err(e),
        }
    }
    if !thought.is_empty() {
        response.thought = Some(thought);
    }
    Ok(response)
}
