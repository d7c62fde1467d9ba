//! Provider types for CodeCLI
//!
//! This module defines the core types and traits for LLM providers,
//! including the `LLMProvider` trait, chat options, response types and the
//! typed events a streaming request yields.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{CodeCliError, Result};
use crate::session::{Message, ToolCall};

/// Default generation limit when [`ChatOptions::max_tokens`] is unset.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Default sampling temperature when [`ChatOptions::temperature`] is unset.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Capacity of the channel a streaming request writes into.
pub const STREAM_CHANNEL_CAPACITY: usize = 32;

/// Definition of a tool that can be called by the LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The name of the tool (must be unique)
    pub name: String,
    /// Human-readable description of what the tool does
    pub description: String,
    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    /// Create a new tool definition.
    ///
    /// # Arguments
    /// * `name` - Unique identifier for the tool
    /// * `description` - Human-readable description
    /// * `parameters` - JSON Schema for the tool's parameters
    ///
    /// # Example
    /// ```
    /// use codecli::providers::ToolDefinition;
    /// use serde_json::json;
    ///
    /// let tool = ToolDefinition::new(
    ///     "read_file",
    ///     "Read the contents of a file",
    ///     json!({
    ///         "type": "object",
    ///         "properties": {
    ///             "path": { "type": "string", "description": "File path" }
    ///         },
    ///         "required": ["path"]
    ///     }),
    /// );
    /// assert_eq!(tool.name, "read_file");
    /// ```
    pub fn new(name: &str, description: &str, parameters: serde_json::Value) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters,
        }
    }
}

/// Trait for LLM backends (Azure OpenAI, Ollama, Gemini).
///
/// A provider translates between CodeCLI's message format and one vendor's
/// wire format. The agent loop depends only on this trait.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Send a blocking chat completion request.
    ///
    /// # Arguments
    /// * `messages` - The conversation history
    /// * `tools` - Available tools the LLM can call
    /// * `options` - System prompt, temperature and token limit
    async fn chat(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
        options: ChatOptions,
    ) -> Result<LLMResponse>;

    /// Send a streaming chat request.
    ///
    /// Returns a receiver yielding [`StreamEvent`]s in emission order. Text
    /// deltas come first, then at most one `ToolCalls` event with fully
    /// reassembled calls, then `Done`. An `Error` event ends the sequence
    /// in place of `Done`.
    ///
    /// # Errors
    ///
    /// Returns an error when the request cannot be sent or the backend
    /// answers with a non-success status.
    async fn stream(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
        options: ChatOptions,
    ) -> Result<mpsc::Receiver<StreamEvent>>;

    /// Model names this backend can serve.
    async fn list_models(&self) -> Vec<String>;

    /// Render tool definitions in this backend's native schema format.
    fn format_tools(&self, tools: &[ToolDefinition]) -> serde_json::Value;

    /// Provider identifier ("azure-openai", "ollama", "gemini").
    fn name(&self) -> &str;

    /// The model requests are sent to.
    fn model(&self) -> &str;

    /// Context window of the active model, in tokens.
    fn context_window(&self) -> usize {
        super::models::context_window(self.model())
    }
}

/// Options for chat completion requests.
///
/// Use the builder pattern to construct options.
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    /// System prompt sent ahead of the conversation
    pub system_prompt: Option<String>,
    /// Maximum number of tokens to generate
    pub max_tokens: Option<u32>,
    /// Temperature for sampling (0.0 = deterministic, 1.0 = creative)
    pub temperature: Option<f32>,
}

impl ChatOptions {
    /// Create new default chat options.
    ///
    /// # Example
    /// ```
    /// use codecli::providers::ChatOptions;
    ///
    /// let options = ChatOptions::new();
    /// assert!(options.system_prompt.is_none());
    /// assert_eq!(options.max_tokens_or_default(), 4096);
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the system prompt.
    pub fn with_system_prompt(mut self, prompt: &str) -> Self {
        self.system_prompt = Some(prompt.to_string());
        self
    }

    /// Set the maximum number of tokens to generate.
    ///
    /// # Example
    /// ```
    /// use codecli::providers::ChatOptions;
    ///
    /// let options = ChatOptions::new().with_max_tokens(1000);
    /// assert_eq!(options.max_tokens, Some(1000));
    /// ```
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the temperature for sampling.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// `max_tokens`, or 4096.
    pub fn max_tokens_or_default(&self) -> u32 {
        self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)
    }

    /// `temperature`, or 0.7.
    pub fn temperature_or_default(&self) -> f32 {
        self.temperature.unwrap_or(DEFAULT_TEMPERATURE)
    }

    /// The system prompt, if set and non-blank.
    pub fn system(&self) -> Option<&str> {
        self.system_prompt
            .as_deref()
            .filter(|s| !s.trim().is_empty())
    }
}

/// Response from a blocking chat request.
#[derive(Debug, Clone, Default)]
pub struct LLMResponse {
    /// Text content of the response
    pub content: String,
    /// Tool calls made by the LLM (if any)
    pub tool_calls: Vec<ToolCall>,
    /// Token usage information (if available)
    pub usage: Option<Usage>,
    /// Why generation stopped ("stop", "tool_calls", "length", ...)
    pub finish_reason: Option<String>,
    /// Reasoning trace, for backends that emit one
    pub thought: Option<String>,
}

impl LLMResponse {
    /// Create a simple text response with no tool calls.
    ///
    /// # Example
    /// ```
    /// use codecli::providers::LLMResponse;
    ///
    /// let response = LLMResponse::text("Hello, world!");
    /// assert_eq!(response.content, "Hello, world!");
    /// assert!(!response.has_tool_calls());
    /// ```
    pub fn text(content: &str) -> Self {
        Self {
            content: content.to_string(),
            finish_reason: Some("stop".to_string()),
            ..Default::default()
        }
    }

    /// Create a response with tool calls.
    ///
    /// # Example
    /// ```
    /// use codecli::providers::LLMResponse;
    /// use codecli::session::ToolCall;
    ///
    /// let call = ToolCall::new("call_1", "list_directory", "{}");
    /// let response = LLMResponse::with_tools("", vec![call]);
    /// assert!(response.has_tool_calls());
    /// ```
    pub fn with_tools(content: &str, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content: content.to_string(),
            tool_calls,
            finish_reason: Some("tool_calls".to_string()),
            ..Default::default()
        }
    }

    /// Check if this response contains any tool calls.
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Set usage information for this response.
    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// Token usage information from a completion request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    /// Number of tokens in the prompt
    pub prompt_tokens: u32,
    /// Number of tokens in the completion
    pub completion_tokens: u32,
    /// Total tokens used (prompt + completion)
    pub total_tokens: u32,
}

impl Usage {
    /// Create new usage information.
    ///
    /// # Example
    /// ```
    /// use codecli::providers::Usage;
    ///
    /// let usage = Usage::new(100, 50);
    /// assert_eq!(usage.total_tokens, 150);
    /// ```
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }

    /// Sum two usage records.
    pub fn add(self, other: Usage) -> Usage {
        Usage::new(
            self.prompt_tokens.saturating_add(other.prompt_tokens),
            self.completion_tokens.saturating_add(other.completion_tokens),
        )
    }
}

/// One event of a streaming response.
#[derive(Debug)]
pub enum StreamEvent {
    /// A chunk of answer text
    Delta(String),
    /// A chunk of reasoning trace
    Thought(String),
    /// The fully reassembled tool calls (emitted at most once)
    ToolCalls(Vec<ToolCall>),
    /// End of stream
    Done {
        usage: Option<Usage>,
        finish_reason: Option<String>,
    },
    /// The stream failed mid-flight
    Error(CodeCliError),
}

/// Drain a stream into a single response.
///
/// Deltas and thoughts are concatenated in order. A receiver that closes
/// without `Done` still yields what was collected; an `Error` event is
/// returned as the error.
pub async fn collect_stream(mut rx: mpsc::Receiver<StreamEvent>) -> Result<LLMResponse> {
    let mut response = LLMResponse::default();
    let mut thought = String::new();
    while let Some(event) = rx.recv().await {
        match event {
            StreamEvent::Delta(text) => response.content.push_str(&text),
            StreamEvent::Thought(text) => thought.push_str(&text),
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
