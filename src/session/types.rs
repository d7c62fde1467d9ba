//! Session types for CodeCLI
//!
//! This module defines the core types for conversation persistence:
//! messages (with plain or structured content), roles, tool calls,
//! checkpoints and the session metadata record.
//!
//! On disk every type uses camelCase field names, e.g.
//!
//! ```text
//! {"role":"assistant","content":"","toolCalls":[{"id":"call_1","name":"read_file","arguments":"{}"}],"timestamp":"..."}
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Session metadata
// ============================================================================

/// Metadata record of a stored conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    /// Globally unique id (UUID v4)
    pub id: String,
    /// Display name (`session-{millis}`)
    pub name: String,
    /// When this session was created
    pub created_at: DateTime<Utc>,
    /// When this session was last saved
    pub updated_at: DateTime<Utc>,
    /// Provider that was active when the session was created
    pub provider: String,
    /// Working directory the session was started in
    pub cwd: String,
}

impl SessionInfo {
    /// Create a fresh session record with a new UUID.
    ///
    /// # Example
    /// ```
    /// use codecli::session::SessionInfo;
    ///
    /// let info = SessionInfo::new("ollama", "/tmp/project");
    /// assert_eq!(info.id.len(), 36);
    /// assert!(info.name.starts_with("session-"));
    /// assert_eq!(info.created_at, info.updated_at);
    /// ```
    pub fn new(provider: &str, cwd: &str) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: format!("session-{}", now.timestamp_millis()),
            created_at: now,
            updated_at: now,
            provider: provider.to_string(),
            cwd: cwd.to_string(),
        }
    }
}

/// An immutable marker into the message sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    /// Unique id (UUID v4)
    pub id: String,
    /// Human-readable label (`checkpoint-{n}` unless given)
    pub label: String,
    /// Number of messages that existed when the checkpoint was taken
    pub message_index: usize,
    /// Creation time
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// Messages
// ============================================================================

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// The role of the message sender
    pub role: Role,
    /// Plain text or structured parts
    #[serde(default)]
    pub content: Content,
    /// Tool calls requested by the assistant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// For tool messages: which call this message answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<ToolResultRef>,
    /// Reasoning trace emitted alongside the answer (some backends only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<String>,
    /// When the message was recorded
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

/// Back-reference from a tool message to the call it answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResultRef {
    /// The tool call id
    pub id: String,
    /// The tool name
    pub name: String,
}

impl Message {
    fn with_role(role: Role, content: Content) -> Self {
        Self {
            role,
            content,
            tool_calls: None,
            tool_result: None,
            thought: None,
            timestamp: Utc::now(),
        }
    }

    /// Create a new user message.
    ///
    /// # Example
    /// ```
    /// use codecli::session::{Message, Role};
    ///
    /// let msg = Message::user("Hello!");
    /// assert_eq!(msg.role, Role::User);
    /// assert_eq!(msg.content.as_text(), Some("Hello!"));
    /// ```
    pub fn user(content: &str) -> Self {
        Self::with_role(Role::User, Content::from(content))
    }

    /// Create a user message made of structured parts (text plus images).
    pub fn user_with_parts(parts: Vec<ContentPart>) -> Self {
        Self::with_role(Role::User, Content::Parts(parts))
    }

    /// Create a new assistant message.
    pub fn assistant(content: &str) -> Self {
        Self::with_role(Role::Assistant, Content::from(content))
    }

    /// Create a new system message.
    pub fn system(content: &str) -> Self {
        Self::with_role(Role::System, Content::from(content))
    }

    /// Create an assistant message carrying tool calls.
    ///
    /// # Example
    /// ```
    /// use codecli::session::{Message, ToolCall};
    ///
    /// let call = ToolCall::new("call_1", "list_directory", "{}");
    /// let msg = Message::assistant_with_tools("", vec![call]);
    /// assert!(msg.has_tool_calls());
    /// ```
    pub fn assistant_with_tools(content: &str, tool_calls: Vec<ToolCall>) -> Self {
        let mut msg = Self::assistant(content);
        msg.tool_calls = Some(tool_calls);
        msg
    }

    /// Create a tool result message.
    ///
    /// # Arguments
    /// * `tool_call_id` - The id of the tool call being answered
    /// * `name` - The tool name
    /// * `content` - JSON-encoded result payload
    pub fn tool_result(tool_call_id: &str, name: &str, content: &str) -> Self {
        let mut msg = Self::with_role(Role::Tool, Content::from(content));
        msg.tool_result = Some(ToolResultRef {
            id: tool_call_id.to_string(),
            name: name.to_string(),
        });
        msg
    }

    /// Attach a reasoning trace (ignored when empty).
    pub fn with_thought(mut self, thought: &str) -> Self {
        if !thought.is_empty() {
            self.thought = Some(thought.to_string());
        }
        self
    }

    /// Check if this message requests at least one tool call.
    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls.as_ref().is_some_and(|tc| !tc.is_empty())
    }

    /// Check if this message is a tool result.
    pub fn is_tool_result(&self) -> bool {
        self.role == Role::Tool && self.tool_result.is_some()
    }

    /// The id of the tool call this message answers, if any.
    pub fn tool_call_id(&self) -> Option<&str> {
        self.tool_result.as_ref().map(|r| r.id.as_str())
    }
}

/// Message content: a plain string or a list of typed parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    /// Plain text
    Text(String),
    /// Structured parts (text and images)
    Parts(Vec<ContentPart>),
}

impl Default for Content {
    fn default() -> Self {
        Content::Text(String::new())
    }
}

impl From<&str> for Content {
    fn from(s: &str) -> Self {
        Content::Text(s.to_string())
    }
}

impl From<String> for Content {
    fn from(s: String) -> Self {
        Content::Text(s)
    }
}

impl Content {
    /// The plain text, if this is plain-text content.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Content::Text(s) => Some(s),
            Content::Parts(_) => None,
        }
    }

    /// Plain text as is; structured parts as their JSON form.
    pub fn to_text_lossy(&self) -> String {
        match self {
            Content::Text(s) => s.clone(),
            Content::Parts(parts) => serde_json::to_string(parts).unwrap_or_default(),
        }
    }

    /// Concatenated text parts, images skipped.
    pub fn text(&self) -> String {
        match self {
            Content::Text(s) => s.clone(),
            Content::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// Whether there is nothing to send.
    pub fn is_empty(&self) -> bool {
        match self {
            Content::Text(s) => s.is_empty(),
            Content::Parts(parts) => parts.is_empty(),
        }
    }
}

/// One structured content part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// A text fragment
    Text { text: String },
    /// An image, referenced by URL (usually a `data:` URL)
    ImageUrl { image_url: ImageUrl },
}

/// Image reference inside a [`ContentPart::ImageUrl`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

impl ContentPart {
    /// Build a text part.
    pub fn text(text: &str) -> Self {
        ContentPart::Text {
            text: text.to_string(),
        }
    }

    /// Build an inline image part from raw base64 data.
    pub fn image_base64(mime_type: &str, data: &str) -> Self {
        ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: format!("data:{};base64,{}", mime_type, data),
            },
        }
    }
}

/// Split a `data:<mime>;base64,<data>` URL into `(mime, data)`.
pub fn split_data_url(url: &str) -> Option<(&str, &str)> {
    let rest = url.strip_prefix("data:")?;
    let (mime, data) = rest.split_once(";base64,")?;
    Some((mime, data))
}

/// The role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions and summaries
    System,
    /// The human user
    User,
    /// The model
    Assistant,
    /// A tool result
    Tool,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    /// Unique identifier for this tool call
    pub id: String,
    /// Name of the tool to call
    pub name: String,
    /// JSON-encoded arguments, exactly as the backend produced them
    pub arguments: String,
    /// Opaque signature some backends require to be echoed back
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought_signature: Option<String>,
}

impl ToolCall {
    /// Create a new tool call.
    ///
    /// # Example
    /// ```
    /// use codecli::session::ToolCall;
    ///
    /// let call = ToolCall::new("call_1", "read_file", r#"{"path": "src/main.rs"}"#);
    /// assert_eq!(call.arguments_value()["path"], "src/main.rs");
    /// ```
    pub fn new(id: &str, name: &str, arguments: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
            thought_signature: None,
        }
    }

    /// Parse the arguments as a JSON object.
    ///
    /// Empty, malformed or non-object arguments degrade to `{}`.
    pub fn arguments_value(&self) -> serde_json::Value {
        match serde_json::from_str::<serde_json::Value>(&self.arguments) {
            Ok(v) if v.is_object() => v,
            _ => serde_json::Value::Object(serde_json::Map::new()),
        }
    }
}
