//! Ollama Provider Implementation
//!
//! Talks to a local Ollama server through `/api/chat`. Streaming responses
//! are newline-delimited JSON objects, the last one carrying `done: true`
//! and the token counts.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::session::{Message, Role, ToolCall};

use super::models::OLLAMA_FALLBACK_MODELS;
use super::sse::{SseLineBuffer, ToolCallAssembler};
use super::{
    read_json, send_checked, transport_error, ChatOptions, LLMProvider, LLMResponse, StreamEvent,
    ToolDefinition, Usage, STREAM_CHANNEL_CAPACITY,
};

// ============================================================================
// Ollama API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    options: OllamaOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Serialize)]
struct OllamaMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OllamaToolCallRequest>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct OllamaToolCallRequest {
    id: String,
    r#type: &'static str,
    function: OllamaFunctionRequest,
}

#[derive(Debug, Serialize)]
struct OllamaFunctionRequest {
    name: String,
    /// Ollama expects an object here, not a JSON string
    arguments: serde_json::Value,
}

/// A non-streaming response, and also every line of a streaming one.
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: Option<OllamaResponseMessage>,
    #[serde(default)]
    done: bool,
    done_reason: Option<String>,
    prompt_eval_count: Option<u32>,
    eval_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OllamaResponseMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    thinking: Option<String>,
    #[serde(default)]
    tool_calls: Vec<OllamaToolCallResponse>,
}

#[derive(Debug, Deserialize)]
struct OllamaToolCallResponse {
    function: OllamaFunctionResponse,
}

#[derive(Debug, Deserialize)]
struct OllamaFunctionResponse {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct OllamaTags {
    #[serde(default)]
    models: Vec<OllamaModelTag>,
}

#[derive(Debug, Deserialize)]
struct OllamaModelTag {
    name: String,
}

impl OllamaResponse {
    fn usage(&self) -> Usage {
        Usage::new(
            self.prompt_eval_count.unwrap_or(0),
            self.eval_count.unwrap_or(0),
        )
    }
}

// ============================================================================
// Ollama Provider
// ============================================================================

/// Ollama LLM provider.
pub struct OllamaProvider {
    host: String,
    model: String,
    client: Client,
}

impl OllamaProvider {
    /// Create a new Ollama provider.
    ///
    /// # Example
    /// ```
    /// use codecli::providers::{LLMProvider, OllamaProvider};
    ///
    /// let provider = OllamaProvider::new("http://localhost:11434/", "llama3.2");
    /// assert_eq!(provider.name(), "ollama");
    /// assert_eq!(provider.context_window(), 131_072);
    /// ```
    pub fn new(host: &str, model: &str) -> Self {
        Self::with_client(host, model, Client::new())
    }

    /// Create a provider with a custom HTTP client.
    pub fn with_client(host: &str, model: &str, client: Client) -> Self {
        Self {
            host: host.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
        }
    }

    fn build_request(
        &self,
        messages: Vec<Message>,
        tools: &[ToolDefinition],
        options: &ChatOptions,
        stream: bool,
    ) -> OllamaRequest {
        OllamaRequest {
            model: self.model.clone(),
            messages: convert_messages(messages, options.system()),
            stream,
            options: OllamaOptions {
                temperature: options.temperature_or_default(),
                num_predict: options.max_tokens_or_default(),
            },
            tools: (!tools.is_empty()).then(|| self.format_tools(tools)),
        }
    }

    async fn post(&self, request: &OllamaRequest) -> Result<reqwest::Response> {
        debug!(model = %self.model, stream = request.stream, "Ollama request");
        send_checked(
            self.client
                .post(format!("{}/api/chat", self.host))
                .json(request),
        )
        .await
    }
}

// ============================================================================
// Conversion Functions
// ============================================================================

fn convert_messages(messages: Vec<Message>, system_prompt: Option<&str>) -> Vec<OllamaMessage> {
    let mut out = Vec::with_capacity(messages.len() + 1);
    if let Some(system) = system_prompt {
        out.push(OllamaMessage {
            role: "system",
            content: system.to_string(),
            images: Vec::new(),
            tool_calls: None,
            tool_call_id: None,
        });
    }

    for msg in messages {
        let role = match msg.role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };

        let images = match &msg.content {
            crate::session::Content::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    crate::session::ContentPart::ImageUrl { image_url } => {
                        crate::session::split_data_url(&image_url.url).map(|(_, data)| data.to_string())
                    }
                    _ => None,
                })
                .collect(),
            crate::session::Content::Text(_) => Vec::new(),
        };

        let content = if msg.role == Role::Tool {
            msg.content.to_text_lossy()
        } else {
            msg.content.text()
        };

        let tool_calls = msg.tool_calls.filter(|tc| !tc.is_empty()).map(|tcs| {
            tcs.iter()
                .map(|tc| OllamaToolCallRequest {
                    id: tc.id.clone(),
                    r#type: "function",
                    function: OllamaFunctionRequest {
                        name: tc.name.clone(),
                        arguments: tc.arguments_value(),
                    },
                })
                .collect()
        });

        out.push(OllamaMessage {
            role,
            content,
            images,
            tool_calls,
            tool_call_id: msg.tool_result.map(|r| r.id),
        });
    }
    out
}

/// Ollama does not assign call ids; synthesize `call_{millis}_{i}`.
fn convert_tool_calls(calls: Vec<OllamaToolCallResponse>) -> Vec<ToolCall> {
    let millis = chrono::Utc::now().timestamp_millis();
    calls
        .into_iter()
        .enumerate()
        .map(|(i, tc)| {
            let args = if tc.function.arguments.is_null() {
                "{}".to_string()
            } else {
                tc.function.arguments.to_string()
            };
            ToolCall::new(&format!("call_{}_{}", millis, i), &tc.function.name, &args)
        })
        .collect()
}

fn convert_response(response: OllamaResponse) -> LLMResponse {
    let usage = response.usage();
    let finish_reason = Some(response.done_reason.unwrap_or_else(|| "stop".to_string()));
    let (content, thought, tool_calls) = match response.message {
        Some(m) => (m.content, m.thinking, convert_tool_calls(m.tool_calls)),
        None => (String::new(), None, Vec::new()),
    };
    LLMResponse {
        content,
        tool_calls,
        usage: Some(usage),
        finish_reason,
        thought: thought.filter(|t| !t.is_empty()),
    }
}

// ============================================================================
// LLMProvider Implementation
// ============================================================================

#[async_trait]
impl LLMProvider for OllamaProvider {
    async fn chat(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
        options: ChatOptions,
    ) -> Result<LLMResponse> {
        let request = self.build_request(messages, &tools, &options, false);
        let response = self.post(&request).await?;
        let body: OllamaResponse = read_json(response).await?;
        info!(model = %self.model, "Ollama response received");
        Ok(convert_response(body))
    }

    async fn stream(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
        options: ChatOptions,
    ) -> Result<mpsc::Receiver<StreamEvent>> {
        let request = self.build_request(messages, &tools, &options, true);
        let response = self.post(&request).await?;

        let (tx, rx) = mpsc::channel::<StreamEvent>(STREAM_CHANNEL_CAPACITY);
        let byte_stream = response.bytes_stream();

        tokio::spawn(async move {
            let mut lines = SseLineBuffer::new();
            let mut assembler = ToolCallAssembler::new();
            let mut usage: Option<Usage> = None;
            let mut finish_reason: Option<String> = None;

            tokio::pin!(byte_stream);

            let mut handle_line = |line: &str, events: &mut Vec<StreamEvent>| -> bool {
                let line = line.trim();
                if line.is_empty() {
                    return false;
                }
                let frame: OllamaResponse = match serde_json::from_str(line) {
                    Ok(f) => f,
                    Err(e) => {
                        debug!(error = %e, "Skipping malformed NDJSON line");
                        return false;
                    }
                };
                if let Some(message) = &frame.message {
                    if let Some(thinking) = message.thinking.as_ref().filter(|t| !t.is_empty()) {
                        events.push(StreamEvent::Thought(thinking.clone()));
                    }
                    if !message.content.is_empty() {
                        events.push(StreamEvent::Delta(message.content.clone()));
                    }
                }
                let done = frame.done;
                if done {
                    usage = Some(frame.usage());
                    finish_reason = Some(
                        frame
                            .done_reason
                            .clone()
                            .unwrap_or_else(|| "stop".to_string()),
                    );
                }
                if let Some(message) = frame.message {
                    for call in convert_tool_calls(message.tool_calls) {
                        assembler.push_complete(call);
                    }
                }
                done
            };

            let mut finished = false;
            while let Some(chunk_result) = byte_stream.next().await {
                let chunk = match chunk_result {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let _ = tx.send(StreamEvent::Error(transport_error(e).into())).await;
                        return;
                    }
                };
                let mut events = Vec::new();
                for line in lines.push(&chunk) {
                    finished |= handle_line(&line, &mut events);
                }
                for event in events {
                    if tx.send(event).await.is_err() {
                        return;
                    }
                }
                if finished {
                    break;
                }
            }
            if !finished {
                if let Some(tail) = lines.finish() {
                    let mut events = Vec::new();
                    handle_line(&tail, &mut events);
                    for event in events {
                        if tx.send(event).await.is_err() {
                            return;
                        }
                    }
                }
            }

            if !assembler.is_empty() {
                let calls = assembler.finish();
                if tx.send(StreamEvent::ToolCalls(calls)).await.is_err() {
                    return;
                }
            }
            let _ = tx
                .send(StreamEvent::Done {
                    usage,
                    finish_reason,
                })
                .await;
        });

        Ok(rx)
    }

    async fn list_models(&self) -> Vec<String> {
        let fallback = || OLLAMA_FALLBACK_MODELS.iter().map(|m| m.to_string()).collect();
        let response = match send_checked(self.client.get(format!("{}/api/tags", self.host))).await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "Could not list Ollama models, using defaults");
                return fallback();
            }
        };
        match read_json::<OllamaTags>(response).await {
            Ok(tags) => tags.models.into_iter().map(|m| m.name).collect(),
            Err(_) => fallback(),
        }
    }

    fn format_tools(&self, tools: &[ToolDefinition]) -> serde_json::Value {
        serde_json::Value::Array(
            tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect(),
        )
    }

    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::collect_stream;
    use crate::providers::test_server::{serve, CannedResponse};
    use crate::session::ContentPart;
    use serde_json::json;

    #[test]
    fn test_assistant_tool_arguments_sent_as_objects() {
        let call = ToolCall::new("c1", "read_file", r#"{"path":"a.rs"}"#);
        let out = convert_messages(vec![Message::assistant_with_tools("", vec![call])], None);
        let value = serde_json::to_value(&out).unwrap();
        assert_eq!(value[0]["tool_calls"][0]["function"]["arguments"], json!({"path": "a.rs"}));
    }

    #[test]
    fn test_images_extracted_from_parts() {
        let msg = Message::user_with_parts(vec![
            ContentPart::text("describe"),
            ContentPart::image_base64("image/jpeg", "QUJD"),
        ]);
        let out = convert_messages(vec![msg], Some("sys"));
        assert_eq!(out[0].role, "system");
        assert_eq!(out[1].content, "describe");
        assert_eq!(out[1].images, vec!["QUJD".to_string()]);
    }

    #[test]
    fn test_convert_response_synthesizes_ids() {
        let response: OllamaResponse = serde_json::from_value(json!({
            "message": {"content": "", "tool_calls": [
                {"function": {"name": "list_directory", "arguments": {}}},
                {"function": {"name": "read_file", "arguments": {"path": "x"}}}
            ]},
            "done": true,
            "prompt_eval_count": 20,
            "eval_count": 5
        }))
        .unwrap();
        let out = convert_response(response);
        assert_eq!(out.tool_calls.len(), 2);
        assert!(out.tool_calls[0].id.starts_with("call_"));
        assert!(out.tool_calls[1].id.ends_with("_1"));
        assert_eq!(out.tool_calls[1].arguments, r#"{"path":"x"}"#);
        assert_eq!(out.usage, Some(Usage::new(20, 5)));
        assert_eq!(out.finish_reason.as_deref(), Some("stop"));
    }

    #[tokio::test]
    async fn test_stream_ndjson_split_lines() {
        let chunks: Vec<&[u8]> = vec![
            b"{\"message\":{\"content\":\"Hi \"},\"done\":false}\n{\"message\":{\"con",
            b"tent\":\"there\"},\"done\":false}\n",
            b"{\"message\":{\"content\":\"\",\"tool_calls\":[{\"function\":{\"name\":\"list_directory\",\"arguments\":{}}}]},\"done\":false}\n",
            b"{\"message\":{\"content\":\"\"},\"done\":true,\"done_reason\":\"stop\",\"prompt_eval_count\":7,\"eval_count\":2}\n",
        ];
        let (base, _rx) = serve(vec![CannedResponse::chunked("application/x-ndjson", chunks)]).await;
        let provider = OllamaProvider::new(&base, "llama3.2");
        let rx = provider
            .stream(vec![Message::user("hi")], vec![], ChatOptions::default())
            .await
            .unwrap();
        let response = collect_stream(rx).await.unwrap();
        assert_eq!(response.content, "Hi there");
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].arguments, "{}");
        assert_eq!(response.usage, Some(Usage::new(7, 2)));
    }

    #[tokio::test]
    async fn test_list_models_from_tags() {
        let body = json!({"models": [{"name": "qwen3:8b"}, {"name": "llama3.2:latest"}]});
        let (base, _rx) = serve(vec![CannedResponse::json(200, &body.to_string())]).await;
        let models = OllamaProvider::new(&base, "llama3.2").list_models().await;
        assert_eq!(models, vec!["qwen3:8b", "llama3.2:latest"]);
    }

    #[tokio::test]
    async fn test_list_models_falls_back_on_error() {
        let (base, _rx) = serve(vec![CannedResponse::json(500, "boom")]).await;
        let models = OllamaProvider::new(&base, "llama3.2").list_models().await;
        assert_eq!(models.len(), OLLAMA_FALLBACK_MODELS.len());
    }

    #[tokio::test]
    async fn test_chat_http_error() {
        let (base, _rx) = serve(vec![CannedResponse::json(404, "model not found")]).await;
        let err = OllamaProvider::new(&base, "nope")
            .chat(vec![Message::user("x")], vec![], ChatOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("404"));
    }
}
