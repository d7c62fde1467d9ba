//! Azure OpenAI Provider Implementation
//!
//! This module implements the `LLMProvider` trait for Azure OpenAI chat
//! deployments, handling message conversion, tool calls, SSE streaming and
//! response parsing.
//!
//! # Example
//!
//! ```rust,ignore
//! use codecli::providers::{AzureOpenAIProvider, ChatOptions, LLMProvider};
//! use codecli::session::Message;
//!
//! async fn example() {
//!     let provider = AzureOpenAIProvider::new(
//!         "https://my-resource.openai.azure.com",
//!         "azure-key",
//!         "gpt-4o",
//!         "2024-12-01-preview",
//!     );
//!
//!     let response = provider
//!         .chat(vec![Message::user("Hello!")], vec![], ChatOptions::default())
//!         .await
//!         .unwrap();
//!
//!     println!("Azure: {}", response.content);
//! }
//! ```

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::error::Result;
use crate::session::{Message, Role, ToolCall};

use super::models::AZURE_MODELS;
use super::sse::{sse_data, SseLineBuffer, ToolCallAssembler, DONE_SENTINEL};
use super::{
    read_json, send_checked, transport_error, ChatOptions, LLMProvider, LLMResponse, StreamEvent,
    ToolDefinition, Usage, STREAM_CHANNEL_CAPACITY,
};

// ============================================================================
// Azure OpenAI API Request Types
// ============================================================================

/// Chat completions request body.
#[derive(Debug, Serialize)]
struct AzureRequest {
    messages: Vec<AzureMessage>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
}

/// A message in OpenAI chat format.
#[derive(Debug, Serialize)]
struct AzureMessage {
    /// "system", "user", "assistant" or "tool"
    role: &'static str,
    /// String, content-part array, or null for tool-calling assistant turns
    content: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<AzureToolCallRequest>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct AzureToolCallRequest {
    id: String,
    r#type: &'static str,
    function: AzureFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct AzureFunctionCall {
    name: String,
    arguments: String,
}

// ============================================================================
// Azure OpenAI API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct AzureResponse {
    #[serde(default)]
    choices: Vec<AzureChoice>,
    usage: Option<AzureUsage>,
}

#[derive(Debug, Deserialize)]
struct AzureChoice {
    message: AzureResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AzureResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<AzureToolCallResponse>>,
}

#[derive(Debug, Deserialize)]
struct AzureToolCallResponse {
    id: String,
    function: AzureFunctionCall,
}

#[derive(Debug, Deserialize)]
struct AzureUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

/// One `data:` frame of a streaming response.
#[derive(Debug, Deserialize)]
struct AzureStreamChunk {
    #[serde(default)]
    choices: Vec<AzureStreamChoice>,
    usage: Option<AzureUsage>,
}

#[derive(Debug, Deserialize)]
struct AzureStreamChoice {
    #[serde(default)]
    delta: AzureStreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AzureStreamDelta {
    content: Option<String>,
    tool_calls: Option<Vec<AzureToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct AzureToolCallDelta {
    index: Option<usize>,
    id: Option<String>,
    function: Option<AzureFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct AzureFunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

// ============================================================================
// Azure OpenAI Provider
// ============================================================================

/// Azure OpenAI LLM provider.
///
/// The deployment name doubles as the model name.
pub struct AzureOpenAIProvider {
    endpoint: String,
    api_key: String,
    deployment: String,
    api_version: String,
    client: Client,
}

impl AzureOpenAIProvider {
    /// Create a new Azure OpenAI provider.
    ///
    /// # Arguments
    /// * `endpoint` - Resource endpoint (trailing slash will be removed)
    /// * `api_key` - Key sent in the `api-key` header
    /// * `deployment` - Deployment name
    /// * `api_version` - REST API version
    ///
    /// # Example
    /// ```
    /// use codecli::providers::{AzureOpenAIProvider, LLMProvider};
    ///
    /// let provider = AzureOpenAIProvider::new("https://x.openai.azure.com/", "key", "gpt-4o", "2024-12-01-preview");
    /// assert_eq!(provider.name(), "azure-openai");
    /// assert_eq!(provider.model(), "gpt-4o");
    /// ```
    pub fn new(endpoint: &str, api_key: &str, deployment: &str, api_version: &str) -> Self {
        Self::with_client(endpoint, api_key, deployment, api_version, Client::new())
    }

    /// Create a provider with a custom HTTP client (timeouts, proxies).
    pub fn with_client(
        endpoint: &str,
        api_key: &str,
        deployment: &str,
        api_version: &str,
        client: Client,
    ) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            deployment: deployment.to_string(),
            api_version: api_version.to_string(),
            client,
        }
    }

    fn url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.endpoint, self.deployment, self.api_version
        )
    }

    fn build_request(
        &self,
        messages: Vec<Message>,
        tools: &[ToolDefinition],
        options: &ChatOptions,
        stream: bool,
    ) -> AzureRequest {
        AzureRequest {
            messages: convert_messages(messages, options.system()),
            temperature: options.temperature_or_default(),
            max_tokens: options.max_tokens_or_default(),
            stream,
            tools: (!tools.is_empty()).then(|| self.format_tools(tools)),
            tool_choice: (!tools.is_empty()).then_some("auto"),
        }
    }

    async fn post(&self, request: &AzureRequest) -> Result<reqwest::Response> {
        debug!(deployment = %self.deployment, stream = request.stream, "Azure OpenAI request");
        send_checked(
            self.client
                .post(self.url())
                .header("api-key", &self.api_key)
                .header("Content-Type", "application/json")
                .json(request),
        )
        .await
    }
}

// ============================================================================
// Conversion Functions
// ============================================================================

/// Convert CodeCLI messages to OpenAI chat format.
fn convert_messages(messages: Vec<Message>, system_prompt: Option<&str>) -> Vec<AzureMessage> {
    let mut out = Vec::with_capacity(messages.len() + 1);
    if let Some(system) = system_prompt {
        out.push(AzureMessage {
            role: "system",
            content: serde_json::Value::String(system.to_string()),
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

        if msg.role == Role::Tool {
            out.push(AzureMessage {
                role,
                content: serde_json::Value::String(msg.content.to_text_lossy()),
                tool_calls: None,
                tool_call_id: msg.tool_call_id().map(str::to_string),
            });
            continue;
        }

        let tool_calls = msg.tool_calls.filter(|tc| !tc.is_empty()).map(|tcs| {
            tcs.into_iter()
                .map(|tc| AzureToolCallRequest {
                    id: tc.id,
                    r#type: "function",
                    function: AzureFunctionCall {
                        name: tc.name,
                        arguments: tc.arguments,
                    },
                })
                .collect::<Vec<_>>()
        });

        let content = if msg.content.is_empty() && tool_calls.is_some() {
            serde_json::Value::Null
        } else {
            serde_json::to_value(&msg.content).unwrap_or_default()
        };

        out.push(AzureMessage {
            role,
            content,
            tool_calls,
            tool_call_id: None,
        });
    }
    out
}

/// Convert a chat completions response to an `LLMResponse`.
fn convert_response(response: AzureResponse) -> LLMResponse {
    let mut llm_response = match response.choices.into_iter().next() {
        Some(choice) => {
            let tool_calls: Vec<ToolCall> = choice
                .message
                .tool_calls
                .unwrap_or_default()
                .into_iter()
                .map(|tc| ToolCall::new(&tc.id, &tc.function.name, &tc.function.arguments))
                .collect();
            LLMResponse {
                content: choice.message.content.unwrap_or_default(),
                tool_calls,
                usage: None,
                finish_reason: choice.finish_reason,
                thought: None,
            }
        }
        None => LLMResponse::default(),
    };

    if let Some(usage) = response.usage {
        llm_response = llm_response.with_usage(Usage::new(usage.prompt_tokens, usage.completion_tokens));
    }
    llm_response
}

// ============================================================================
// LLMProvider Implementation
// ============================================================================

#[async_trait]
impl LLMProvider for AzureOpenAIProvider {
    async fn chat(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
        options: ChatOptions,
    ) -> Result<LLMResponse> {
        let request = self.build_request(messages, &tools, &options, false);
        let response = self.post(&request).await?;
        let body: AzureResponse = read_json(response).await?;
        info!(deployment = %self.deployment, "Azure OpenAI response received");
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

            'read: while let Some(chunk_result) = byte_stream.next().await {
                let chunk = match chunk_result {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let _ = tx.send(StreamEvent::Error(transport_error(e).into())).await;
                        return;
                    }
                };

                for line in lines.push(&chunk) {
                    let Some(data) = sse_data(&line) else {
                        continue;
                    };
                    if data == DONE_SENTINEL {
                        break 'read;
                    }

                    let frame: AzureStreamChunk = match serde_json::from_str(data) {
                        Ok(f) => f,
                        Err(e) => {
                            debug!(error = %e, "Skipping malformed SSE frame");
                            continue;
                        }
                    };

                    if let Some(u) = frame.usage {
                        usage = Some(Usage::new(u.prompt_tokens, u.completion_tokens));
                    }

                    for choice in frame.choices {
                        if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
                            if tx.send(StreamEvent::Delta(text)).await.is_err() {
                                return;
                            }
                        }
                        for tc in choice.delta.tool_calls.unwrap_or_default() {
                            let (name, arguments) = match tc.function {
                                Some(f) => (f.name, f.arguments),
                                None => (None, None),
                            };
                            assembler.push_fragment(
                                tc.index,
                                tc.id.as_deref(),
                                name.as_deref(),
                                arguments.as_deref(),
                            );
                        }
                        if choice.finish_reason.is_some() {
                            finish_reason = choice.finish_reason;
                        }
                    }
                }
            }

            if !assembler.is_empty() {
                let calls = assembler.finish();
                if !calls.is_empty() && tx.send(StreamEvent::ToolCalls(calls)).await.is_err() {
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
        AZURE_MODELS.iter().map(|m| m.to_string()).collect()
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
        "azure-openai"
    }

    fn model(&self) -> &str {
        &self.deployment
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::providers::collect_stream;
    use crate::providers::test_server::{serve, CannedResponse};
    use crate::session::ContentPart;
    use serde_json::json;

    fn provider(base: &str) -> AzureOpenAIProvider {
        AzureOpenAIProvider::new(base, "secret", "gpt-4o", "2024-12-01-preview")
    }

    #[test]
    fn test_url_shape() {
        let p = provider("https://res.openai.azure.com/");
        assert_eq!(
            p.url(),
            "https://res.openai.azure.com/openai/deployments/gpt-4o/chat/completions?api-version=2024-12-01-preview"
        );
    }

    #[test]
    fn test_convert_messages_prepends_system_prompt() {
        let out = convert_messages(vec![Message::user("hi")], Some("be terse"));
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].role, "system");
        assert_eq!(out[1].content, json!("hi"));
    }

    #[test]
    fn test_convert_messages_tool_round() {
        let call = ToolCall::new("call_1", "read_file", r#"{"path":"a"}"#);
        let out = convert_messages(
            vec![
                Message::assistant_with_tools("", vec![call]),
                Message::tool_result("call_1", "read_file", r#"{"content":"x"}"#),
            ],
            None,
        );
        let value = serde_json::to_value(&out).unwrap();
        assert_eq!(value[0]["content"], serde_json::Value::Null);
        assert_eq!(value[0]["tool_calls"][0]["type"], "function");
        assert_eq!(value[0]["tool_calls"][0]["function"]["arguments"], r#"{"path":"a"}"#);
        assert_eq!(value[1]["role"], "tool");
        assert_eq!(value[1]["tool_call_id"], "call_1");
    }

    #[test]
    fn test_convert_messages_image_parts() {
        let msg = Message::user_with_parts(vec![
            ContentPart::text("what is this"),
            ContentPart::image_base64("image/png", "AAAA"),
        ]);
        let value = serde_json::to_value(convert_messages(vec![msg], None)).unwrap();
        assert_eq!(value[0]["content"][1]["type"], "image_url");
        assert_eq!(value[0]["content"][1]["image_url"]["url"], "data:image/png;base64,AAAA");
    }

    #[test]
    fn test_format_tools_shape() {
        let p = provider("https://x");
        let tools = p.format_tools(&[ToolDefinition::new("t", "d", json!({"type": "object"}))]);
        assert_eq!(tools[0]["type"], "function");
        assert_eq!(tools[0]["function"]["name"], "t");
    }

    #[test]
    fn test_request_includes_tool_choice_only_with_tools() {
        let p = provider("https://x");
        let none = p.build_request(vec![], &[], &ChatOptions::default(), false);
        let value = serde_json::to_value(&none).unwrap();
        assert!(value.get("tools").is_none());
        assert!(value.get("tool_choice").is_none());
        assert_eq!(value["max_tokens"], 4096);

        let tools = [ToolDefinition::new("t", "d", json!({}))];
        let some = p.build_request(vec![], &tools, &ChatOptions::default(), true);
        let value = serde_json::to_value(&some).unwrap();
        assert_eq!(value["tool_choice"], "auto");
        assert_eq!(value["stream"], true);
    }

    #[tokio::test]
    async fn test_chat_parses_tool_calls_and_usage() {
        let body = json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{"id": "call_9", "type": "function",
                        "function": {"name": "list_directory", "arguments": "{}"}}]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3}
        });
        let (base, mut requests) = serve(vec![CannedResponse::json(200, &body.to_string())]).await;
        let response = provider(&base)
            .chat(vec![Message::user("list")], vec![], ChatOptions::default())
            .await
            .unwrap();

        assert_eq!(response.tool_calls[0].id, "call_9");
        assert_eq!(response.finish_reason.as_deref(), Some("tool_calls"));
        assert_eq!(response.usage, Some(Usage::new(12, 3)));

        let raw = requests.recv().await.unwrap();
        assert!(raw.to_lowercase().contains("api-key: secret"));
        assert!(raw.contains("/openai/deployments/gpt-4o/chat/completions"));
    }

    #[tokio::test]
    async fn test_chat_error_carries_status_and_body() {
        let (base, _rx) = serve(vec![CannedResponse::json(401, "bad key")]).await;
        let err = provider(&base)
            .chat(vec![Message::user("x")], vec![], ChatOptions::default())
            .await
            .unwrap_err();
        match err {
            crate::error::CodeCliError::Provider(p) => {
                assert!(matches!(p, ProviderError::Auth { .. }));
                assert_eq!(p.status_code(), Some(401));
                assert_eq!(p.body(), Some("bad key"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stream_reassembles_fragmented_frames() {
        let chunks: Vec<&[u8]> = vec![
            b"data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\ndata: {\"choi",
            b"ces\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
            b"data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"c1\",\"function\":{\"name\":\"read_file\",\"arguments\":\"\"}}]}}]}\n\n",
            b"data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"{\\\"path\\\":\"}}]}}]}\n\n",
            b"data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"\\\"a.rs\\\"}\"}}]}}]}\n\n",
            b"data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"tool_calls\"}]}\n\ndata: [DONE]\n\n",
        ];
        let (base, _rx) = serve(vec![CannedResponse::chunked("text/event-stream", chunks)]).await;
        let rx = provider(&base)
            .stream(vec![Message::user("x")], vec![], ChatOptions::default())
            .await
            .unwrap();
        let response = collect_stream(rx).await.unwrap();

        assert_eq!(response.content, "Hello");
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].id, "c1");
        assert_eq!(response.tool_calls[0].arguments, r#"{"path":"a.rs"}"#);
        assert_eq!(response.finish_reason.as_deref(), Some("tool_calls"));
    }

    #[tokio::test]
    async fn test_list_models_static() {
        let models = provider("https://x").list_models().await;
        assert!(models.contains(&"gpt-4o-mini".to_string()));
    }
}
