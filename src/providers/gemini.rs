//! Gemini Provider Implementation
//!
//! Gemini's `generateContent` API does not speak the OpenAI chat format, so
//! this module adapts at the boundary: system messages are folded into
//! `systemInstruction`, the assistant role becomes `model`, tool results
//! become `functionResponse` parts and JSON Schema type names are
//! upper-cased. Function calls get synthetic ids, and each call's
//! `thoughtSignature` is carried so it can be echoed back on the next turn.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::error::Result;
use crate::session::{split_data_url, Content, ContentPart, Message, Role, ToolCall};

use super::models::GEMINI_MODELS;
use super::sse::{sse_data, SseLineBuffer, ToolCallAssembler};
use super::{
    read_json, send_checked, transport_error, ChatOptions, LLMProvider, LLMResponse, StreamEvent,
    ToolDefinition, Usage, STREAM_CHANNEL_CAPACITY,
};

const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

// ============================================================================
// Gemini API Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Value>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

/// One content part. Exactly one payload field is set per part, except
/// that `thoughtSignature` travels alongside a `functionCall`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    /// `true` when `text` is a reasoning trace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thought: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<FunctionResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thought_signature: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FunctionResponse {
    name: String,
    response: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

impl GeminiPart {
    fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            ..Default::default()
        }
    }
}

// ============================================================================
// Gemini Provider
// ============================================================================

/// Google Gemini LLM provider.
pub struct GeminiProvider {
    api_key: String,
    model: String,
    api_base: String,
    client: Client,
}

impl GeminiProvider {
    /// Create a new Gemini provider.
    ///
    /// # Example
    /// ```
    /// use codecli::providers::{GeminiProvider, LLMProvider};
    ///
    /// let provider = GeminiProvider::new("key", "gemini-2.0-flash");
    /// assert_eq!(provider.name(), "gemini");
    /// assert_eq!(provider.context_window(), 1_048_576);
    /// ```
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            client: Client::new(),
        }
    }

    /// Override the API base URL (proxies, tests).
    pub fn with_api_base(mut self, api_base: &str) -> Self {
        let base = api_base.trim_end_matches('/');
        if !base.is_empty() {
            self.api_base = base.to_string();
        }
        self
    }

    /// Use a custom HTTP client.
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    fn build_request(
        &self,
        messages: Vec<Message>,
        tools: &[ToolDefinition],
        options: &ChatOptions,
    ) -> GeminiRequest {
        let (contents, system) = convert_messages(messages, options.system());
        GeminiRequest {
            contents,
            system_instruction: system.map(|text| GeminiContent {
                role: None,
                parts: vec![GeminiPart::text(&text)],
            }),
            tools: (!tools.is_empty()).then(|| self.format_tools(tools)),
            generation_config: GenerationConfig {
                temperature: options.temperature_or_default(),
                max_output_tokens: options.max_tokens_or_default(),
            },
        }
    }
}

// ============================================================================
// Conversion Functions
// ============================================================================

/// Convert a JSON Schema into Gemini's schema dialect.
///
/// Only the fields Gemini understands are kept; type names are upper-cased.
fn convert_schema(schema: &Value) -> Value {
    let Some(obj) = schema.as_object() else {
        return schema.clone();
    };
    let mut out = serde_json::Map::new();
    if let Some(t) = obj.get("type").and_then(Value::as_str) {
        out.insert("type".into(), Value::String(t.to_uppercase()));
    }
    if let Some(d) = obj.get("description") {
        out.insert("description".into(), d.clone());
    }
    if let Some(props) = obj.get("properties").and_then(Value::as_object) {
        let converted = props
            .iter()
            .map(|(k, v)| (k.clone(), convert_schema(v)))
            .collect::<serde_json::Map<_, _>>();
        out.insert("properties".into(), Value::Object(converted));
    }
    if let Some(r) = obj.get("required") {
        out.insert("required".into(), r.clone());
    }
    if let Some(items) = obj.get("items") {
        out.insert("items".into(), convert_schema(items));
    }
    if let Some(e) = obj.get("enum") {
        out.insert("enum".into(), e.clone());
    }
    Value::Object(out)
}

/// Convert messages into `contents` plus the combined system instruction.
///
/// System messages anywhere in the history (e.g. compaction summaries) are
/// appended to the system instruction.
fn convert_messages(
    messages: Vec<Message>,
    system_prompt: Option<&str>,
) -> (Vec<GeminiContent>, Option<String>) {
    let mut system_parts: Vec<String> = system_prompt.map(|s| vec![s.to_string()]).unwrap_or_default();
    let mut contents = Vec::with_capacity(messages.len());

    for msg in messages {
        match msg.role {
            Role::System => system_parts.push(msg.content.text()),
            Role::Tool => {
                let name = msg
                    .tool_result
                    .as_ref()
                    .map(|r| r.name.clone())
                    .unwrap_or_else(|| "tool".to_string());
                let raw = msg.content.to_text_lossy();
                contents.push(GeminiContent {
                    role: Some("user".into()),
                    parts: vec![GeminiPart {
                        function_response: Some(FunctionResponse {
                            name: name.clone(),
                            response: json!({ "name": name, "content": raw }),
                        }),
                        ..Default::default()
                    }],
                });
            }
            Role::Assistant if msg.has_tool_calls() => {
                let mut parts = Vec::new();
                let text = msg.content.text();
                if !text.is_empty() {
                    parts.push(GeminiPart::text(&text));
                }
                for tc in msg.tool_calls.unwrap_or_default() {
                    parts.push(GeminiPart {
                        function_call: Some(FunctionCall {
                            args: tc.arguments_value(),
                            name: tc.name,
                        }),
                        thought_signature: tc.thought_signature,
                        ..Default::default()
                    });
                }
                contents.push(GeminiContent {
                    role: Some("model".into()),
                    parts,
                });
            }
            Role::Assistant | Role::User => {
                let role = if msg.role == Role::Assistant { "model" } else { "user" };
                let parts = match msg.content {
                    Content::Text(text) => vec![GeminiPart::text(&text)],
                    Content::Parts(parts) => parts
                        .into_iter()
                        .filter_map(|p| match p {
                            ContentPart::Text { text } => Some(GeminiPart::text(&text)),
                            ContentPart::ImageUrl { image_url } => split_data_url(&image_url.url)
                                .map(|(mime, data)| GeminiPart {
                                    inline_data: Some(InlineData {
                                        mime_type: mime.to_string(),
                                        data: data.to_string(),
                                    }),
                                    ..Default::default()
                                }),
                        })
                        .collect(),
                };
                contents.push(GeminiContent {
                    role: Some(role.into()),
                    parts,
                });
            }
        }
    }

    if contents.is_empty() {
        contents.push(GeminiContent {
            role: Some("user".into()),
            parts: vec![GeminiPart::text("")],
        });
    }

    let system = system_parts
        .into_iter()
        .filter(|s| !s.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");
    (contents, (!system.is_empty()).then_some(system))
}

/// Tool calls found in a list of parts, with ids `call_{millis}_{i}`.
fn extract_tool_calls(parts: &[GeminiPart], offset: usize) -> Vec<ToolCall> {
    let millis = chrono::Utc::now().timestamp_millis();
    parts
        .iter()
        .filter_map(|p| p.function_call.as_ref().map(|fc| (fc, p.thought_signature.clone())))
        .enumerate()
        .map(|(i, (fc, signature))| {
            let args = if fc.args.is_null() {
                "{}".to_string()
            } else {
                fc.args.to_string()
            };
            let mut call = ToolCall::new(&format!("call_{}_{}", millis, offset + i), &fc.name, &args);
            call.thought_signature = signature;
            call
        })
        .collect()
}

fn convert_response(response: GeminiResponse) -> LLMResponse {
    let usage = response
        .usage_metadata
        .map(|u| Usage::new(u.prompt_token_count, u.candidates_token_count));
    let Some(candidate) = response.candidates.into_iter().next() else {
        return LLMResponse {
            usage,
            ..Default::default()
        };
    };
    let parts = candidate.content.map(|c| c.parts).unwrap_or_default();

    let mut content = String::new();
    let mut thought = String::new();
    for part in &parts {
        if let Some(text) = &part.text {
            if part.thought == Some(true) {
                thought.push_str(text);
            } else {
                content.push_str(text);
            }
        }
    }

    LLMResponse {
        content,
        tool_calls: extract_tool_calls(&parts, 0),
        usage,
        finish_reason: Some(
            candidate
                .finish_reason
                .map(|r| r.to_lowercase())
                .unwrap_or_else(|| "stop".to_string()),
        ),
        thought: (!thought.is_empty()).then_some(thought),
    }
}

// ============================================================================
// LLMProvider Implementation
// ============================================================================

#[async_trait]
impl LLMProvider for GeminiProvider {
    async fn chat(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
        options: ChatOptions,
    ) -> Result<LLMResponse> {
        let request = self.build_request(messages, &tools, &options);
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.api_base, self.model, self.api_key
        );
        debug!(model = %self.model, "Gemini request");
        let response = send_checked(self.client.post(url).json(&request)).await?;
        let body: GeminiResponse = read_json(response).await?;
        info!(model = %self.model, "Gemini response received");
        Ok(convert_response(body))
    }

    async fn stream(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
        options: ChatOptions,
    ) -> Result<mpsc::Receiver<StreamEvent>> {
        let request = self.build_request(messages, &tools, &options);
        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse&key={}",
            self.api_base, self.model, self.api_key
        );
        debug!(model = %self.model, "Gemini stream request");
        let response = send_checked(self.client.post(url).json(&request)).await?;

        let (tx, rx) = mpsc::channel::<StreamEvent>(STREAM_CHANNEL_CAPACITY);
        let byte_stream = response.bytes_stream();

        tokio::spawn(async move {
            let mut lines = SseLineBuffer::new();
            let mut assembler = ToolCallAssembler::new();
            let mut call_count = 0usize;
            let mut usage: Option<Usage> = None;
            let mut finish_reason: Option<String> = None;

            tokio::pin!(byte_stream);

            while let Some(chunk_result) = byte_stream.next().await {
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
                    let frame: GeminiResponse = match serde_json::from_str(data) {
                        Ok(f) => f,
                        Err(e) => {
                            debug!(error = %e, "Skipping malformed SSE frame");
                            continue;
                        }
                    };

                    if let Some(u) = frame.usage_metadata {
                        usage = Some(Usage::new(u.prompt_token_count, u.candidates_token_count));
                    }

                    for candidate in frame.candidates {
                        if let Some(reason) = candidate.finish_reason {
                            finish_reason = Some(reason.to_lowercase());
                        }
                        let parts = candidate.content.map(|c| c.parts).unwrap_or_default();
                        for part in &parts {
                            let Some(text) = part.text.as_ref().filter(|t| !t.is_empty()) else {
                                continue;
                            };
                            let event = if part.thought == Some(true) {
                                StreamEvent::Thought(text.clone())
                            } else {
                                StreamEvent::Delta(text.clone())
                            };
                            if tx.send(event).await.is_err() {
                                return;
                            }
                        }
                        let calls = extract_tool_calls(&parts, call_count);
                        call_count += calls.len();
                        for call in calls {
                            assembler.push_complete(call);
                        }
                    }
                }
            }

            if !assembler.is_empty()
                && tx
                    .send(StreamEvent::ToolCalls(assembler.finish()))
                    .await
                    .is_err()
            {
                return;
            }
            let _ = tx
                .send(StreamEvent::Done {
                    usage,
                    finish_reason: finish_reason.or_else(|| Some("stop".to_string())),
                })
                .await;
        });

        Ok(rx)
    }

    async fn list_models(&self) -> Vec<String> {
        GEMINI_MODELS.iter().map(|m| m.to_string()).collect()
    }

    fn format_tools(&self, tools: &[ToolDefinition]) -> Value {
        json!([{
            "functionDeclarations": tools
                .iter()
                .map(|t| json!({
                    "name": t.name,
                    "description": t.description,
                    "parameters": convert_schema(&t.parameters),
                }))
                .collect::<Vec<_>>()
        }])
    }

    fn name(&self) -> &str {
        "gemini"
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

    #[test]
    fn test_convert_schema_uppercases_types() {
        let schema = json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "File path"},
                "tags": {"type": "array", "items": {"type": "string"}},
                "mode": {"type": "string", "enum": ["write", "append"]}
            },
            "required": ["path"],
            "additionalProperties": false
        });
        let out = convert_schema(&schema);
        assert_eq!(out["type"], "OBJECT");
        assert_eq!(out["properties"]["path"]["type"], "STRING");
        assert_eq!(out["properties"]["tags"]["items"]["type"], "STRING");
        assert_eq!(out["properties"]["mode"]["enum"][1], "append");
        assert!(out.get("additionalProperties").is_none());
    }

    #[test]
    fn test_convert_messages_roles_and_system() {
        let call = ToolCall {
            thought_signature: Some("sig".into()),
            ..ToolCall::new("c1", "read_file", r#"{"path":"a"}"#)
        };
        let (contents, system) = convert_messages(
            vec![
                Message::system("## Previous Conversation Summary\nearlier"),
                Message::user("read a"),
                Message::assistant_with_tools("", vec![call]),
                Message::tool_result("c1", "read_file", r#"{"content":"x"}"#),
                Message::assistant("done"),
            ],
            Some("You are CodeCLI"),
        );
        let system = system.unwrap();
        assert!(system.starts_with("You are CodeCLI"));
        assert!(system.contains("Previous Conversation Summary"));

        let value = serde_json::to_value(&contents).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 4);
        assert_eq!(value[1]["role"], "model");
        assert_eq!(value[1]["parts"][0]["functionCall"]["args"]["path"], "a");
        assert_eq!(value[1]["parts"][0]["thoughtSignature"], "sig");
        assert_eq!(value[2]["parts"][0]["functionResponse"]["name"], "read_file");
        assert_eq!(value[3]["role"], "model");
    }

    #[test]
    fn test_convert_messages_inline_image() {
        let msg = Message::user_with_parts(vec![
            ContentPart::text("see"),
            ContentPart::image_base64("image/png", "AAAA"),
        ]);
        let (contents, _) = convert_messages(vec![msg], None);
        let value = serde_json::to_value(&contents).unwrap();
        assert_eq!(value[0]["parts"][1]["inlineData"]["mimeType"], "image/png");
    }

    #[test]
    fn test_convert_messages_empty_history() {
        let (contents, system) = convert_messages(vec![], None);
        assert_eq!(contents.len(), 1);
        assert!(system.is_none());
    }

    #[test]
    fn test_convert_response_with_thought_and_call() {
        let response: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [
                    {"text": "thinking...", "thought": true},
                    {"text": "Listing."},
                    {"functionCall": {"name": "list_directory", "args": {}}, "thoughtSignature": "abc"}
                ]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 9, "candidatesTokenCount": 4, "totalTokenCount": 13}
        }))
        .unwrap();
        let out = convert_response(response);
        assert_eq!(out.content, "Listing.");
        assert_eq!(out.thought.as_deref(), Some("thinking..."));
        assert_eq!(out.tool_calls[0].thought_signature.as_deref(), Some("abc"));
        assert!(out.tool_calls[0].id.starts_with("call_"));
        assert_eq!(out.usage, Some(Usage::new(9, 4)));
        assert_eq!(out.finish_reason.as_deref(), Some("stop"));
    }

    #[tokio::test]
    async fn test_stream_events_in_order() {
        let chunks: Vec<&[u8]> = vec![
            b"data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"hm\",\"thought\":true}]}}]}\r\n\r\n",
            b"data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Hel",
            b"lo\"}]}}]}\r\n\r\ndata: {\"candidates\":[{\"content\":{\"parts\":[{\"functionCall\":{\"name\":\"list_directory\",\"args\":{}}}]},\"finishReason\":\"STOP\"}],\"usageMetadata\":{\"promptTokenCount\":3,\"candidatesTokenCount\":1}}\r\n\r\n",
        ];
        let (base, mut requests) = serve(vec![CannedResponse::chunked("text/event-stream", chunks)]).await;
        let provider = GeminiProvider::new("k", "gemini-2.0-flash").with_api_base(&base);
        let mut rx = provider
            .stream(vec![Message::user("list")], vec![], ChatOptions::default())
            .await
            .unwrap();

        assert!(matches!(rx.recv().await, Some(StreamEvent::Thought(ref t)) if t == "hm"));
        let rest = collect_stream(rx).await.unwrap();
        assert_eq!(rest.content, "Hello");
        assert_eq!(rest.tool_calls.len(), 1);
        assert_eq!(rest.usage, Some(Usage::new(3, 1)));

        let raw = requests.recv().await.unwrap();
        assert!(raw.contains("/models/gemini-2.0-flash:streamGenerateContent?alt=sse&key=k"));
    }

    #[tokio::test]
    async fn test_chat_error_status() {
        let (base, _rx) = serve(vec![CannedResponse::json(429, "quota")]).await;
        let provider = GeminiProvider::new("k", "gemini-2.0-flash").with_api_base(&base);
        let err = provider
            .chat(vec![Message::user("x")], vec![], ChatOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Rate limit"));
    }
}
