//! Stream framing shared by the streaming backends.
//!
//! HTTP bodies arrive in arbitrary chunks. [`SseLineBuffer`] turns them into
//! complete lines, holding back any partial line (including a split UTF-8
//! sequence) until its terminating newline arrives. [`ToolCallAssembler`]
//! rebuilds tool calls from the different delta styles vendors use.

use crate::session::ToolCall;

/// Terminal sentinel of OpenAI-style SSE streams.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Accumulates raw body bytes and yields complete lines.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    buf: Vec<u8>,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns every line completed by it.
    ///
    /// Lines are returned without the trailing `\n` / `\r\n`.
    ///
    /// # Example
    /// ```
    /// use codecli::providers::sse::SseLineBuffer;
    ///
    /// let mut buffer = SseLineBuffer::new();
    /// assert!(buffer.push(b"data: {\"a\"").is_empty());
    /// assert_eq!(buffer.push(b":1}\n\n"), vec!["data: {\"a\":1}".to_string(), String::new()]);
    /// ```
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    /// Whatever is left after the body ended without a final newline.
    pub fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buf);
        let line = String::from_utf8_lossy(&rest).trim().to_string();
        (!line.is_empty()).then_some(line)
    }
}

/// Extract the payload of an SSE `data:` line.
///
/// Comments, `event:` lines and blank keep-alives yield `None`.
pub fn sse_data(line: &str) -> Option<&str> {
    let line = line.trim();
    line.strip_prefix("data: ")
        .or_else(|| line.strip_prefix("data:"))
        .map(str::trim)
        .filter(|data| !data.is_empty())
}

#[derive(Debug, Default)]
struct PartialCall {
    index: Option<usize>,
    id: String,
    name: String,
    arguments: String,
    thought_signature: Option<String>,
}

/// Rebuilds tool calls from streaming deltas.
///
/// Two transport styles converge here: backends that send complete call
/// objects ([`push_complete`](Self::push_complete)) and backends that send
/// the id and name once, then argument fragments keyed by list index
/// ([`push_fragment`](Self::push_fragment)).
#[derive(Debug, Default)]
pub struct ToolCallAssembler {
    calls: Vec<PartialCall>,
}

impl ToolCallAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a complete call.
    pub fn push_complete(&mut self, call: ToolCall) {
        self.calls.push(PartialCall {
            index: None,
            id: call.id,
            name: call.name,
            arguments: call.arguments,
            thought_signature: call.thought_signature,
        });
    }

    /// Merge one fragment.
    ///
    /// With an index, the fragment belongs to the call at that list
    /// position (created on first sight). Without one, a fragment carrying
    /// a new id starts a call and anything else appends to the last call.
    ///
    /// # Example
    /// ```
    /// use codecli::providers::sse::ToolCallAssembler;
    ///
    /// let mut asm = ToolCallAssembler::new();
    /// asm.push_fragment(Some(0), Some("call_1"), Some("read_file"), Some("{\"pa"));
    /// asm.push_fragment(Some(0), None, None, Some("th\":\"a.rs\"}"));
    /// let calls = asm.finish();
    /// assert_eq!(calls[0].arguments, "{\"path\":\"a.rs\"}");
    /// ```
    pub fn push_fragment(
        &mut self,
        index: Option<usize>,
        id: Option<&str>,
        name: Option<&str>,
        arguments: Option<&str>,
    ) {
        let id = id.filter(|s| !s.is_empty());
        let name = name.filter(|s| !s.is_empty());

        let slot = match index {
            Some(i) => match self.calls.iter().position(|c| c.index == Some(i)) {
                Some(pos) => pos,
                None => {
                    self.calls.push(PartialCall {
                        index: Some(i),
                        ..Default::default()
                    });
                    self.calls.len() - 1
                }
            },
            None => {
                let starts_new = match (id, self.calls.last()) {
                    (_, None) => true,
                    (Some(id), Some(last)) => !last.id.is_empty() && last.id != id,
                    (None, Some(_)) => false,
                };
                if starts_new {
                    self.calls.push(PartialCall::default());
                }
                self.calls.len() - 1
            }
        };

        let call = &mut self.calls[slot];
        if let Some(id) = id {
            if call.id.is_empty() {
                call.id = id.to_string();
            }
        }
        if let Some(name) = name {
            if call.name.is_empty() {
                call.name = name.to_string();
            }
        }
        if let Some(fragment) = arguments {
            call.arguments.push_str(fragment);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Finished calls in arrival order.
    ///
    /// Missing ids are synthesized and empty argument strings become `{}`.
    /// Fragments that never received a tool name are dropped.
    pub fn finish(self) -> Vec<ToolCall> {
        self.calls
            .into_iter()
            .enumerate()
            .filter(|(_, c)| !c.name.is_empty())
            .map(|(i, c)| ToolCall {
                id: if c.id.is_empty() {
                    format!("call_{}", i)
                } else {
                    c.id
                },
                name: c.name,
                arguments: if c.arguments.trim().is_empty() {
                    "{}".to_string()
                } else {
                    c.arguments
                },
                thought_signature: c.thought_signature,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_buffer_split_across_chunks() {
        let mut buffer = SseLineBuffer::new();
        assert!(buffer.push(b"data: hel").is_empty());
        assert!(buffer.push(b"lo").is_empty());
        assert_eq!(buffer.push(b"\r\ndata: x\n"), vec!["data: hello", "data: x"]);
        assert!(buffer.finish().is_none());
    }

    #[test]
    fn test_line_buffer_split_utf8_sequence() {
        let text = "data: héllo\n".as_bytes();
        // split inside the two-byte 'é'
        let split = text.iter().position(|&b| b == 0xC3).unwrap() + 1;
        let mut buffer = SseLineBuffer::new();
        assert!(buffer.push(&text[..split]).is_empty());
        assert_eq!(buffer.push(&text[split..]), vec!["data: héllo"]);
    }

    #[test]
    fn test_line_buffer_finish_returns_tail() {
        let mut buffer = SseLineBuffer::new();
        buffer.push(b"{\"done\":true}");
        assert_eq!(buffer.finish().as_deref(), Some("{\"done\":true}"));
        assert!(buffer.finish().is_none());
    }

    #[test]
    fn test_sse_data_prefixes() {
        assert_eq!(sse_data("data: {\"a\":1}"), Some("{\"a\":1}"));
        assert_eq!(sse_data("data:[DONE]"), Some(DONE_SENTINEL));
        assert_eq!(sse_data("event: ping"), None);
        assert_eq!(sse_data(": keep-alive"), None);
        assert_eq!(sse_data("data: "), None);
    }

    #[test]
    fn test_assembler_indexed_fragments() {
        let mut asm = ToolCallAssembler::new();
        asm.push_fragment(Some(0), Some("a"), Some("read_file"), Some(""));
        asm.push_fragment(Some(1), Some("b"), Some("list_directory"), None);
        asm.push_fragment(Some(0), None, None, Some("{\"path\":"));
        asm.push_fragment(Some(0), None, None, Some("\"x\"}"));
        let calls = asm.finish();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "a");
        assert_eq!(calls[0].arguments, "{\"path\":\"x\"}");
        assert_eq!(calls[1].name, "list_directory");
        assert_eq!(calls[1].arguments, "{}");
    }

    #[test]
    fn test_assembler_unindexed_fragments_append_to_last() {
        let mut asm = ToolCallAssembler::new();
        asm.push_fragment(None, Some("a"), Some("write_file"), Some("{\"pa"));
        asm.push_fragment(None, None, None, Some("th\":1}"));
        asm.push_fragment(None, Some("b"), Some("read_file"), Some("{}"));
        let calls = asm.finish();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].arguments, "{\"path\":1}");
        assert_eq!(calls[1].id, "b");
    }

    #[test]
    fn test_assembler_complete_calls_and_missing_ids() {
        let mut asm = ToolCallAssembler::new();
        asm.push_complete(ToolCall::new("", "list_directory", ""));
        asm.push_fragment(Some(3), None, None, Some("{}"));
        let calls = asm.finish();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_0");
        assert_eq!(calls[0].arguments, "{}");
    }
}
