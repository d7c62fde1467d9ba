//! Context window accounting and conversation compaction.
//!
//! Usage is estimated at four characters per token over the system prompt
//! and every message. Once the estimate reaches the configured share of the
//! model's context window (75% by default), older history is replaced with a
//! single summary system message produced by the active provider, keeping
//! the most recent messages verbatim.
//!
//! Compaction is best-effort: if the summary request fails the conversation
//! is returned exactly as it was.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::CompactionConfig;
use crate::error::{CodeCliError, Result};
use crate::providers::{ChatOptions, LLMProvider};
use crate::session::Message;
use crate::utils::tokens::{estimate_message_tokens, estimate_tokens};

/// Heading of the synthetic summary message.
pub const SUMMARY_HEADING: &str = "## Previous Conversation Summary";

/// Estimated context usage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct UsageEstimate {
    /// Estimated tokens in use
    pub used: usize,
    /// Context window of the model
    pub max: usize,
    /// `max - used`; negative when the conversation already overflows
    pub remaining: i64,
    /// `used / max * 100`, rounded to one decimal
    pub percentage: f64,
}

/// Decides when to compact and performs the compaction.
///
/// # Example
/// ```
/// use codecli::agent::ContextManager;
/// use codecli::config::CompactionConfig;
/// use codecli::session::Message;
///
/// let manager = ContextManager::new(100, CompactionConfig::default());
/// let messages = vec![Message::user(&"x".repeat(300))];
/// let usage = manager.estimate_usage("", &messages);
/// assert_eq!(usage.used, 75);
/// assert!(manager.needs_compaction("", &messages));
/// ```
#[derive(Debug, Clone)]
pub struct ContextManager {
    context_window: usize,
    settings: CompactionConfig,
}

impl ContextManager {
    pub fn new(context_window: usize, settings: CompactionConfig) -> Self {
        Self {
            context_window: context_window.max(1),
            settings,
        }
    }

    pub fn context_window(&self) -> usize {
        self.context_window
    }

    pub fn settings(&self) -> &CompactionConfig {
        &self.settings
    }

    /// Estimate how much of the context window the conversation occupies.
    pub fn estimate_usage(&self, system_prompt: &str, messages: &[Message]) -> UsageEstimate {
        let used = estimate_tokens(system_prompt)
            + messages.iter().map(estimate_message_tokens).sum::<usize>();
        let percentage = (used as f64 / self.context_window as f64 * 1000.0).round() / 10.0;
        UsageEstimate {
            used,
            max: self.context_window,
            remaining: self.context_window as i64 - used as i64,
            percentage,
        }
    }

    /// True once the estimate reaches the threshold (inclusive).
    pub fn needs_compaction(&self, system_prompt: &str, messages: &[Message]) -> bool {
        if !self.settings.enabled {
            return false;
        }
        let usage = self.estimate_usage(system_prompt, messages);
        usage.percentage >= self.settings.threshold * 100.0
    }

    /// Compact `messages`, returning the original sequence unchanged when
    /// there is too little history or the summary request fails.
    pub async fn compact(&self, messages: &[Message], provider: &dyn LLMProvider) -> Vec<Message> {
        match self.try_compact(messages, provider).await {
            Ok(Some(compacted)) => compacted,
            Ok(None) => messages.to_vec(),
            Err(e) => {
                warn!(error = %e, "Compaction failed, keeping conversation as is");
                messages.to_vec()
            }
        }
    }

    /// Compact `messages`.
    ///
    /// Returns `Ok(None)` when fewer than `min_summarize` messages precede the
    /// kept tail, and an error when the summary request fails or comes back
    /// empty.
    pub async fn try_compact(
        &self,
        messages: &[Message],
        provider: &dyn LLMProvider,
    ) -> Result<Option<Vec<Message>>> {
        let keep = self.settings.keep_recent.min(messages.len());
        let split = messages.len() - keep;
        let (older, recent) = messages.split_at(split);

        if older.len() < self.settings.min_summarize {
            debug!(
                older = older.len(),
                min = self.settings.min_summarize,
                "Not enough history to compact"
            );
            return Ok(None);
        }

        let prompt = build_summary_prompt(older);
        let options = ChatOptions::new().with_max_tokens(self.settings.summary_max_tokens);
        let response = provider
            .chat(vec![Message::user(&prompt)], Vec::new(), options)
            .await
            .map_err(|e| CodeCliError::Compaction(e.to_string()))?;

        let summary = response.content.trim();
        if summary.is_empty() {
            return Err(CodeCliError::Compaction("empty summary".into()));
        }

        let mut compacted = Vec::with_capacity(recent.len() + 1);
        compacted.push(Message::system(&format!("{}\n{}", SUMMARY_HEADING, summary)));
        compacted.extend_from_slice(recent);

        info!(
            before = messages.len(),
            after = compacted.len(),
            summarized = older.len(),
            "Conversation compacted"
        );
        Ok(Some(compacted))
    }
}

/// Prompt asking the model to summarize `messages`.
pub fn build_summary_prompt(messages: &[Message]) -> String {
    let transcript = messages
        .iter()
        .map(|m| format!("{}: {}", m.role, m.content.to_text_lossy()))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "Summarize the following conversation concisely, preserving key decisions, \
         code changes, and context:\n\n{}",
        transcript
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::providers::{LLMResponse, StreamEvent, ToolDefinition};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    /// Provider answering `chat` with a fixed result and recording prompts.
    struct SummaryProvider {
        reply: std::result::Result<String, u16>,
        prompts: Mutex<Vec<String>>,
    }

    impl SummaryProvider {
        fn ok(text: &str) -> Self {
            Self {
                reply: Ok(text.to_string()),
                prompts: Mutex::new(Vec::new()),
            }
        }
        fn failing(status: u16) -> Self {
            Self {
                reply: Err(status),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LLMProvider for SummaryProvider {
        async fn chat(
            &self,
            messages: Vec<Message>,
            _tools: Vec<ToolDefinition>,
            options: ChatOptions,
        ) -> Result<LLMResponse> {
            assert_eq!(options.max_tokens, Some(2000));
            self.prompts
                .lock()
                .unwrap()
                .push(messages[0].content.to_text_lossy());
            match &self.reply {
                Ok(text) => Ok(LLMResponse::text(text)),
                Err(status) => Err(ProviderError::from_status(*status, "boom").into()),
            }
        }

        async fn stream(
            &self,
            _messages: Vec<Message>,
            _tools: Vec<ToolDefinition>,
            _options: ChatOptions,
        ) -> Result<mpsc::Receiver<StreamEvent>> {
            unreachable!("compaction never streams")
        }

        async fn list_models(&self) -> Vec<String> {
            Vec::new()
        }

        fn format_tools(&self, _tools: &[ToolDefinition]) -> Value {
            Value::Null
        }

        fn name(&self) -> &str {
            "summary"
        }

        fn model(&self) -> &str {
            "test"
        }
    }

    fn conversation(n: usize) -> Vec<Message> {
        (0..n)
            .map(|i| {
                if i % 2 == 0 {
                    Message::user(&format!("question {}", i))
                } else {
                    Message::assistant(&format!("answer {}", i))
                }
            })
            .collect()
    }

    #[test]
    fn test_estimate_includes_system_prompt() {
        let manager = ContextManager::new(1000, CompactionConfig::default());
        let usage = manager.estimate_usage("abcdefgh", &[Message::user("abcd")]);
        assert_eq!(usage.used, 3);
        assert_eq!(usage.remaining, 997);
        assert_eq!(usage.percentage, 0.3);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let manager = ContextManager::new(8192, CompactionConfig::default());
        // 6144 tokens is exactly 75% of 8192
        let at = vec![Message::user(&"a".repeat(6144 * 4))];
        assert!(manager.needs_compaction("", &at));
        let below = vec![Message::user(&"a".repeat(6000 * 4))];
        assert!(!manager.needs_compaction("", &below));
    }

    #[test]
    fn test_disabled_never_compacts() {
        let settings = CompactionConfig {
            enabled: false,
            ..CompactionConfig::default()
        };
        let manager = ContextManager::new(10, settings);
        assert!(!manager.needs_compaction("", &[Message::user(&"a".repeat(400))]));
    }

    #[test]
    fn test_overflow_has_negative_remaining() {
        let manager = ContextManager::new(10, CompactionConfig::default());
        let usage = manager.estimate_usage("", &[Message::user(&"a".repeat(80))]);
        assert_eq!(usage.remaining, -10);
        assert_eq!(usage.percentage, 200.0);
    }

    #[tokio::test]
    async fn test_compact_keeps_last_four() {
        let manager = ContextManager::new(8192, CompactionConfig::default());
        let provider = SummaryProvider::ok("they talked");
        let messages = conversation(10);

        let compacted = manager.compact(&messages, &provider).await;
        assert_eq!(compacted.len(), 5);
        assert_eq!(
            compacted[0].content.as_text(),
            Some("## Previous Conversation Summary\nthey talked")
        );
        assert_eq!(compacted[0].role, crate::session::Role::System);
        assert_eq!(&compacted[1..], &messages[6..]);

        let prompts = provider.prompts.lock().unwrap();
        assert!(prompts[0].contains("user: question 0"));
        assert!(prompts[0].contains("assistant: answer 5"));
        assert!(!prompts[0].contains("question 6"));
    }

    #[tokio::test]
    async fn test_compact_failure_returns_original() {
        let manager = ContextManager::new(8192, CompactionConfig::default());
        let provider = SummaryProvider::failing(500);
        let messages = conversation(12);

        let result = manager.compact(&messages, &provider).await;
        assert_eq!(result, messages);
        assert!(matches!(
            manager.try_compact(&messages, &provider).await,
            Err(CodeCliError::Compaction(_))
        ));
    }

    #[tokio::test]
    async fn test_compact_empty_summary_is_failure() {
        let manager = ContextManager::new(8192, CompactionConfig::default());
        let provider = SummaryProvider::ok("   ");
        let messages = conversation(9);
        assert_eq!(manager.compact(&messages, &provider).await, messages);
    }

    #[tokio::test]
    async fn test_too_little_history_is_untouched() {
        let manager = ContextManager::new(8192, CompactionConfig::default());
        let provider = SummaryProvider::ok("unused");
        // 7 messages: 3 older + 4 kept, below the minimum of 4
        let messages = conversation(7);
        assert!(manager.try_compact(&messages, &provider).await.unwrap().is_none());
        assert_eq!(manager.compact(&messages, &provider).await, messages);
        assert!(provider.prompts.lock().unwrap().is_empty());
    }
}
