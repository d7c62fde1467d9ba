//! Approximate token counting for context window management.
//!
//! Vendor tokenizers differ, so every backend is estimated with the same
//! coarse rule: one token per four characters, rounded up.

use crate::session::Message;

/// Characters per estimated token.
pub const CHARS_PER_TOKEN: usize = 4;

/// Estimate the token count of a piece of text.
///
/// # Example
/// ```
/// use codecli::utils::tokens::estimate_tokens;
///
/// assert_eq!(estimate_tokens(""), 0);
/// assert_eq!(estimate_tokens("abcd"), 1);
/// assert_eq!(estimate_tokens("abcde"), 2);
/// ```
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Estimate the tokens of one message's content. Structured content is
/// measured through its JSON form.
pub fn estimate_message_tokens(message: &Message) -> usize {
    estimate_tokens(&message.content.to_text_lossy())
}

/// Estimate the tokens of a whole conversation.
pub fn estimate_messages_tokens(messages: &[Message]) -> usize {
    messages.iter().map(estimate_message_tokens).sum()
}

/// Human-readable token count (`1.2M`, `3.4K`, `512`).
pub fn format_token_count(count: u64) -> String {
    if count >= 1_000_000 {
        format!("{:.1}M", count as f64 / 1_000_000.0)
    } else if count >= 1_000 {
        format!("{:.1}K", count as f64 / 1_000.0)
    } else {
        count.to_string()
    }
}
