//! Agent module - Core AI agent logic and conversation handling
//!
//! This module provides the agent loop and the state it runs against.
//! The agent is responsible for:
//!
//! - Building the system prompt from instructions and project memory
//! - Calling the LLM provider, streaming where possible
//! - Executing tool calls and feeding results back to the LLM
//! - Keeping the conversation inside the model's context window
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  REPL / CLI │────>│  AgentLoop  │────>│ LLMProvider │
//! │  (observer) │<────│             │     │             │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                            │
//!              ┌─────────────┼──────────────┐
//!              ▼             ▼              ▼
//!       ┌────────────┐ ┌───────────┐ ┌────────────────┐
//!       │  Session   │ │   Tools   │ │ ContextManager │
//!       │   Store    │ │ Registry  │ │  (compaction)  │
//!       └────────────┘ └───────────┘ └────────────────┘
//! ```
//!
//! Shared state (permission gate, token counters) lives in a
//! [`RuntimeContext`] created once by the application.

pub mod compaction;
mod context;
mod r#loop;

pub use compaction::{ContextManager, UsageEstimate};
pub use context::{
    RuntimeContext, SystemPromptBuilder, TokenUsage, UsageSnapshot, PROJECT_CONTEXT_FILES,
};
pub use r#loop::{
    AgentLoop, AgentSettings, CompactionReport, NullObserver, TurnObserver, TurnOutcome,
    MIN_MANUAL_COMPACT_MESSAGES,
};
