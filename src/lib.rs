//! CodeCLI - AI coding assistant runtime for the terminal
//!
//! The library holds the agent runtime; the `codecli` binary adds the
//! interactive prompt and headless mode on top of it.
//!
//! - [`providers`]: Azure OpenAI, Ollama and Gemini behind one trait
//! - [`agent`]: the tool-calling loop, compaction and shared runtime state
//! - [`tools`]: file, search and shell tools
//! - [`security`]: the permission gate and God Mode
//! - [`session`]: conversation persistence and checkpoints

pub mod agent;
pub mod config;
pub mod error;
pub mod providers;
pub mod runtime;
pub mod security;
pub mod session;
pub mod tools;
pub mod utils;

pub use agent::{AgentLoop, AgentSettings, RuntimeContext, TurnObserver, TurnOutcome};
pub use config::Config;
pub use error::{CodeCliError, ProviderError, Result};
pub use providers::{ChatOptions, LLMProvider, LLMResponse, StreamEvent, ToolDefinition, Usage};
pub use session::{Message, Role, SessionStore, ToolCall};
