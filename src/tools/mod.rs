//! Tools module - tool definitions and execution for LLM function calling
//!
//! # Overview
//!
//! - `Tool` trait: the interface every tool implements
//! - `ToolContext`: working directory, permission gate and process runner
//! - `ToolRegistry`: holds tools and runs the calls a model makes
//!
//! # Built-in Tools
//!
//! - `read_file`, `write_file`, `list_directory` ([`filesystem`])
//! - `file_search`, `code_search` ([`search`])
//! - `run_command` ([`shell`])
//!
//! # Example
//!
//! ```rust
//! use codecli::tools::{ToolContext, ToolRegistry};
//! use codecli::session::ToolCall;
//!
//! # tokio_test::block_on(async {
//! let dir = std::env::temp_dir();
//! let registry = ToolRegistry::with_builtins();
//! let ctx = ToolContext::non_interactive(&dir);
//!
//! let calls = vec![ToolCall::new("call_1", "list_directory", "{}")];
//! let results = registry.execute_tool_calls(&calls, &ctx).await;
//! assert_eq!(results[0].tool_call_id, "call_1");
//! # });
//! ```

pub mod filesystem;
mod registry;
pub mod search;
pub mod shell;
mod types;

pub use registry::{ToolRegistry, ToolResult};
pub use types::{Tool, ToolContext, ToolOutput};
