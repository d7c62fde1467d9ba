//! Configuration type definitions for CodeCLI
//!
//! This module defines all configuration structs used by the agent runtime.
//! All types implement serde traits for JSON serialization and have sensible
//! defaults, so a partial `config.json` only needs the keys it changes.

use serde::{Deserialize, Serialize};

/// Main configuration struct for CodeCLI
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Provider used when `--provider` is not given ("azure-openai", "ollama", "gemini")
    pub default_provider: String,
    /// Sampling temperature for regular turns
    pub temperature: f32,
    /// Maximum tokens the model may generate per response
    pub max_tokens: u32,
    /// Permission policy (auto-approve flags, command allow/block lists)
    pub permissions: PermissionsConfig,
    /// Per-backend provider settings
    pub providers: ProvidersConfig,
    /// Agent loop limits
    pub agent: AgentConfig,
    /// Context compaction settings
    pub compaction: CompactionConfig,
    /// Logging output
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_provider: "gemini".to_string(),
            temperature: 0.7,
            max_tokens: 4096,
            permissions: PermissionsConfig::default(),
            providers: ProvidersConfig::default(),
            agent: AgentConfig::default(),
            compaction: CompactionConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

// ============================================================================
// Permissions Configuration
// ============================================================================

/// Static permission policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PermissionsConfig {
    /// Approve every file read without prompting
    pub auto_approve_read: bool,
    /// Approve every file write without prompting
    pub auto_approve_write: bool,
    /// Approve every shell command without prompting
    pub auto_approve_execute: bool,
    /// Commands approved when the command line starts with one of these
    pub allowed_commands: Vec<String>,
    /// Commands denied when the command line contains one of these
    pub blocked_commands: Vec<String>,
}

impl Default for PermissionsConfig {
    fn default() -> Self {
        Self {
            auto_approve_read: true,
            auto_approve_write: false,
            auto_approve_execute: false,
            allowed_commands: [
                "ls",
                "dir",
                "cat",
                "type",
                "echo",
                "pwd",
                "cd",
                "git status",
                "git diff",
                "git log",
                "node --version",
                "npm --version",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            blocked_commands: ["rm -rf /", "format", "del /s /q"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

// ============================================================================
// Provider Configuration
// ============================================================================

/// Settings for every supported backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Azure OpenAI deployment
    #[serde(rename = "azure-openai")]
    pub azure_openai: AzureOpenAIConfig,
    /// Local Ollama server
    pub ollama: OllamaConfig,
    /// Google Gemini API
    pub gemini: GeminiConfig,
}

/// Azure OpenAI settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AzureOpenAIConfig {
    /// API key sent in the `api-key` header
    pub api_key: String,
    /// Resource endpoint, e.g. `https://my-resource.openai.azure.com`
    pub endpoint: String,
    /// Deployment name (also reported as the model name)
    pub deployment: String,
    /// REST API version query parameter
    pub api_version: String,
}

impl Default for AzureOpenAIConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: String::new(),
            deployment: "gpt-4o".to_string(),
            api_version: "2024-12-01-preview".to_string(),
        }
    }
}

/// Ollama settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OllamaConfig {
    /// Server base URL
    pub host: String,
    /// Model tag
    pub model: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost:11434".to_string(),
            model: "llama3.2".to_string(),
        }
    }
}

/// Gemini settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GeminiConfig {
    /// API key passed as the `key` query parameter
    pub api_key: String,
    /// Model name
    pub model: String,
    /// API base URL (overridable for proxies and tests)
    pub api_base: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gemini-2.0-flash".to_string(),
            api_base: "https://generativelanguage.googleapis.com/v1beta".to_string(),
        }
    }
}

// ============================================================================
// Agent Configuration
// ============================================================================

/// Agent loop limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AgentConfig {
    /// Maximum model round-trips per turn
    pub max_iterations: u32,
    /// Maximum model round-trips per turn while God Mode is on
    pub god_mode_max_iterations: u32,
    /// A checkpoint is recorded whenever the message count is a multiple of this
    pub checkpoint_interval: usize,
    /// Use streaming responses (falls back to blocking chat on failure)
    pub streaming: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 25,
            god_mode_max_iterations: 1000,
            checkpoint_interval: 10,
            streaming: true,
        }
    }
}

// ============================================================================
// Compaction Configuration
// ============================================================================

/// Context compaction configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompactionConfig {
    /// Whether automatic context compaction is enabled.
    pub enabled: bool,
    /// Fraction (0.0-1.0) of the context window that triggers compaction.
    pub threshold: f64,
    /// Number of most recent messages kept verbatim.
    pub keep_recent: usize,
    /// Minimum number of older messages worth summarizing.
    pub min_summarize: usize,
    /// Token limit for the summarization request.
    pub summary_max_tokens: u32,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 0.75,
            keep_recent: 4,
            min_summarize: 4,
            summary_max_tokens: 2000,
        }
    }
}

// ============================================================================
// Logging Configuration
// ============================================================================

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable multi-line output
    Pretty,
    /// `[timestamp] [LEVEL] target message {fields}`
    #[default]
    Component,
    /// Structured JSON lines
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Output format
    pub format: LogFormat,
    /// Optional log file (stderr when unset)
    pub file: Option<String>,
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            file: None,
            level: "warn".to_string(),
        }
    }
}
