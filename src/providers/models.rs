//! Static model metadata: context windows and fallback model lists.

/// Context window used for models missing from the table.
pub const DEFAULT_CONTEXT_WINDOW: usize = 8192;

/// Known context windows, in tokens.
const MODEL_TOKEN_LIMITS: &[(&str, usize)] = &[
    // OpenAI / Azure OpenAI
    ("gpt-4o", 128_000),
    ("gpt-4o-mini", 128_000),
    ("gpt-4-turbo", 128_000),
    ("gpt-4-turbo-preview", 128_000),
    ("gpt-4", 8192),
    ("gpt-4-32k", 32_768),
    ("gpt-3.5-turbo", 16_385),
    ("gpt-35-turbo", 16_385),
    ("gpt-3.5-turbo-16k", 16_385),
    ("o1", 200_000),
    ("o1-mini", 128_000),
    ("o1-preview", 128_000),
    ("o3-mini", 200_000),
    // Ollama
    ("llama3.2", 131_072),
    ("llama3.1", 131_072),
    ("llama3", 8192),
    ("llama2", 4096),
    ("mistral", 32_768),
    ("mixtral", 32_768),
    ("codellama", 16_384),
    ("deepseek-coder", 16_384),
    ("deepseek-r1", 131_072),
    ("phi3", 128_000),
    ("phi4", 16_384),
    ("qwen2.5", 131_072),
    ("qwen2.5-coder", 131_072),
    ("qwen3", 262_144),
    ("qwen3-coder", 262_144),
    ("gemma2", 8192),
    ("command-r", 131_072),
    // Gemini
    ("gemini-2.0-flash", 1_048_576),
    ("gemini-2.0-flash-lite", 1_048_576),
    ("gemini-2.5-flash", 1_048_576),
    ("gemini-2.5-pro", 1_048_576),
    ("gemini-3-flash", 1_048_576),
    ("gemini-1.5-pro", 2_097_152),
    ("gemini-1.5-flash", 1_048_576),
    ("gemini-1.5-flash-8b", 1_048_576),
    ("gemini-1.0-pro", 32_768),
    ("gemini-pro", 32_768),
];

pub const AZURE_MODELS: &[&str] = &["gpt-4o", "gpt-4o-mini", "gpt-4-turbo", "gpt-4", "gpt-3.5-turbo"];

pub const OLLAMA_FALLBACK_MODELS: &[&str] = &["llama3.2", "codellama", "mistral", "deepseek-coder"];

pub const GEMINI_MODELS: &[&str] = &[
    "gemini-2.0-flash",
    "gemini-2.0-flash-lite",
    "gemini-2.5-flash-preview-05-20",
    "gemini-2.5-pro-preview-05-06",
    "gemini-3-flash-preview",
    "gemini-1.5-pro",
    "gemini-1.5-flash",
];

/// Context window for `model`.
///
/// Exact match first, then the longest table key the model name starts
/// with (so `llama3.2:3b` resolves through `llama3.2`), then 8192.
///
/// # Example
/// ```
/// use codecli::providers::context_window;
///
/// assert_eq!(context_window("gpt-4o"), 128_000);
/// assert_eq!(context_window("gpt-4o-mini-2024-07-18"), 128_000);
/// assert_eq!(context_window("llama3.2:3b"), 131_072);
/// assert_eq!(context_window("my-custom-model"), 8192);
/// ```
pub fn context_window(model: &str) -> usize {
    let model = model.trim().to_lowercase();
    if let Some((_, limit)) = MODEL_TOKEN_LIMITS.iter().find(|(name, _)| *name == model) {
        return *limit;
    }
    MODEL_TOKEN_LIMITS
        .iter()
        .filter(|(name, _)| model.starts_with(name))
        .max_by_key(|(name, _)| name.len())
        .map(|(_, limit)| *limit)
        .unwrap_or(DEFAULT_CONTEXT_WINDOW)
}

/// Human-readable window size: `1.0M`, `128K`, `4096`.
pub fn format_context_window(tokens: usize) -> String {
    if tokens >= 1_000_000 {
        format!("{:.1}M", tokens as f64 / 1_000_000.0)
    } else if tokens >= 1000 {
        format!("{:.0}K", tokens as f64 / 1000.0)
    } else {
        tokens.to_string()
    }
}
