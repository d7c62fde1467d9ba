//! Providers module - LLM backends (Azure OpenAI, Ollama, Gemini)
//!
//! This module defines the `LLMProvider` trait and common types for talking
//! to the supported backends. Each backend implements the trait so the
//! agent loop never sees a vendor wire format.
//!
//! # Example
//!
//! ```rust,ignore
//! use codecli::providers::{ChatOptions, LLMProvider, OllamaProvider};
//! use codecli::session::Message;
//!
//! async fn example() {
//!     let provider = OllamaProvider::new("http://localhost:11434", "llama3.2");
//!     let messages = vec![Message::user("Hello!")];
//!     let options = ChatOptions::new().with_max_tokens(1000);
//!
//!     let response = provider.chat(messages, vec![], options).await.unwrap();
//!     println!("Response: {}", response.content);
//! }
//! ```

pub mod azure;
pub mod gemini;
pub mod models;
pub mod ollama;
pub mod sse;
mod types;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::Config;
use crate::error::{CodeCliError, ProviderError, Result};

pub use azure::AzureOpenAIProvider;
pub use gemini::GeminiProvider;
pub use models::{context_window, format_context_window, DEFAULT_CONTEXT_WINDOW};
pub use ollama::OllamaProvider;
pub use types::{
    collect_stream, ChatOptions, LLMProvider, LLMResponse, StreamEvent, ToolDefinition, Usage,
    DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, STREAM_CHANNEL_CAPACITY,
};

/// The supported backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    AzureOpenAI,
    Ollama,
    Gemini,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [
        ProviderKind::AzureOpenAI,
        ProviderKind::Ollama,
        ProviderKind::Gemini,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::AzureOpenAI => "azure-openai",
            ProviderKind::Ollama => "ollama",
            ProviderKind::Gemini => "gemini",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = CodeCliError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "azure-openai" | "azure" | "azure_openai" => Ok(ProviderKind::AzureOpenAI),
            "ollama" => Ok(ProviderKind::Ollama),
            "gemini" | "google" => Ok(ProviderKind::Gemini),
            other => Err(CodeCliError::Config(format!(
                "Unknown provider '{}' (expected one of: azure-openai, ollama, gemini)",
                other
            ))),
        }
    }
}

/// Build the provider selected by `kind` from config.
///
/// # Arguments
/// * `kind` - Backend to build
/// * `config` - Loaded configuration (API keys, endpoints, default models)
/// * `model` - Optional model override (`--model`)
///
/// # Errors
///
/// Returns a `Config` error when a required credential or endpoint is missing.
pub fn create_provider(
    kind: ProviderKind,
    config: &Config,
    model: Option<&str>,
) -> Result<Arc<dyn LLMProvider>> {
    let model = model.map(str::trim).filter(|m| !m.is_empty());
    match kind {
        ProviderKind::AzureOpenAI => {
            let cfg = &config.providers.azure_openai;
            if cfg.endpoint.trim().is_empty() {
                return Err(CodeCliError::Config(
                    "Azure OpenAI endpoint is not set (providers.azure-openai.endpoint or AZURE_OPENAI_ENDPOINT)".into(),
                ));
            }
            if cfg.api_key.trim().is_empty() {
                return Err(CodeCliError::Config(
                    "Azure OpenAI API key is not set (providers.azure-openai.apiKey or AZURE_OPENAI_API_KEY)".into(),
                ));
            }
            Ok(Arc::new(AzureOpenAIProvider::new(
                &cfg.endpoint,
                &cfg.api_key,
                model.unwrap_or(&cfg.deployment),
                &cfg.api_version,
            )))
        }
        ProviderKind::Ollama => {
            let cfg = &config.providers.ollama;
            Ok(Arc::new(OllamaProvider::new(
                &cfg.host,
                model.unwrap_or(&cfg.model),
            )))
        }
        ProviderKind::Gemini => {
            let cfg = &config.providers.gemini;
            if cfg.api_key.trim().is_empty() {
                return Err(CodeCliError::Config(
                    "Gemini API key is not set (providers.gemini.apiKey or GEMINI_API_KEY)".into(),
                ));
            }
            Ok(Arc::new(
                GeminiProvider::new(&cfg.api_key, model.unwrap_or(&cfg.model))
                    .with_api_base(&cfg.api_base),
            ))
        }
    }
}

// ============================================================================
// Shared HTTP plumbing
// ============================================================================

/// Map a reqwest failure that happened before a response arrived.
pub(crate) fn transport_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout(err.to_string())
    } else {
        ProviderError::Transport(err.to_string())
    }
}

/// Send a request and turn any non-2xx answer into a classified
/// [`ProviderError`] carrying the exact status and body.
pub(crate) async fn send_checked(request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
    let response = request.send().await.map_err(transport_error)?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    tracing::debug!(status = status.as_u16(), body = %body, "Provider returned error status");
    Err(ProviderError::from_status(status.as_u16(), &body).into())
}

/// Decode a JSON response body, reporting failures as `ProviderError::Format`.
pub(crate) async fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T> {
    let text = response.text().await.map_err(transport_error)?;
    serde_json::from_str(&text).map_err(|e| {
        ProviderError::Format(format!("{}: {}", e, crate::utils::string::preview(&text, 200)))
            .into()
    })
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_parse() {
        assert_eq!("azure-openai".parse::<ProviderKind>().unwrap(), ProviderKind::AzureOpenAI);
        assert_eq!("Ollama".parse::<ProviderKind>().unwrap(), ProviderKind::Ollama);
        assert_eq!("gemini".parse::<ProviderKind>().unwrap(), ProviderKind::Gemini);
        assert!(matches!(
            "openai".parse::<ProviderKind>(),
            Err(CodeCliError::Config(_))
        ));
    }

    #[test]
    fn test_provider_kind_display_roundtrip() {
        for kind in ProviderKind::ALL {
            assert_eq!(kind.to_string().parse::<ProviderKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_create_provider_requires_credentials() {
        let config = Config::default();
        assert!(create_provider(ProviderKind::AzureOpenAI, &config, None).is_err());
        assert!(create_provider(ProviderKind::Gemini, &config, None).is_err());
    }

    #[test]
    fn test_create_provider_model_override() {
        let config = Config::default();
        let provider = create_provider(ProviderKind::Ollama, &config, Some("qwen3")).unwrap();
        assert_eq!(provider.name(), "ollama");
        assert_eq!(provider.model(), "qwen3");
        assert_eq!(provider.context_window(), 262_144);

        let provider = create_provider(ProviderKind::Ollama, &config, Some("  ")).unwrap();
        assert_eq!(provider.model(), "llama3.2");
    }

    #[test]
    fn test_create_gemini_with_key() {
        let mut config = Config::default();
        config.providers.gemini.api_key = "k".into();
        let provider = create_provider(ProviderKind::Gemini, &config, None).unwrap();
        assert_eq!(provider.model(), "gemini-2.0-flash");
        assert_eq!(provider.context_window(), 1_048_576);
    }

    #[tokio::test]
    async fn test_send_checked_keeps_status_and_body() {
        let (base, _rx) = test_server::serve(vec![test_server::CannedResponse::json(
            503,
            "{\"error\":\"overloaded\"}",
        )])
        .await;
        let client = reqwest::Client::new();
        let err = send_checked(client.get(format!("{}/x", base)))
            .await
            .unwrap_err();
        match err {
            CodeCliError::Provider(p) => {
                assert_eq!(p.status_code(), Some(503));
                assert_eq!(p.body(), Some("{\"error\":\"overloaded\"}"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_send_checked_transport_failure() {
        let client = reqwest::Client::new();
        // port 9 (discard) on localhost is closed in test environments
        let err = send_checked(client.get("http://127.0.0.1:9/"))
            .await
            .unwrap_err();
        assert!(matches!(err, CodeCliError::Provider(ref p) if p.is_transport()));
    }
}
