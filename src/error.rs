//! Error types for CodeCLI
//!
//! This module defines all error types used throughout the agent runtime.
//! Uses `thiserror` for ergonomic error handling with automatic `Display` and
//! `Error` trait implementations.

use std::fmt;
use thiserror::Error;

// ============================================================================
// Provider Error Classification
// ============================================================================

/// Structured provider error.
///
/// Every non-2xx HTTP response from a backend is turned into one of the
/// status-carrying variants, keeping both the exact status code and the raw
/// response body. Network-level failures are reported as `Transport` or
/// `Timeout`, and responses that cannot be decoded as `Format`.
#[derive(Debug)]
pub enum ProviderError {
    /// 401/403 - Invalid API key or authentication failure
    Auth { status: u16, body: String },
    /// 402 - Payment required or billing issue
    Billing { status: u16, body: String },
    /// 404 - Model or deployment not found
    ModelNotFound { status: u16, body: String },
    /// 429 - Rate limit or quota exceeded
    RateLimit { status: u16, body: String },
    /// 400/413/422 - Bad request, invalid JSON, malformed parameters
    InvalidRequest { status: u16, body: String },
    /// 5xx - Server-side errors
    ServerError { status: u16, body: String },
    /// Any other non-success status
    Http { status: u16, body: String },
    /// Connection failure before a response was received
    Transport(String),
    /// Connection or read timeout
    Timeout(String),
    /// Response body could not be decoded
    Format(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Auth { status, body } => {
                write!(f, "Authentication error ({}): {}", status, body)
            }
            ProviderError::Billing { status, body } => {
                write!(f, "Billing error ({}): {}", status, body)
            }
            ProviderError::ModelNotFound { status, body } => {
                write!(f, "Model not found ({}): {}", status, body)
            }
            ProviderError::RateLimit { status, body } => {
                write!(f, "Rate limit error ({}): {}", status, body)
            }
            ProviderError::InvalidRequest { status, body } => {
                write!(f, "Invalid request ({}): {}", status, body)
            }
            ProviderError::ServerError { status, body } => {
                write!(f, "Server error ({}): {}", status, body)
            }
            ProviderError::Http { status, body } => write!(f, "HTTP {}: {}", status, body),
            ProviderError::Transport(msg) => write!(f, "Transport error: {}", msg),
            ProviderError::Timeout(msg) => write!(f, "Timeout: {}", msg),
            ProviderError::Format(msg) => write!(f, "Format error: {}", msg),
        }
    }
}

impl ProviderError {
    /// Classify a non-success HTTP response.
    ///
    /// # Example
    /// ```
    /// use codecli::error::ProviderError;
    ///
    /// let err = ProviderError::from_status(429, "slow down");
    /// assert!(matches!(err, ProviderError::RateLimit { .. }));
    /// assert_eq!(err.status_code(), Some(429));
    /// assert_eq!(err.body(), Some("slow down"));
    /// ```
    pub fn from_status(status: u16, body: &str) -> Self {
        let body = body.to_string();
        match status {
            401 | 403 => ProviderError::Auth { status, body },
            402 => ProviderError::Billing { status, body },
            404 => ProviderError::ModelNotFound { status, body },
            429 => ProviderError::RateLimit { status, body },
            400 | 413 | 422 => ProviderError::InvalidRequest { status, body },
            500..=599 => ProviderError::ServerError { status, body },
            _ => ProviderError::Http { status, body },
        }
    }

    /// Returns the HTTP status code carried by this error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ProviderError::Auth { status, .. }
            | ProviderError::Billing { status, .. }
            | ProviderError::ModelNotFound { status, .. }
            | ProviderError::RateLimit { status, .. }
            | ProviderError::InvalidRequest { status, .. }
            | ProviderError::ServerError { status, .. }
            | ProviderError::Http { status, .. } => Some(*status),
            ProviderError::Transport(_)
            | ProviderError::Timeout(_)
            | ProviderError::Format(_) => None,
        }
    }

    /// Returns the raw response body carried by this error, if any.
    pub fn body(&self) -> Option<&str> {
        match self {
            ProviderError::Auth { body, .. }
            | ProviderError::Billing { body, .. }
            | ProviderError::ModelNotFound { body, .. }
            | ProviderError::RateLimit { body, .. }
            | ProviderError::InvalidRequest { body, .. }
            | ProviderError::ServerError { body, .. }
            | ProviderError::Http { body, .. } => Some(body),
            ProviderError::Transport(_)
            | ProviderError::Timeout(_)
            | ProviderError::Format(_) => None,
        }
    }

    /// Returns `true` if no HTTP response was received at all.
    pub fn is_transport(&self) -> bool {
        matches!(self, ProviderError::Transport(_) | ProviderError::Timeout(_))
    }
}

impl From<ProviderError> for CodeCliError {
    fn from(err: ProviderError) -> Self {
        CodeCliError::Provider(err)
    }
}

// ============================================================================
// Primary Error Type
// ============================================================================

/// The primary error type for CodeCLI operations.
#[derive(Error, Debug)]
pub enum CodeCliError {
    /// Configuration-related errors (invalid config, unknown provider, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Provider errors (non-2xx responses, network failures, bad payloads)
    #[error("Provider error: {0}")]
    Provider(ProviderError),

    /// Tool execution errors (invalid parameters, execution failures, etc.)
    #[error("Tool error: {0}")]
    Tool(String),

    /// Session management errors (no active session, invalid state)
    #[error("Session error: {0}")]
    Session(String),

    /// No stored session matches the requested id or id prefix
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Summarization request failed during compaction
    #[error("Compaction failed: {0}")]
    Compaction(String),

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client errors not tied to a specific provider response
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Resource not found (files, tools, checkpoints, etc.)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Security violations (blocked commands, invalid paths, etc.)
    #[error("Security violation: {0}")]
    SecurityViolation(String),
}

/// A specialized `Result` type for CodeCLI operations.
pub type Result<T> = std::result::Result<T, CodeCliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CodeCliError::Config("missing API key".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing API key");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: CodeCliError = io_err.into();
        assert!(matches!(err, CodeCliError::Io(_)));
    }

    #[test]
    fn test_session_not_found_display() {
        let err = CodeCliError::SessionNotFound("abc123".to_string());
        assert_eq!(err.to_string(), "Session not found: abc123");
    }

    // ====================================================================
    // ProviderError tests
    // ====================================================================

    #[test]
    fn test_from_status_classification() {
        assert!(matches!(
            ProviderError::from_status(401, ""),
            ProviderError::Auth { .. }
        ));
        assert!(matches!(
            ProviderError::from_status(403, ""),
            ProviderError::Auth { .. }
        ));
        assert!(matches!(
            ProviderError::from_status(402, ""),
            ProviderError::Billing { .. }
        ));
        assert!(matches!(
            ProviderError::from_status(404, ""),
            ProviderError::ModelNotFound { .. }
        ));
        assert!(matches!(
            ProviderError::from_status(429, ""),
            ProviderError::RateLimit { .. }
        ));
        assert!(matches!(
            ProviderError::from_status(422, ""),
            ProviderError::InvalidRequest { .. }
        ));
        assert!(matches!(
            ProviderError::from_status(503, ""),
            ProviderError::ServerError { .. }
        ));
        assert!(matches!(
            ProviderError::from_status(418, ""),
            ProviderError::Http { .. }
        ));
    }

    #[test]
    fn test_status_and_body_preserved() {
        let err = ProviderError::from_status(502, "bad gateway");
        assert_eq!(err.status_code(), Some(502));
        assert_eq!(err.body(), Some("bad gateway"));
        assert_eq!(err.to_string(), "Server error (502): bad gateway");
    }

    #[test]
    fn test_transport_errors_have_no_status() {
        let err = ProviderError::Transport("connection refused".into());
        assert_eq!(err.status_code(), None);
        assert_eq!(err.body(), None);
        assert!(err.is_transport());
        assert!(ProviderError::Timeout("30s".into()).is_transport());
        assert!(!ProviderError::from_status(500, "").is_transport());
    }

    #[test]
    fn test_provider_error_into_codecli_error() {
        let err: CodeCliError = ProviderError::from_status(429, "too fast").into();
        assert!(matches!(err, CodeCliError::Provider(_)));
        assert_eq!(
            err.to_string(),
            "Provider error: Rate limit error (429): too fast"
        );
    }
}
