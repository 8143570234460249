//! Inference error types.
//!
//! All errors implement `std::error::Error` via `thiserror`. Structured logging
//! is the caller's responsibility; these types carry the context needed to build
//! meaningful log entries. None of them is shown to the end user verbatim: the
//! gateway collapses them into an [`ErrorKind`] with a fixed user-safe message.

use thiserror::Error;

use super::types::ErrorKind;

/// Errors that can occur while consulting the model provider.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// TCP/HTTP connection to the model endpoint failed.
    #[error("connection failed to {endpoint}: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    /// The model endpoint did not respond within the configured timeout.
    #[error("inference timeout after {duration_secs}s")]
    Timeout { duration_secs: u64 },

    /// The provider rejected the credential (HTTP 401/403).
    #[error("provider rejected credentials (HTTP {status})")]
    Unauthorized { status: u16 },

    /// No API key is configured and mock mode is off.
    #[error("no API key configured; set `api_key` or enable `development_mock_mode`")]
    MissingCredential,

    /// Any other non-2xx HTTP response from the model endpoint.
    #[error("HTTP {status}: {body}")]
    HttpError { status: u16, body: String },

    /// The reply body was not valid JSON or lacked the expected fields.
    #[error("malformed reply: {reason}")]
    MalformedReply { reason: String },

    /// A structured tool call carried arguments that are not valid JSON.
    #[error("tool call parse error: {reason}")]
    ToolCallParseError {
        raw_arguments: String,
        reason: String,
    },

    /// Configuration loading or validation error.
    #[error("config error: {reason}")]
    ConfigError { reason: String },
}

impl InferenceError {
    /// Map onto the user-facing error taxonomy.
    pub fn category(&self) -> ErrorKind {
        match self {
            Self::Unauthorized { .. } | Self::MissingCredential => ErrorKind::Auth,
            Self::ConnectionFailed { .. } | Self::Timeout { .. } | Self::HttpError { .. } => {
                ErrorKind::Transport
            }
            Self::MalformedReply { .. } | Self::ToolCallParseError { .. } => {
                ErrorKind::MalformedReply
            }
            Self::ConfigError { .. } => ErrorKind::Auth,
        }
    }

    /// Extract the error body text, if this is an `HttpError`.
    pub fn error_body(&self) -> Option<&str> {
        match self {
            Self::HttpError { body, .. } => Some(body),
            _ => None,
        }
    }
}
