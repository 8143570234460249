//! Agent Core error types.

use thiserror::Error;

/// Errors that can occur during agent core operations.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Another exchange is already in flight for this conversation.
    #[error("an exchange is already in progress")]
    ExchangeInProgress,

    /// The submitted text was empty or whitespace.
    #[error("message is empty")]
    EmptyInput,

    /// A tool-result turn without a preceding assistant turn requesting it.
    #[error("tool result for call '{call_id}' has no matching tool call")]
    OrphanToolResult { call_id: String },

    /// Event log database operation failed.
    #[error("database error: {reason}")]
    DatabaseError { reason: String },

    /// Serialization error.
    #[error("serialization error: {reason}")]
    SerializationError { reason: String },
}

impl From<rusqlite::Error> for AgentError {
    fn from(e: rusqlite::Error) -> Self {
        AgentError::DatabaseError {
            reason: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(e: serde_json::Error) -> Self {
        AgentError::SerializationError {
            reason: e.to_string(),
        }
    }
}
