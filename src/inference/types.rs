//! Shared types for the model gateway.
//!
//! The request/response structs mirror the OpenAI Chat Completions API. The
//! [`Decision`] type is the provider-independent outcome of one consultation.

use serde::{Deserialize, Serialize};

// ─── Request Types ───────────────────────────────────────────────────────────

/// A single message in the outgoing conversation.
///
/// `content` is serialized as `""` rather than `null` for assistant messages
/// carrying tool calls; several OpenAI-compatible servers reject `null`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(serialize_with = "serialize_content")]
    pub content: Option<String>,
    /// Tool call results are sent back as `tool` role messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Assistant messages may contain tool calls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallResponse>>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::text(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(Role::Assistant, content)
    }

    fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_call_id: None,
            tool_calls: None,
        }
    }
}

/// Emit `""` instead of `null` when `content` is `None`.
fn serialize_content<S>(value: &Option<String>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match value {
        Some(s) => serializer.serialize_str(s),
        None => serializer.serialize_str(""),
    }
}

/// Message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// Tool definition sent in the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub r#type: String,
    pub function: FunctionDefinition,
}

/// Function definition within a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Request body for `POST {base_url}/chat/completions`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Tool call as it appears on the wire (request replay and response).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallResponse {
    pub id: String,
    pub r#type: String,
    pub function: FunctionCallResponse,
}

/// Function call details; `arguments` is a JSON document encoded as a string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCallResponse {
    pub name: String,
    pub arguments: String,
}

// ─── Normalized Types ────────────────────────────────────────────────────────

/// A structured call request as recorded in conversation history.
///
/// `raw_arguments` is untrusted serialized input: it must be parsed and
/// validated against the tool's schema before anything executes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallRequest {
    pub call_id: String,
    pub name: String,
    pub raw_arguments: String,
}

/// User-facing error taxonomy for a failed consultation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Network/HTTP failure reaching the provider.
    Transport,
    /// Missing or rejected credential.
    Auth,
    /// Unparsable or incomplete reply.
    MalformedReply,
}

impl ErrorKind {
    /// The fixed, user-safe message for this kind of failure.
    pub fn user_message(self) -> &'static str {
        match self {
            Self::Transport => {
                "Sorry, I couldn't reach the assistant service. Please try again in a moment."
            }
            Self::Auth => {
                "The assistant service isn't configured correctly. Set a valid API key \
                 (api_key in finchat.yaml or the FINCHAT_API_KEY environment variable), \
                 or enable development_mock_mode, then restart."
            }
            Self::MalformedReply => {
                "Sorry, I received an unexpected response. Please try your request again."
            }
        }
    }
}

/// Normalized outcome of one model consultation.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Plain-text reply; the final answer for this exchange.
    Text(String),
    /// A request to invoke a registered tool with parsed arguments.
    ToolCall {
        call_id: String,
        name: String,
        arguments: serde_json::Value,
    },
    /// The consultation failed; `message` is safe to show the user.
    Error { kind: ErrorKind, message: String },
}

impl Decision {
    /// An error decision carrying the fixed message for `kind`.
    pub fn error(kind: ErrorKind) -> Self {
        Self::Error {
            kind,
            message: kind.user_message().to_string(),
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_choice_omitted_when_none() {
        let req = ChatCompletionRequest {
            model: "test".to_string(),
            messages: vec![],
            tools: None,
            tool_choice: None,
            max_tokens: 1024,
            temperature: 0.2,
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("tool_choice"));
        assert!(!json.contains("\"tools\""));
    }

    #[test]
    fn test_null_content_serialized_as_empty_string() {
        let msg = ChatMessage {
            role: Role::Assistant,
            content: None,
            tool_call_id: None,
            tool_calls: Some(vec![]),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["content"], "");
        assert_eq!(json["role"], "assistant");
        assert!(json.get("tool_call_id").is_none());
    }

    #[test]
    fn test_error_decision_uses_fixed_message() {
        let decision = Decision::error(ErrorKind::Transport);
        match decision {
            Decision::Error { kind, message } => {
                assert_eq!(kind, ErrorKind::Transport);
                assert_eq!(message, ErrorKind::Transport.user_message());
            }
            other => panic!("unexpected decision: {other:?}"),
        }
    }
}
