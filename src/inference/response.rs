//! Chat completion reply parsing.
//!
//! Turns a raw response body into exactly one [`Decision`]:
//! structured tool calls win over text, and only the first call of a
//! multi-call reply is acted on.

use serde::Deserialize;
use uuid::Uuid;

use super::errors::InferenceError;
use super::types::{Decision, ToolCallRequest};

// ─── Parsed Reply ────────────────────────────────────────────────────────────

/// The parts of a reply the gateway cares about, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedReply {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallRequest>,
    pub finish_reason: Option<String>,
}

/// Parse a non-streaming chat completion body.
///
/// Fails with `MalformedReply` when the body isn't JSON or lacks
/// `choices[0].message`.
pub fn parse_chat_response(body: &str) -> Result<ParsedReply, InferenceError> {
    #[derive(Deserialize)]
    struct Response {
        choices: Vec<Choice>,
    }

    #[derive(Deserialize)]
    struct Choice {
        message: Message,
        finish_reason: Option<String>,
    }

    #[derive(Deserialize)]
    struct Message {
        content: Option<String>,
        tool_calls: Option<Vec<WireToolCall>>,
    }

    #[derive(Deserialize)]
    struct WireToolCall {
        id: Option<String>,
        function: WireFunction,
    }

    #[derive(Deserialize)]
    struct WireFunction {
        name: String,
        #[serde(default)]
        arguments: Option<String>,
    }

    let resp: Response = serde_json::from_str(body).map_err(|e| InferenceError::MalformedReply {
        reason: format!("failed to parse reply: {e}"),
    })?;

    let choice = resp
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| InferenceError::MalformedReply {
            reason: "empty choices array".into(),
        })?;

    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| ToolCallRequest {
            call_id: tc
                .id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| format!("call_{}", Uuid::new_v4())),
            name: tc.function.name,
            raw_arguments: tc.function.arguments.unwrap_or_default(),
        })
        .collect();

    Ok(ParsedReply {
        content: choice.message.content.filter(|c| !c.trim().is_empty()),
        tool_calls,
        finish_reason: choice.finish_reason,
    })
}

/// Normalize a parsed reply into a single decision.
///
/// Precedence: first structured call → `ToolCall`; otherwise non-empty
/// content → `Text`. Invalid call arguments are an error, never a call with
/// a garbage payload.
pub fn decide_from_reply(reply: ParsedReply) -> Result<Decision, InferenceError> {
    let dropped = reply.tool_calls.len().saturating_sub(1);

    if let Some(call) = reply.tool_calls.into_iter().next() {
        if dropped > 0 {
            tracing::warn!(
                tool = %call.name,
                dropped,
                "reply requested several tool calls; acting on the first only"
            );
        }

        let arguments = parse_arguments(&call.raw_arguments)?;
        return Ok(Decision::ToolCall {
            call_id: call.call_id,
            name: call.name,
            arguments,
        });
    }

    match reply.content {
        Some(text) => Ok(Decision::Text(text)),
        None => Err(InferenceError::MalformedReply {
            reason: format!(
                "reply had neither content nor tool calls (finish_reason: {})",
                reply.finish_reason.as_deref().unwrap_or("none")
            ),
        }),
    }
}

/// Parse the `function.arguments` string. An empty string means "no
/// arguments" (some servers send `""` for parameterless calls).
fn parse_arguments(raw: &str) -> Result<serde_json::Value, InferenceError> {
    if raw.trim().is_empty() {
        return Ok(serde_json::json!({}));
    }
    serde_json::from_str(raw).map_err(|e| InferenceError::ToolCallParseError {
        raw_arguments: raw.to_string(),
        reason: format!("invalid JSON: {e}"),
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────
