//! Shared types for the agent core.
//!
//! Conversation turns, orchestrator states, exchange outcomes, and the
//! entries stored in the event log.

use serde::{Deserialize, Serialize};

use crate::inference::types::{ErrorKind, ToolCallRequest};
use crate::tools::ToolResult;

// ─── Conversation Turns ─────────────────────────────────────────────────────

/// One atomic entry in the conversation history.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Turn {
    /// Text typed by the user.
    User { text: String },
    /// Model output: a final text reply or the tool calls it requested.
    Assistant { content: AssistantContent },
    /// The envelope a tool returned for one call.
    ToolResult {
        call_id: String,
        name: String,
        payload: ToolResult,
    },
}

/// What an assistant turn carries.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssistantContent {
    Text(String),
    ToolCalls(Vec<ToolCallRequest>),
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self::User { text: text.into() }
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self::Assistant {
            content: AssistantContent::Text(text.into()),
        }
    }

    pub fn assistant_tool_call(call: ToolCallRequest) -> Self {
        Self::Assistant {
            content: AssistantContent::ToolCalls(vec![call]),
        }
    }

    pub fn tool_result(
        call_id: impl Into<String>,
        name: impl Into<String>,
        payload: ToolResult,
    ) -> Self {
        Self::ToolResult {
            call_id: call_id.into(),
            name: name.into(),
            payload,
        }
    }

    /// Call ids requested by this turn (empty unless it is an assistant
    /// tool-call turn).
    pub fn requested_call_ids(&self) -> impl Iterator<Item = &str> {
        let calls: &[ToolCallRequest] = match self {
            Turn::Assistant {
                content: AssistantContent::ToolCalls(calls),
            } => calls,
            _ => &[],
        };
        calls.iter().map(|c| c.call_id.as_str())
    }
}

// ─── Orchestrator State ─────────────────────────────────────────────────────

/// Named states of the orchestration state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorState {
    /// No exchange in flight.
    Idle,
    /// Waiting for the model gateway to decide.
    AwaitingModel,
    /// Running a tool executor.
    ExecutingTool,
    /// The exchange failed; returns to `Idle` once the failure is surfaced.
    Errored,
}

impl OrchestratorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrchestratorState::Idle => "idle",
            OrchestratorState::AwaitingModel => "awaiting_model",
            OrchestratorState::ExecutingTool => "executing_tool",
            OrchestratorState::Errored => "errored",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "awaiting_model" => OrchestratorState::AwaitingModel,
            "executing_tool" => OrchestratorState::ExecutingTool,
            "errored" => OrchestratorState::Errored,
            _ => OrchestratorState::Idle,
        }
    }
}

impl std::fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Exchange Outcome ───────────────────────────────────────────────────────

/// Why an exchange ended in `Errored`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FailureReason {
    /// The gateway returned `Decision::Error`.
    Gateway { kind: ErrorKind },
    /// The model kept requesting tools past the round-trip bound.
    RoundLimit { limit: usize },
}

/// Message shown when the tool round-trip bound is exceeded.
pub const ROUND_LIMIT_MESSAGE: &str = "Sorry, that request needed too many steps to complete. \
Please try again with a simpler or more specific request.";

/// Result of one `submit` as seen by the UI collaborator.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExchangeOutcome {
    /// The model produced its final text.
    Reply { text: String },
    /// The exchange failed; `message` is user-safe.
    Failed {
        reason: FailureReason,
        message: String,
    },
    /// The caller abandoned the exchange; nothing was committed.
    Cancelled,
}

impl ExchangeOutcome {
    /// The text to show the user, if any.
    pub fn display_text(&self) -> Option<&str> {
        match self {
            ExchangeOutcome::Reply { text } => Some(text),
            ExchangeOutcome::Failed { message, .. } => Some(message),
            ExchangeOutcome::Cancelled => None,
        }
    }
}

// ─── Event Log ──────────────────────────────────────────────────────────────

/// Outcome of one tool invocation, as recorded in the event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationStatus {
    /// The executor returned `success: true`.
    Success,
    /// The executor returned `success: false`, errored, or panicked.
    Failure,
    /// The model named a tool that is not registered.
    UnknownTool,
    /// Arguments did not match the tool's schema; the executor never ran.
    InvalidArguments,
}

impl InvocationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvocationStatus::Success => "success",
            InvocationStatus::Failure => "failure",
            InvocationStatus::UnknownTool => "unknown_tool",
            InvocationStatus::InvalidArguments => "invalid_arguments",
        }
    }

    /// Parse from the stored form. Unrecognized values read as `Failure`.
    pub fn parse(s: &str) -> Self {
        match s {
            "success" => InvocationStatus::Success,
            "unknown_tool" => InvocationStatus::UnknownTool,
            "invalid_arguments" => InvocationStatus::InvalidArguments,
            _ => InvocationStatus::Failure,
        }
    }
}

/// A `tool_invoked` event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInvocation {
    pub id: i64,
    /// RFC 3339 timestamp.
    pub timestamp: String,
    pub call_id: String,
    pub tool_name: String,
    pub arguments: serde_json::Value,
    pub result: serde_json::Value,
    pub status: InvocationStatus,
    pub duration_ms: u64,
}

/// Input for recording a tool invocation (no DB fields).
#[derive(Debug, Clone)]
pub struct NewToolInvocation<'a> {
    pub call_id: &'a str,
    pub tool_name: &'a str,
    pub arguments: &'a serde_json::Value,
    pub result: &'a serde_json::Value,
    pub status: InvocationStatus,
    pub duration_ms: u64,
}

/// A `state_transition` event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateTransition {
    pub id: i64,
    pub timestamp: String,
    pub from: OrchestratorState,
    pub to: OrchestratorState,
}

// ─── Tests ──────────────────────────────────────────────────────────────────
