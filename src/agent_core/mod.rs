//! Agent Core — the orchestration engine.
//!
//! Submodules:
//! - `conversation`: Append-only turn history replayed on every request
//! - `orchestrator`: The request/execute/respond state machine
//! - `event_log`: SQLite-backed log of tool invocations and state transitions
//! - `truncate`: Byte-bounded truncation of log lines and tool results
//! - `types`: Shared types across the agent core
//! - `errors`: Agent-level error types

pub mod conversation;
pub mod errors;
pub mod event_log;
pub mod orchestrator;
pub(crate) mod truncate;
pub mod types;

// Re-exports for convenience
pub use conversation::ConversationState;
pub use errors::AgentError;
pub use event_log::EventLog;
pub use orchestrator::{Orchestrator, OrchestratorConfig};
pub use types::{
    AssistantContent, ExchangeOutcome, FailureReason, InvocationStatus, OrchestratorState,
    StateTransition, ToolInvocation, Turn,
};
