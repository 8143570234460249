//! Conversation State — ordered, append-only log of turns.
//!
//! The full log is replayed to the model on every request. Turns are never
//! edited or removed one by one; `reset` clears everything at once.

use super::errors::AgentError;
use super::types::Turn;

// ─── ConversationState ──────────────────────────────────────────────────────

/// Turn history for the active session.
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    turns: Vec<Turn>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one turn.
    ///
    /// A tool-result turn is rejected unless an earlier assistant turn
    /// requested its call id.
    pub fn append(&mut self, turn: Turn) -> Result<(), AgentError> {
        check_call_id(&self.turns, &[], &turn)?;
        self.turns.push(turn);
        Ok(())
    }

    /// Append a batch of turns all-or-nothing.
    ///
    /// Used to commit an exchange: either every turn lands or none does.
    pub fn extend(&mut self, turns: Vec<Turn>) -> Result<(), AgentError> {
        for (i, turn) in turns.iter().enumerate() {
            check_call_id(&self.turns, &turns[..i], turn)?;
        }
        self.turns.extend(turns);
        Ok(())
    }

    /// Read-only ordered view of the history.
    pub fn snapshot(&self) -> &[Turn] {
        &self.turns
    }

    /// Clear every turn (new session).
    pub fn reset(&mut self) {
        self.turns.clear();
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

/// Verify that a tool-result turn answers a call requested in `committed`
/// or `staged`.
fn check_call_id(committed: &[Turn], staged: &[Turn], turn: &Turn) -> Result<(), AgentError> {
    let Turn::ToolResult { call_id, .. } = turn else {
        return Ok(());
    };

    let requested = committed
        .iter()
        .chain(staged)
        .any(|t| t.requested_call_ids().any(|id| id == call_id));

    if requested {
        Ok(())
    } else {
        Err(AgentError::OrphanToolResult {
            call_id: call_id.clone(),
        })
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::types::ToolCallRequest;
    use crate::tools::ToolResult;
    use serde_json::json;

    fn call(id: &str) -> Turn {
        Turn::assistant_tool_call(ToolCallRequest {
            call_id: id.into(),
            name: "listAccounts".into(),
            raw_arguments: "{}".into(),
        })
    }

    fn result(id: &str) -> Turn {
        Turn::tool_result(id, "listAccounts", ToolResult::ok(json!({"accounts": []})))
    }

    #[test]
    fn test_snapshot_preserves_append_order() {
        let turns = vec![
            Turn::user("first"),
            call("call_1"),
            result("call_1"),
            Turn::assistant_text("done"),
            Turn::user("second"),
        ];

        let mut state = ConversationState::new();
        for turn in turns.clone() {
            state.append(turn).unwrap();
        }

        assert_eq!(state.len(), turns.len());
        assert_eq!(state.snapshot(), turns.as_slice());
    }

    #[test]
    fn test_orphan_tool_result_rejected() {
        let mut state = ConversationState::new();
        state.append(Turn::user("hi")).unwrap();

        let err = state.append(result("call_x")).unwrap_err();
        assert!(matches!(err, AgentError::OrphanToolResult { call_id } if call_id == "call_x"));
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn test_result_must_match_call_id() {
        let mut state = ConversationState::new();
        state.append(call("call_1")).unwrap();
        assert!(state.append(result("call_2")).is_err());
        assert!(state.append(result("call_1")).is_ok());
    }

    #[test]
    fn test_extend_is_all_or_nothing() {
        let mut state = ConversationState::new();
        state.append(Turn::user("hi")).unwrap();

        let bad = vec![Turn::user("again"), call("call_1"), result("call_9")];
        assert!(state.extend(bad).is_err());
        assert_eq!(state.len(), 1);

        let good = vec![Turn::user("again"), call("call_1"), result("call_1")];
        state.extend(good).unwrap();
        assert_eq!(state.len(), 4);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut state = ConversationState::new();
        state.append(Turn::user("hi")).unwrap();
        state.append(Turn::assistant_text("hello")).unwrap();
        state.reset();
        assert!(state.is_empty());
        assert!(state.snapshot().is_empty());
    }
}
