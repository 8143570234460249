//! Structured, queryable event log.
//!
//! Every tool invocation and every orchestrator state transition is
//! recorded as a row in SQLite (`rusqlite`, bundled). The default is an
//! in-memory database; point `event_log_path` at a file to keep it.

use std::sync::Mutex;

use rusqlite::{params, Connection};

use super::errors::AgentError;
use super::types::{
    InvocationStatus, NewToolInvocation, OrchestratorState, StateTransition, ToolInvocation,
};

const KIND_TOOL_INVOKED: &str = "tool_invoked";
const KIND_STATE_TRANSITION: &str = "state_transition";

// ─── EventLog ───────────────────────────────────────────────────────────────

/// SQLite-backed event log. Safe to share across tasks.
pub struct EventLog {
    conn: Mutex<Connection>,
}

impl EventLog {
    /// Open (or create) the event log at the given path.
    ///
    /// Pass `":memory:"` for an in-memory log.
    pub fn open(path: &str) -> Result<Self, AgentError> {
        let conn = Connection::open(path)?;

        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        let log = Self {
            conn: Mutex::new(conn),
        };
        log.create_tables()?;
        Ok(log)
    }

    pub fn in_memory() -> Result<Self, AgentError> {
        Self::open(":memory:")
    }

    fn create_tables(&self) -> Result<(), AgentError> {
        self.conn().execute_batch(
            "
            CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                call_id TEXT,
                tool_name TEXT,
                arguments TEXT,
                result TEXT,
                status TEXT,
                duration_ms INTEGER,
                from_state TEXT,
                to_state TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_events_kind
                ON events(kind, tool_name);
            ",
        )?;
        Ok(())
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ─── Writes ─────────────────────────────────────────────────────────

    /// Record a `tool_invoked` event.
    pub fn record_tool_invocation(&self, entry: &NewToolInvocation<'_>) -> Result<i64, AgentError> {
        let args_json = serde_json::to_string(entry.arguments)?;
        let result_json = serde_json::to_string(entry.result)?;

        let conn = self.conn();
        conn.execute(
            "INSERT INTO events
             (kind, timestamp, call_id, tool_name, arguments, result, status, duration_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                KIND_TOOL_INVOKED,
                now_rfc3339(),
                entry.call_id,
                entry.tool_name,
                args_json,
                result_json,
                entry.status.as_str(),
                entry.duration_ms as i64,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Record a `state_transition` event.
    pub fn record_transition(
        &self,
        from: OrchestratorState,
        to: OrchestratorState,
    ) -> Result<i64, AgentError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO events (kind, timestamp, from_state, to_state)
             VALUES (?1, ?2, ?3, ?4)",
            params![KIND_STATE_TRANSITION, now_rfc3339(), from.as_str(), to.as_str()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    // ─── Queries ────────────────────────────────────────────────────────

    /// Tool invocations in recording order, optionally for one tool only.
    pub fn tool_invocations(&self, tool_name: Option<&str>) -> Result<Vec<ToolInvocation>, AgentError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, call_id, tool_name, arguments, result, status, duration_ms
             FROM events
             WHERE kind = ?1 AND (?2 IS NULL OR tool_name = ?2)
             ORDER BY id ASC",
        )?;

        let rows = stmt.query_map(params![KIND_TOOL_INVOKED, tool_name], |row| {
            Ok(ToolInvocation {
                id: row.get(0)?,
                timestamp: row.get(1)?,
                call_id: row.get(2)?,
                tool_name: row.get(3)?,
                arguments: parse_json_value(row.get::<_, String>(4)?),
                result: parse_json_value(row.get::<_, String>(5)?),
                status: InvocationStatus::parse(&row.get::<_, String>(6)?),
                duration_ms: row.get::<_, i64>(7)? as u64,
            })
        })?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    /// State transitions in recording order.
    pub fn transitions(&self) -> Result<Vec<StateTransition>, AgentError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, from_state, to_state
             FROM events
             WHERE kind = ?1
             ORDER BY id ASC",
        )?;

        let rows = stmt.query_map(params![KIND_STATE_TRANSITION], |row| {
            Ok(StateTransition {
                id: row.get(0)?,
                timestamp: row.get(1)?,
                from: OrchestratorState::parse(&row.get::<_, String>(2)?),
                to: OrchestratorState::parse(&row.get::<_, String>(3)?),
            })
        })?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    /// Total number of recorded events of any kind.
    pub fn count(&self) -> Result<usize, AgentError> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────────

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Parse a JSON string into a serde_json::Value, defaulting to null.
fn parse_json_value(json: String) -> serde_json::Value {
    serde_json::from_str(&json).unwrap_or(serde_json::Value::Null)
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_log() -> EventLog {
        EventLog::in_memory().unwrap()
    }

    fn record(log: &EventLog, call_id: &str, tool: &str, status: InvocationStatus) {
        let args = json!({"accountIdentifier": "Roth IRA"});
        let result = json!({"success": status == InvocationStatus::Success});
        log.record_tool_invocation(&NewToolInvocation {
            call_id,
            tool_name: tool,
            arguments: &args,
            result: &result,
            status,
            duration_ms: 42,
        })
        .unwrap();
    }

    #[test]
    fn test_tool_invocation_roundtrip() {
        let log = test_log();
        record(&log, "call_1", "getAccountBalance", InvocationStatus::Success);

        let entries = log.tool_invocations(None).unwrap();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.call_id, "call_1");
        assert_eq!(entry.tool_name, "getAccountBalance");
        assert_eq!(entry.arguments, json!({"accountIdentifier": "Roth IRA"}));
        assert_eq!(entry.result, json!({"success": true}));
        assert_eq!(entry.status, InvocationStatus::Success);
        assert_eq!(entry.duration_ms, 42);
        assert!(chrono::DateTime::parse_from_rfc3339(&entry.timestamp).is_ok());
    }

    #[test]
    fn test_filter_by_tool_name() {
        let log = test_log();
        record(&log, "call_1", "getAccountBalance", InvocationStatus::Success);
        record(&log, "call_2", "listAccounts", InvocationStatus::Success);
        record(&log, "call_3", "getAccountBalance", InvocationStatus::Failure);

        let balance = log.tool_invocations(Some("getAccountBalance")).unwrap();
        assert_eq!(balance.len(), 2);
        assert_eq!(balance[0].call_id, "call_1");
        assert_eq!(balance[1].status, InvocationStatus::Failure);

        assert!(log.tool_invocations(Some("nope")).unwrap().is_empty());
    }

    #[test]
    fn test_transitions_and_count() {
        let log = test_log();
        log.record_transition(OrchestratorState::Idle, OrchestratorState::AwaitingModel)
            .unwrap();
        log.record_transition(OrchestratorState::AwaitingModel, OrchestratorState::Idle)
            .unwrap();
        record(&log, "call_1", "listAccounts", InvocationStatus::UnknownTool);

        let transitions = log.transitions().unwrap();
        assert_eq!(transitions.len(), 2);
        assert_eq!(transitions[0].from, OrchestratorState::Idle);
        assert_eq!(transitions[0].to, OrchestratorState::AwaitingModel);
        assert_eq!(transitions[1].to, OrchestratorState::Idle);

        assert_eq!(log.count().unwrap(), 3);
        // Transitions never show up as tool invocations.
        assert_eq!(log.tool_invocations(None).unwrap().len(), 1);
    }

    #[test]
    fn test_file_backed_log_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.db");
        let path = path.to_str().unwrap();

        {
            let log = EventLog::open(path).unwrap();
            record(&log, "call_1", "listAccounts", InvocationStatus::Success);
        }

        let reopened = EventLog::open(path).unwrap();
        assert_eq!(reopened.count().unwrap(), 1);
    }
}
