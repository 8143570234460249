//! Orchestrator — drives the request/execute/respond cycle.
//!
//! ```text
//! Idle → AwaitingModel → (ExecutingTool → AwaitingModel)* → Idle
//!                  └──────────────┴──────→ Errored → Idle
//! ```
//!
//! One exchange runs at a time per conversation. The turns an exchange
//! produces are buffered and committed to the conversation only when the
//! exchange finishes (final text or error), so a cancelled or dropped
//! exchange leaves the history exactly as it was.
//!
//! The orchestrator knows nothing about confirmation: consequential tools
//! only stage their effect, and committing happens outside this loop.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use futures::FutureExt;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::inference::client::ModelGateway;
use crate::inference::types::{Decision, ErrorKind, ToolCallRequest};
use crate::tools::{RegistryError, ToolRegistry, ToolResult};

use super::conversation::ConversationState;
use super::errors::AgentError;
use super::event_log::EventLog;
use super::truncate::truncate_tool_result;
use super::types::{
    ExchangeOutcome, FailureReason, InvocationStatus, NewToolInvocation, OrchestratorState, Turn,
    ROUND_LIMIT_MESSAGE,
};

// ─── Constants ──────────────────────────────────────────────────────────────

/// Default cap on consecutive tool round-trips per exchange.
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 5;

/// Tool results larger than this (serialized, bytes) are truncated before
/// being fed back to the model.
pub const MAX_TOOL_RESULT_BYTES: usize = 6_000;

/// Number of similar tool names offered when the model calls an unknown tool.
const MAX_SUGGESTIONS: usize = 3;

// ─── Config ─────────────────────────────────────────────────────────────────

/// Tunables for the orchestration loop.
#[derive(Debug, Clone, Copy)]
pub struct OrchestratorConfig {
    pub max_tool_rounds: usize,
    pub max_tool_result_bytes: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            max_tool_result_bytes: MAX_TOOL_RESULT_BYTES,
        }
    }
}

// ─── Orchestrator ───────────────────────────────────────────────────────────

/// The state machine that turns user text into tool calls and a reply.
pub struct Orchestrator {
    registry: Arc<ToolRegistry>,
    gateway: RwLock<Arc<dyn ModelGateway>>,
    conversation: Mutex<ConversationState>,
    state: Mutex<OrchestratorState>,
    /// Held for the whole of an exchange; `try_lock` failing means busy.
    exchange_gate: tokio::sync::Mutex<()>,
    /// Set after an Auth failure; cleared by `reconfigure`.
    auth_locked: AtomicBool,
    event_log: Option<Arc<EventLog>>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<ToolRegistry>,
        gateway: Arc<dyn ModelGateway>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            registry,
            gateway: RwLock::new(gateway),
            conversation: Mutex::new(ConversationState::new()),
            state: Mutex::new(OrchestratorState::Idle),
            exchange_gate: tokio::sync::Mutex::new(()),
            auth_locked: AtomicBool::new(false),
            event_log: None,
            config,
        }
    }

    /// Attach an event log for tool invocations and state transitions.
    pub fn with_event_log(mut self, event_log: Arc<EventLog>) -> Self {
        self.event_log = Some(event_log);
        self
    }

    // ─── Accessors ──────────────────────────────────────────────────────

    pub fn state(&self) -> OrchestratorState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Committed turns, in order.
    pub fn history(&self) -> Vec<Turn> {
        self.conversation
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .snapshot()
            .to_vec()
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn event_log(&self) -> Option<&Arc<EventLog>> {
        self.event_log.as_ref()
    }

    /// True after an Auth failure until `reconfigure` is called.
    pub fn is_auth_locked(&self) -> bool {
        self.auth_locked.load(Ordering::SeqCst)
    }

    fn gateway(&self) -> Arc<dyn ModelGateway> {
        self.gateway
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    // ─── Session Control ────────────────────────────────────────────────

    /// Clear the conversation. Rejected while an exchange is in flight.
    pub fn reset(&self) -> Result<(), AgentError> {
        let _gate = self
            .exchange_gate
            .try_lock()
            .map_err(|_| AgentError::ExchangeInProgress)?;

        self.conversation
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .reset();
        tracing::info!("conversation reset");
        Ok(())
    }

    /// Install a new gateway and lift an Auth lock. Takes effect on the
    /// next exchange.
    pub fn reconfigure(&self, gateway: Arc<dyn ModelGateway>) {
        let name = gateway.name().to_string();
        *self.gateway.write().unwrap_or_else(|e| e.into_inner()) = gateway;
        self.auth_locked.store(false, Ordering::SeqCst);
        tracing::info!(gateway = %name, "gateway reconfigured");
    }

    // ─── Exchanges ──────────────────────────────────────────────────────

    /// Run one exchange to completion.
    pub async fn submit(&self, text: &str) -> Result<ExchangeOutcome, AgentError> {
        self.submit_with_cancel(text, CancellationToken::new()).await
    }

    /// Run one exchange, abandoning it if `cancel` fires.
    ///
    /// Errors only for caller mistakes (empty input, busy). Model and tool
    /// failures come back as `ExchangeOutcome::Failed`.
    pub async fn submit_with_cancel(
        &self,
        text: &str,
        cancel: CancellationToken,
    ) -> Result<ExchangeOutcome, AgentError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AgentError::EmptyInput);
        }

        let _gate = self
            .exchange_gate
            .try_lock()
            .map_err(|_| AgentError::ExchangeInProgress)?;

        if self.is_auth_locked() {
            tracing::warn!("submit rejected: session locked after auth failure");
            return Ok(ExchangeOutcome::Failed {
                reason: FailureReason::Gateway {
                    kind: ErrorKind::Auth,
                },
                message: ErrorKind::Auth.user_message().to_string(),
            });
        }

        // Restores Idle if this future is dropped mid-exchange.
        let _idle = IdleOnDrop(self);

        let mut pending = vec![Turn::user(text)];
        let started = Instant::now();

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            outcome = self.run_exchange(&mut pending) => Some(outcome),
        };

        let Some(outcome) = outcome else {
            tracing::info!(
                discarded_turns = pending.len(),
                "exchange cancelled; nothing committed"
            );
            self.transition(OrchestratorState::Idle);
            return Ok(ExchangeOutcome::Cancelled);
        };

        let turn_count = pending.len();
        self.conversation
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(pending)?;

        if self.state() == OrchestratorState::Errored {
            self.transition(OrchestratorState::Idle);
        }

        tracing::info!(
            turns = turn_count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            outcome = outcome_label(&outcome),
            "exchange finished"
        );
        Ok(outcome)
    }

    /// The loop proper. Every turn it produces goes into `pending`.
    async fn run_exchange(&self, pending: &mut Vec<Turn>) -> ExchangeOutcome {
        let gateway = self.gateway();
        let max_rounds = self.config.max_tool_rounds;
        let mut rounds = 0usize;

        loop {
            self.transition(OrchestratorState::AwaitingModel);

            let history = self.history_with(pending);
            let tools = self.registry.list();
            tracing::debug!(
                round = rounds,
                turns = history.len(),
                tools = tools.len(),
                gateway = gateway.name(),
                "consulting model"
            );

            match gateway.decide(&history, &tools).await {
                Decision::Text(text) => {
                    pending.push(Turn::assistant_text(text.clone()));
                    self.transition(OrchestratorState::Idle);
                    return ExchangeOutcome::Reply { text };
                }

                Decision::Error { kind, message } => {
                    if kind == ErrorKind::Auth {
                        self.auth_locked.store(true, Ordering::SeqCst);
                    }
                    tracing::warn!(kind = ?kind, round = rounds, "model consultation failed");
                    self.transition(OrchestratorState::Errored);
                    return ExchangeOutcome::Failed {
                        reason: FailureReason::Gateway { kind },
                        message,
                    };
                }

                Decision::ToolCall {
                    call_id,
                    name,
                    arguments,
                } => {
                    if rounds >= max_rounds {
                        tracing::warn!(
                            limit = max_rounds,
                            tool = %name,
                            "tool round limit reached; abandoning exchange"
                        );
                        self.transition(OrchestratorState::Errored);
                        return ExchangeOutcome::Failed {
                            reason: FailureReason::RoundLimit { limit: max_rounds },
                            message: ROUND_LIMIT_MESSAGE.to_string(),
                        };
                    }
                    rounds += 1;

                    self.transition(OrchestratorState::ExecutingTool);
                    pending.push(Turn::assistant_tool_call(ToolCallRequest {
                        call_id: call_id.clone(),
                        name: name.clone(),
                        raw_arguments: arguments.to_string(),
                    }));

                    let result = self.execute_call(&call_id, &name, arguments).await;
                    pending.push(Turn::tool_result(call_id, name, result));
                }
            }
        }
    }

    /// Committed history followed by this exchange's pending turns.
    fn history_with(&self, pending: &[Turn]) -> Vec<Turn> {
        let conversation = self.conversation.lock().unwrap_or_else(|e| e.into_inner());
        let mut history = Vec::with_capacity(conversation.len() + pending.len());
        history.extend_from_slice(conversation.snapshot());
        history.extend_from_slice(pending);
        history
    }

    // ─── Tool Execution ─────────────────────────────────────────────────

    /// Resolve, validate and run one call. Always yields a `ToolResult`.
    async fn execute_call(&self, call_id: &str, name: &str, arguments: Value) -> ToolResult {
        let started = Instant::now();

        let checked = self
            .registry
            .validate_arguments(name, &arguments)
            .and_then(|()| {
                self.registry
                    .get(name)
                    .ok_or_else(|| RegistryError::UnknownTool {
                        name: name.to_string(),
                    })
            });

        let (result, status) = match checked {
            Err(RegistryError::UnknownTool { .. }) => {
                let suggestions = self.registry.suggest(name, MAX_SUGGESTIONS);
                tracing::warn!(
                    tool = %name,
                    suggestions = ?suggestions,
                    "model requested an unknown tool"
                );
                let result = ToolResult::failure_with(
                    format!("Unknown tool '{name}'. It is not an available capability."),
                    json!({
                        "error": "unknown_tool",
                        "availableTools": self.registry.tool_names(),
                        "suggestions": suggestions,
                    }),
                );
                (result, InvocationStatus::UnknownTool)
            }

            Err(e) => {
                tracing::warn!(tool = %name, error = %e, "tool arguments rejected");
                let result =
                    ToolResult::failure_with(e.to_string(), json!({"error": "invalid_arguments"}));
                (result, InvocationStatus::InvalidArguments)
            }

            Ok(tool) => {
                let result = match AssertUnwindSafe(tool.execute(arguments.clone()))
                    .catch_unwind()
                    .await
                {
                    Ok(Ok(result)) => result,
                    Ok(Err(e)) => {
                        tracing::warn!(tool = %name, error = %e, "tool executor failed");
                        ToolResult::failure(format!("Tool '{name}' failed: {e}"))
                    }
                    Err(_) => {
                        tracing::error!(tool = %name, "tool executor panicked");
                        ToolResult::failure(format!("Tool '{name}' failed unexpectedly."))
                    }
                };
                let status = if result.success {
                    InvocationStatus::Success
                } else {
                    InvocationStatus::Failure
                };
                (result, status)
            }
        };

        let result = truncate_tool_result(result, name, self.config.max_tool_result_bytes);
        let duration_ms = started.elapsed().as_millis() as u64;

        tracing::info!(
            call_id = %call_id,
            tool = %name,
            status = status.as_str(),
            duration_ms,
            "tool invoked"
        );

        if let Some(log) = &self.event_log {
            let entry = NewToolInvocation {
                call_id,
                tool_name: name,
                arguments: &arguments,
                result: &result.to_value(),
                status,
                duration_ms,
            };
            if let Err(e) = log.record_tool_invocation(&entry) {
                tracing::warn!(error = %e, "failed to record tool invocation");
            }
        }

        result
    }

    // ─── State ──────────────────────────────────────────────────────────

    fn transition(&self, to: OrchestratorState) {
        let from = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::replace(&mut *state, to)
        };
        if from == to {
            return;
        }

        tracing::debug!(from = %from, to = %to, "state transition");
        if let Some(log) = &self.event_log {
            if let Err(e) = log.record_transition(from, to) {
                tracing::warn!(error = %e, "failed to record state transition");
            }
        }
    }
}

/// Puts the machine back to `Idle` when an exchange ends by any path.
struct IdleOnDrop<'a>(&'a Orchestrator);

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        if self.0.state() != OrchestratorState::Idle {
            self.0.transition(OrchestratorState::Idle);
        }
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────────

fn outcome_label(outcome: &ExchangeOutcome) -> &'static str {
    match outcome {
        ExchangeOutcome::Reply { .. } => "reply",
        ExchangeOutcome::Failed { .. } => "failed",
        ExchangeOutcome::Cancelled => "cancelled",
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use crate::agent_core::types::AssistantContent;
    use crate::tools::{FnTool, RegisteredTool, Tool, ToolDescriptor, ToolError};

    // ─── Stubs ──────────────────────────────────────────────────────────

    /// Gateway that replays a fixed script and records what it was shown.
    struct ScriptedGateway {
        script: Mutex<VecDeque<Decision>>,
        fallback: Option<Decision>,
        seen: Mutex<Vec<Vec<Turn>>>,
    }

    impl ScriptedGateway {
        fn new(script: Vec<Decision>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                fallback: None,
                seen: Mutex::new(Vec::new()),
            })
        }

        /// Returns `decision` forever.
        fn repeating(decision: Decision) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(VecDeque::new()),
                fallback: Some(decision),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }

        fn history_at(&self, call: usize) -> Vec<Turn> {
            self.seen.lock().unwrap()[call].clone()
        }
    }

    #[async_trait]
    impl ModelGateway for ScriptedGateway {
        async fn decide(&self, history: &[Turn], _tools: &[RegisteredTool]) -> Decision {
            self.seen.lock().unwrap().push(history.to_vec());
            let next = self.script.lock().unwrap().pop_front();
            next.or_else(|| self.fallback.clone())
                .unwrap_or_else(|| Decision::Text("script exhausted".into()))
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    /// Gateway that signals when entered, then waits until released.
    /// With `after`, the first consultation returns a decision immediately.
    struct BlockingGateway {
        first: Mutex<Option<Decision>>,
        entered: Notify,
        release: Notify,
    }

    impl BlockingGateway {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                first: Mutex::new(None),
                entered: Notify::new(),
                release: Notify::new(),
            })
        }

        fn after(first: Decision) -> Arc<Self> {
            Arc::new(Self {
                first: Mutex::new(Some(first)),
                entered: Notify::new(),
                release: Notify::new(),
            })
        }
    }

    #[async_trait]
    impl ModelGateway for BlockingGateway {
        async fn decide(&self, _history: &[Turn], _tools: &[RegisteredTool]) -> Decision {
            let first = self.first.lock().unwrap().take();
            if let Some(decision) = first {
                return decision;
            }
            self.entered.notify_one();
            self.release.notified().await;
            Decision::Text("released".into())
        }

        fn name(&self) -> &str {
            "blocking"
        }
    }

    fn tool_call(call_id: &str, name: &str, arguments: Value) -> Decision {
        Decision::ToolCall {
            call_id: call_id.into(),
            name: name.into(),
            arguments,
        }
    }

    fn balance_schema() -> Value {
        json!({
            "type": "object",
            "properties": {"accountIdentifier": {"type": "string"}},
            "required": ["accountIdentifier"]
        })
    }

    /// Registry with `getAccountBalance` (returns `payload`) and a counter of
    /// how many times any executor ran.
    fn registry_with_balance(payload: Value) -> (Arc<ToolRegistry>, Arc<AtomicUsize>) {
        let invocations = Arc::new(AtomicUsize::new(0));
        let counter = invocations.clone();
        let tool: Arc<dyn Tool> = Arc::new(FnTool::new(
            ToolDescriptor::new("getAccountBalance", "Balance of one account", balance_schema()),
            move |_args: Value| {
                let counter = counter.clone();
                let payload = payload.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(ToolResult::from_value(payload))
                }
            },
        ));
        let registry = Arc::new(ToolRegistry::new());
        registry.register(vec![tool]).unwrap();
        (registry, invocations)
    }

    fn orchestrator(registry: Arc<ToolRegistry>, gateway: Arc<dyn ModelGateway>) -> Orchestrator {
        Orchestrator::new(registry, gateway, OrchestratorConfig::default())
            .with_event_log(Arc::new(EventLog::in_memory().unwrap()))
    }

    fn tool_result_payloads(history: &[Turn]) -> Vec<Value> {
        history
            .iter()
            .filter_map(|t| match t {
                Turn::ToolResult { payload, .. } => Some(payload.to_value()),
                _ => None,
            })
            .collect()
    }

    // ─── Scenarios ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_balance_lookup_round_trip() {
        let payload = json!({"success": true, "accountName": "Roth IRA", "balance": 89500.75});
        let (registry, invocations) = registry_with_balance(payload.clone());
        let gateway = ScriptedGateway::new(vec![
            tool_call("call_1", "getAccountBalance", json!({"accountIdentifier": "Roth IRA"})),
            Decision::Text("Your Roth IRA balance is 89500.75.".into()),
        ]);
        let orch = orchestrator(registry, gateway.clone());

        let outcome = orch.submit("What's my Roth IRA balance?").await.unwrap();

        match &outcome {
            ExchangeOutcome::Reply { text } => {
                assert!(text.contains("Roth IRA"));
                assert!(text.contains("89500.75"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(invocations.load(Ordering::SeqCst), 1);
        assert_eq!(gateway.calls(), 2);

        // The follow-up consultation saw the exact payload.
        let follow_up = gateway.history_at(1);
        assert_eq!(follow_up.len(), 3);
        assert_eq!(tool_result_payloads(&follow_up), vec![payload]);
        match &follow_up[1] {
            Turn::Assistant {
                content: AssistantContent::ToolCalls(calls),
            } => {
                assert_eq!(calls[0].call_id, "call_1");
                let args: Value = serde_json::from_str(&calls[0].raw_arguments).unwrap();
                assert_eq!(args, json!({"accountIdentifier": "Roth IRA"}));
            }
            other => panic!("expected tool-call turn, got {other:?}"),
        }

        let history = orch.history();
        assert_eq!(history.len(), 4);
        assert_eq!(history[0], Turn::user("What's my Roth IRA balance?"));
        assert_eq!(history[3], Turn::assistant_text("Your Roth IRA balance is 89500.75."));
        assert_eq!(orch.state(), OrchestratorState::Idle);
    }

    #[tokio::test]
    async fn test_failed_tool_result_appended_verbatim() {
        let failure = json!({"success": false, "message": "Account(s) not found."});
        let registry = Arc::new(ToolRegistry::new());
        let executor_failure = failure.clone();
        let transfer: Arc<dyn Tool> = Arc::new(FnTool::new(
            ToolDescriptor::new(
                "initiateFundTransfer",
                "Stage a transfer",
                json!({
                    "type": "object",
                    "properties": {
                        "fromAccount": {"type": "string"},
                        "toAccount": {"type": "string"},
                        "amount": {"type": "number"}
                    },
                    "required": ["fromAccount", "toAccount", "amount"]
                }),
            ),
            move |_args: Value| {
                let failure = executor_failure.clone();
                async move { Ok(ToolResult::from_value(failure)) }
            },
        ));
        registry.register(vec![transfer]).unwrap();

        let gateway = ScriptedGateway::new(vec![
            tool_call(
                "call_t",
                "initiateFundTransfer",
                json!({"fromAccount": "Narnia", "toAccount": "Savings", "amount": 100}),
            ),
            Decision::Text("I couldn't find one of those accounts.".into()),
        ]);
        let orch = orchestrator(registry, gateway.clone());

        orch.submit("Move $100 from Narnia to savings").await.unwrap();

        assert_eq!(tool_result_payloads(&orch.history()), vec![failure]);
        let log = orch.event_log().unwrap();
        let entries = log.tool_invocations(Some("initiateFundTransfer")).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, InvocationStatus::Failure);
    }

    #[tokio::test]
    async fn test_transport_error_keeps_user_turn() {
        let (registry, _) = registry_with_balance(json!({"success": true}));
        let gateway = ScriptedGateway::new(vec![Decision::error(ErrorKind::Transport)]);
        let orch = orchestrator(registry, gateway);

        let outcome = orch.submit("What's my balance?").await.unwrap();

        assert_eq!(
            outcome,
            ExchangeOutcome::Failed {
                reason: FailureReason::Gateway {
                    kind: ErrorKind::Transport
                },
                message: ErrorKind::Transport.user_message().to_string(),
            }
        );
        assert_eq!(orch.history(), vec![Turn::user("What's my balance?")]);
        assert_eq!(orch.state(), OrchestratorState::Idle);

        let transitions = orch.event_log().unwrap().transitions().unwrap();
        let path: Vec<_> = transitions.iter().map(|t| t.to).collect();
        assert_eq!(
            path,
            vec![
                OrchestratorState::AwaitingModel,
                OrchestratorState::Errored,
                OrchestratorState::Idle
            ]
        );
    }

    #[tokio::test]
    async fn test_history_survives_errored_exchange() {
        let (registry, _) = registry_with_balance(json!({"success": true}));
        let gateway = ScriptedGateway::new(vec![
            Decision::Text("Hello!".into()),
            Decision::error(ErrorKind::MalformedReply),
            Decision::Text("Hi again.".into()),
        ]);
        let orch = orchestrator(registry, gateway);

        orch.submit("hi").await.unwrap();
        orch.submit("are you there?").await.unwrap();
        orch.submit("hello?").await.unwrap();

        assert_eq!(
            orch.history(),
            vec![
                Turn::user("hi"),
                Turn::assistant_text("Hello!"),
                Turn::user("are you there?"),
                Turn::user("hello?"),
                Turn::assistant_text("Hi again."),
            ]
        );
    }

    // ─── Loop Bound ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_always_tool_call_hits_round_limit() {
        let (registry, invocations) = registry_with_balance(json!({"success": true}));
        let gateway = ScriptedGateway::repeating(tool_call(
            "call_loop",
            "getAccountBalance",
            json!({"accountIdentifier": "Roth IRA"}),
        ));
        let orch = orchestrator(registry, gateway.clone());

        let outcome = orch.submit("loop forever").await.unwrap();

        assert_eq!(
            outcome,
            ExchangeOutcome::Failed {
                reason: FailureReason::RoundLimit {
                    limit: DEFAULT_MAX_TOOL_ROUNDS
                },
                message: ROUND_LIMIT_MESSAGE.to_string(),
            }
        );
        assert_eq!(invocations.load(Ordering::SeqCst), DEFAULT_MAX_TOOL_ROUNDS);
        assert_eq!(gateway.calls(), DEFAULT_MAX_TOOL_ROUNDS + 1);
        // user + (call, result) per executed round
        assert_eq!(orch.history().len(), 1 + 2 * DEFAULT_MAX_TOOL_ROUNDS);
        assert_eq!(orch.state(), OrchestratorState::Idle);
    }

    #[tokio::test]
    async fn test_custom_round_limit() {
        let (registry, invocations) = registry_with_balance(json!({"success": true}));
        let gateway = ScriptedGateway::repeating(tool_call(
            "c",
            "getAccountBalance",
            json!({"accountIdentifier": "x"}),
        ));
        let config = OrchestratorConfig {
            max_tool_rounds: 1,
            ..OrchestratorConfig::default()
        };
        let orch = Orchestrator::new(registry, gateway, config);

        let outcome = orch.submit("go").await.unwrap();
        assert!(matches!(
            outcome,
            ExchangeOutcome::Failed {
                reason: FailureReason::RoundLimit { limit: 1 },
                ..
            }
        ));
        assert_eq!(invocations.load(Ordering::SeqCst), 1);
    }

    // ─── Unknown Tools & Bad Arguments ──────────────────────────────────

    #[tokio::test]
    async fn test_unknown_tool_never_invokes_executor() {
        let (registry, invocations) = registry_with_balance(json!({"success": true}));
        let gateway = ScriptedGateway::new(vec![
            tool_call("call_u", "getAccountBalanse", json!({"accountIdentifier": "Roth IRA"})),
            Decision::Text("Sorry, let me try that differently.".into()),
        ]);
        let orch = orchestrator(registry, gateway.clone());

        orch.submit("balance?").await.unwrap();

        assert_eq!(invocations.load(Ordering::SeqCst), 0);
        let payloads = tool_result_payloads(&gateway.history_at(1));
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0]["success"], false);
        assert_eq!(payloads[0]["error"], "unknown_tool");
        assert_eq!(payloads[0]["suggestions"], json!(["getAccountBalance"]));

        let entries = orch.event_log().unwrap().tool_invocations(None).unwrap();
        assert_eq!(entries[0].status, InvocationStatus::UnknownTool);
    }

    #[tokio::test]
    async fn test_invalid_arguments_skip_executor() {
        let (registry, invocations) = registry_with_balance(json!({"success": true}));
        let gateway = ScriptedGateway::new(vec![
            tool_call("call_a", "getAccountBalance", json!({"account": "Roth IRA"})),
            Decision::Text("Which account?".into()),
        ]);
        let orch = orchestrator(registry, gateway);

        orch.submit("balance?").await.unwrap();

        assert_eq!(invocations.load(Ordering::SeqCst), 0);
        let payloads = tool_result_payloads(&orch.history());
        assert_eq!(payloads[0]["success"], false);
        assert_eq!(payloads[0]["error"], "invalid_arguments");
        let expected = orch
            .registry()
            .validate_arguments("getAccountBalance", &json!({"account": "Roth IRA"}))
            .unwrap_err();
        assert_eq!(payloads[0]["message"], expected.to_string());
        let entries = orch.event_log().unwrap().tool_invocations(None).unwrap();
        assert_eq!(entries[0].status, InvocationStatus::InvalidArguments);
    }

    // ─── Executor Failures ──────────────────────────────────────────────

    struct FailingTool {
        panic: bool,
    }

    #[async_trait]
    impl Tool for FailingTool {
        fn describe(&self) -> ToolDescriptor {
            ToolDescriptor::new("listAccounts", "List accounts", json!({"type": "object"}))
        }

        async fn execute(&self, _args: Value) -> Result<ToolResult, ToolError> {
            if self.panic {
                panic!("executor blew up");
            }
            Err(ToolError::ExecutionFailed {
                reason: "ledger offline".into(),
            })
        }
    }

    async fn run_failing_tool(panic: bool) -> (Orchestrator, ExchangeOutcome) {
        let registry = Arc::new(ToolRegistry::new());
        registry
            .register(vec![Arc::new(FailingTool { panic }) as Arc<dyn Tool>])
            .unwrap();
        let gateway = ScriptedGateway::new(vec![
            tool_call("call_f", "listAccounts", json!({})),
            Decision::Text("Something went wrong listing accounts.".into()),
        ]);
        let orch = orchestrator(registry, gateway);
        let outcome = orch.submit("list my accounts").await.unwrap();
        (orch, outcome)
    }

    #[tokio::test]
    async fn test_executor_error_becomes_failed_result() {
        let (orch, outcome) = run_failing_tool(false).await;
        assert!(matches!(outcome, ExchangeOutcome::Reply { .. }));
        let payloads = tool_result_payloads(&orch.history());
        assert_eq!(payloads[0]["success"], false);
        assert!(payloads[0]["message"].as_str().unwrap().contains("ledger offline"));
    }

    #[tokio::test]
    async fn test_executor_panic_is_contained() {
        let (orch, outcome) = run_failing_tool(true).await;
        assert!(matches!(outcome, ExchangeOutcome::Reply { .. }));
        let payloads = tool_result_payloads(&orch.history());
        assert_eq!(payloads[0]["success"], false);
        assert_eq!(orch.state(), OrchestratorState::Idle);
    }

    #[tokio::test]
    async fn test_large_result_is_truncated() {
        let rows: Vec<String> = (0..4000).map(|i| format!("memo \"{i}\"")).collect();
        let (registry, _) = registry_with_balance(json!({"success": true, "rows": rows}));
        let gateway = ScriptedGateway::new(vec![
            tool_call("call_b", "getAccountBalance", json!({"accountIdentifier": "a"})),
            Decision::Text("ok".into()),
        ]);
        let orch = orchestrator(registry, gateway.clone());

        orch.submit("big").await.unwrap();

        let payloads = tool_result_payloads(&orch.history());
        assert_eq!(payloads[0]["success"], true);
        assert_eq!(payloads[0]["truncated"], true);
        assert!(payloads[0].to_string().len() <= MAX_TOOL_RESULT_BYTES);

        // The follow-up model call saw the bounded result.
        let fed_back = tool_result_payloads(&gateway.history_at(1));
        assert!(fed_back[0].to_string().len() <= MAX_TOOL_RESULT_BYTES);
    }

    // ─── Auth Lock ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_auth_failure_locks_until_reconfigured() {
        let (registry, _) = registry_with_balance(json!({"success": true}));
        let gateway = ScriptedGateway::new(vec![Decision::error(ErrorKind::Auth)]);
        let orch = orchestrator(registry, gateway.clone());

        orch.submit("hi").await.unwrap();
        assert!(orch.is_auth_locked());

        let locked = orch.submit("hello?").await.unwrap();
        assert!(matches!(
            locked,
            ExchangeOutcome::Failed {
                reason: FailureReason::Gateway {
                    kind: ErrorKind::Auth
                },
                ..
            }
        ));
        assert_eq!(gateway.calls(), 1, "locked session must not call the model");
        assert_eq!(orch.history(), vec![Turn::user("hi")]);

        orch.reconfigure(ScriptedGateway::new(vec![Decision::Text("Back online.".into())]));
        assert!(!orch.is_auth_locked());
        let outcome = orch.submit("hello?").await.unwrap();
        assert_eq!(
            outcome,
            ExchangeOutcome::Reply {
                text: "Back online.".into()
            }
        );
    }

    // ─── Concurrency & Cancellation ─────────────────────────────────────

    #[tokio::test]
    async fn test_empty_input_rejected() {
        let (registry, _) = registry_with_balance(json!({"success": true}));
        let gateway = ScriptedGateway::new(vec![]);
        let orch = orchestrator(registry, gateway.clone());

        assert!(matches!(orch.submit("   ").await, Err(AgentError::EmptyInput)));
        assert_eq!(gateway.calls(), 0);
        assert!(orch.history().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_submit_rejected() {
        let (registry, _) = registry_with_balance(json!({"success": true}));
        let gateway = BlockingGateway::new();
        let orch = Arc::new(orchestrator(registry, gateway.clone()));

        let first = {
            let orch = orch.clone();
            tokio::spawn(async move { orch.submit("first").await })
        };
        gateway.entered.notified().await;
        assert_eq!(orch.state(), OrchestratorState::AwaitingModel);

        assert!(matches!(
            orch.submit("second").await,
            Err(AgentError::ExchangeInProgress)
        ));
        assert!(matches!(orch.reset(), Err(AgentError::ExchangeInProgress)));

        gateway.release.notify_one();
        let outcome = first.await.unwrap().unwrap();
        assert_eq!(
            outcome,
            ExchangeOutcome::Reply {
                text: "released".into()
            }
        );
        assert_eq!(
            orch.history(),
            vec![Turn::user("first"), Turn::assistant_text("released")]
        );
    }

    #[tokio::test]
    async fn test_cancel_commits_nothing() {
        let (registry, _) = registry_with_balance(json!({"success": true}));
        let gateway = BlockingGateway::new();
        let orch = Arc::new(orchestrator(registry, gateway.clone()));
        let cancel = CancellationToken::new();

        let exchange = {
            let orch = orch.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { orch.submit_with_cancel("never mind", cancel).await })
        };
        gateway.entered.notified().await;
        cancel.cancel();

        assert_eq!(exchange.await.unwrap().unwrap(), ExchangeOutcome::Cancelled);
        assert!(orch.history().is_empty());
        assert_eq!(orch.state(), OrchestratorState::Idle);

        // The gate is free again.
        orch.reset().unwrap();
    }

    #[tokio::test]
    async fn test_cancel_after_tool_round_commits_nothing() {
        let (registry, invocations) =
            registry_with_balance(json!({"success": true, "balance": 89500.75}));
        let gateway = BlockingGateway::after(tool_call(
            "call_c",
            "getAccountBalance",
            json!({"accountIdentifier": "Roth IRA"}),
        ));
        let orch = Arc::new(orchestrator(registry, gateway.clone()));
        let cancel = CancellationToken::new();

        let exchange = {
            let orch = orch.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { orch.submit_with_cancel("Roth IRA balance?", cancel).await })
        };
        // Blocked in the follow-up call: the tool has already run.
        gateway.entered.notified().await;
        assert_eq!(invocations.load(Ordering::SeqCst), 1);
        cancel.cancel();

        assert_eq!(exchange.await.unwrap().unwrap(), ExchangeOutcome::Cancelled);
        assert!(orch.history().is_empty());
        assert_eq!(orch.state(), OrchestratorState::Idle);

        // The invocation itself still happened and is on record.
        let entries = orch.event_log().unwrap().tool_invocations(None).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].call_id, "call_c");

        let follow_up = ScriptedGateway::new(vec![Decision::Text("hi".into())]);
        orch.reconfigure(follow_up);
        orch.submit("hello").await.unwrap();
        assert_eq!(
            orch.history(),
            vec![Turn::user("hello"), Turn::assistant_text("hi")]
        );
    }

    #[tokio::test]
    async fn test_dropped_exchange_commits_nothing() {
        let (registry, _) = registry_with_balance(json!({"success": true}));
        let gateway = BlockingGateway::new();
        let orch = orchestrator(registry, gateway);

        let timed_out =
            tokio::time::timeout(Duration::from_millis(50), orch.submit("slow")).await;
        assert!(timed_out.is_err());

        assert!(orch.history().is_empty());
        assert_eq!(orch.state(), OrchestratorState::Idle);
        orch.reset().unwrap();
    }

    #[tokio::test]
    async fn test_reset_clears_history() {
        let (registry, _) = registry_with_balance(json!({"success": true}));
        let gateway = ScriptedGateway::new(vec![Decision::Text("hello".into())]);
        let orch = orchestrator(registry, gateway);

        orch.submit("hi").await.unwrap();
        assert_eq!(orch.history().len(), 2);
        orch.reset().unwrap();
        assert!(orch.history().is_empty());
    }
}
