//! Model gateway — one request/response consultation per call.
//!
//! [`ModelGateway`] is the provider abstraction the orchestrator talks to.
//! [`OpenAiGateway`] speaks the OpenAI Chat Completions API over HTTP with
//! bearer auth; [`MockGateway`] short-circuits to a canned reply for
//! development. Every failure is collapsed into `Decision::Error` with a
//! user-safe message. Raw provider errors only reach the log.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use reqwest::StatusCode;
use secrecy::ExposeSecret;

use crate::agent_core::truncate::truncate_utf8;
use crate::agent_core::types::{AssistantContent, Turn};
use crate::tools::RegisteredTool;

use super::config::{GatewayConfig, Provider};
use super::errors::InferenceError;
use super::response::{decide_from_reply, parse_chat_response};
use super::types::{
    ChatCompletionRequest, ChatMessage, Decision, FunctionCallResponse, FunctionDefinition, Role,
    ToolCallResponse, ToolDefinition,
};

// ─── Constants ───────────────────────────────────────────────────────────────

/// TCP connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Longest slice of a provider error body copied into the log.
const MAX_LOGGED_BODY: usize = 2_000;

/// Built-in system instruction prefixed to every request.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are finchat, a personal-finance assistant with access to the user's accounts \
through tools. Call a tool whenever the answer depends on account data; never guess \
balances or transactions. Transfers are only staged by the initiateFundTransfer tool: \
after staging, tell the user what was prepared and that they must confirm it \
themselves. Never claim a transfer has been completed. Be concise.";

/// Canned reply returned in development mock mode.
pub const MOCK_REPLY: &str = "\
[mock mode] This is a canned development reply; no request was sent to the model provider.";

// ─── ModelGateway ────────────────────────────────────────────────────────────

/// Provider-independent access to the language model.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// Consult the model with the full history and the active tool set.
    ///
    /// Never fails: transport, auth and parse failures come back as
    /// `Decision::Error`.
    async fn decide(&self, history: &[Turn], tools: &[RegisteredTool]) -> Decision;

    /// Short adapter name for logs.
    fn name(&self) -> &str;
}

/// Build the gateway selected by `config`.
///
/// Mock mode wins over the provider; otherwise credentials are validated up
/// front so a missing key surfaces before the first message.
pub fn build_gateway(config: &GatewayConfig) -> Result<Arc<dyn ModelGateway>, InferenceError> {
    config.validate()?;

    if config.development_mock_mode {
        tracing::warn!("development mock mode enabled; model calls are short-circuited");
        return Ok(Arc::new(MockGateway::new()));
    }

    match config.provider {
        Provider::OpenAi => Ok(Arc::new(OpenAiGateway::new(config.clone())?)),
    }
}

// ─── OpenAiGateway ───────────────────────────────────────────────────────────

/// Gateway for OpenAI-compatible Chat Completions endpoints.
pub struct OpenAiGateway {
    http: HttpClient,
    config: GatewayConfig,
    system_prompt: String,
}

impl OpenAiGateway {
    /// Create a gateway. Does NOT check connectivity; that happens on the
    /// first request.
    pub fn new(config: GatewayConfig) -> Result<Self, InferenceError> {
        if !config.has_api_key() {
            return Err(InferenceError::MissingCredential);
        }

        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| InferenceError::ConnectionFailed {
                endpoint: config.base_url.clone(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        let system_prompt = config
            .system_prompt
            .clone()
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());

        Ok(Self {
            http,
            config,
            system_prompt,
        })
    }

    /// Build the outgoing request body for a history and tool set.
    pub fn build_request(&self, history: &[Turn], tools: &[RegisteredTool]) -> ChatCompletionRequest {
        let definitions = tool_definitions(tools);
        let has_tools = !definitions.is_empty();

        ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: to_chat_messages(&self.system_prompt, history),
            tools: has_tools.then_some(definitions),
            tool_choice: has_tools.then(|| "auto".to_string()),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        }
    }

    /// One request/response cycle; errors are still typed here.
    async fn request_decision(
        &self,
        history: &[Turn],
        tools: &[RegisteredTool],
    ) -> Result<Decision, InferenceError> {
        let url = format!("{}/chat/completions", self.config.endpoint_base());
        let body = self.build_request(history, tools);

        tracing::info!(
            url = %url,
            model = %body.model,
            message_count = body.messages.len(),
            tool_count = body.tools.as_ref().map(Vec::len).unwrap_or(0),
            max_tokens = body.max_tokens,
            "model request"
        );
        if self.config.log_requests {
            tracing::info!(
                body = %serde_json::to_string(&body).unwrap_or_default(),
                "model request body"
            );
        }

        let api_key = self
            .config
            .api_key
            .as_ref()
            .ok_or(InferenceError::MissingCredential)?;

        let response = self
            .http
            .post(&url)
            .bearer_auth(api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    InferenceError::Timeout {
                        duration_secs: self.config.request_timeout_secs,
                    }
                } else {
                    InferenceError::ConnectionFailed {
                        endpoint: url.clone(),
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(InferenceError::Unauthorized {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(InferenceError::HttpError {
                status: status.as_u16(),
                body: body_text,
            });
        }

        let body_text = response.text().await.map_err(|e| InferenceError::ConnectionFailed {
            endpoint: url.clone(),
            reason: format!("failed to read response body: {e}"),
        })?;

        if self.config.log_responses {
            tracing::info!(body = %body_text, "model response body");
        }

        decide_from_reply(parse_chat_response(&body_text)?)
    }
}

#[async_trait]
impl ModelGateway for OpenAiGateway {
    async fn decide(&self, history: &[Turn], tools: &[RegisteredTool]) -> Decision {
        match self.request_decision(history, tools).await {
            Ok(decision) => decision,
            Err(e) => {
                let kind = e.category();
                let body = e.error_body().map(|b| truncate_utf8(b, MAX_LOGGED_BODY));
                tracing::warn!(
                    error = %e,
                    kind = ?kind,
                    body = body.unwrap_or(""),
                    "model consultation failed"
                );
                Decision::error(kind)
            }
        }
    }

    fn name(&self) -> &str {
        "openai"
    }
}

// ─── MockGateway ─────────────────────────────────────────────────────────────

/// Development gateway: every consultation returns the canned reply.
#[derive(Debug, Clone)]
pub struct MockGateway {
    reply: String,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::with_reply(MOCK_REPLY)
    }

    pub fn with_reply(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
        }
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModelGateway for MockGateway {
    async fn decide(&self, history: &[Turn], tools: &[RegisteredTool]) -> Decision {
        tracing::debug!(
            turns = history.len(),
            tools = tools.len(),
            "mock gateway short-circuit"
        );
        Decision::Text(self.reply.clone())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// ─── Request Building ────────────────────────────────────────────────────────

/// Serialize tools into function declarations; schemas pass through verbatim.
pub fn tool_definitions(tools: &[RegisteredTool]) -> Vec<ToolDefinition> {
    tools
        .iter()
        .map(|tool| ToolDefinition {
            r#type: "function".to_string(),
            function: FunctionDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.input_schema().clone(),
            },
        })
        .collect()
}

/// System instruction followed by the history, in order.
pub fn to_chat_messages(system_prompt: &str, history: &[Turn]) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 1);
    messages.push(ChatMessage::system(system_prompt));

    for turn in history {
        let message = match turn {
            Turn::User { text } => ChatMessage::user(text.clone()),
            Turn::Assistant {
                content: AssistantContent::Text(text),
            } => ChatMessage::assistant(text.clone()),
            Turn::Assistant {
                content: AssistantContent::ToolCalls(calls),
            } => ChatMessage {
                role: Role::Assistant,
                content: None,
                tool_call_id: None,
                tool_calls: Some(
                    calls
                        .iter()
                        .map(|call| ToolCallResponse {
                            id: call.call_id.clone(),
                            r#type: "function".to_string(),
                            function: FunctionCallResponse {
                                name: call.name.clone(),
                                arguments: call.raw_arguments.clone(),
                            },
                        })
                        .collect(),
                ),
            },
            Turn::ToolResult {
                call_id, payload, ..
            } => ChatMessage {
                role: Role::Tool,
                content: Some(payload.to_value().to_string()),
                tool_call_id: Some(call_id.clone()),
                tool_calls: None,
            },
        };
        messages.push(message);
    }

    messages
}

// ─── Tests ───────────────────────────────────────────────────────────────────
