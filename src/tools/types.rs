//! Shared types for the tool registry.
//!
//! A tool is a closed capability: it describes itself once (name, description,
//! input schema) and executes with already-validated JSON arguments. Executors
//! are opaque to the engine; it only awaits their `ToolResult`.

use std::future::Future;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::errors::ToolError;

// ─── Descriptor ─────────────────────────────────────────────────────────────

/// Static description of a tool, captured once at registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    /// Unique, stable identifier the model uses to call the tool.
    pub name: String,
    /// Human-readable description shown to the model.
    pub description: String,
    /// JSON-Schema-like object describing the arguments.
    pub input_schema: Value,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

// ─── Result Envelope ────────────────────────────────────────────────────────

/// Free-form success/failure envelope returned by every executor.
///
/// Serializes flat: `{"success": true, ...payload}`. Only `success` is shared
/// across tools; the payload shape is up to each tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl ToolResult {
    /// A successful result. Object payloads are spread into the envelope;
    /// anything else lands under `"result"`.
    pub fn ok(payload: Value) -> Self {
        Self {
            success: true,
            payload: into_payload(payload),
        }
    }

    /// A failed result carrying a message for the model.
    pub fn failure(message: impl Into<String>) -> Self {
        let mut payload = Map::new();
        payload.insert("message".into(), Value::String(message.into()));
        Self {
            success: false,
            payload,
        }
    }

    /// A failed result with extra structured detail next to the message.
    pub fn failure_with(message: impl Into<String>, detail: Value) -> Self {
        let mut result = Self::failure(message);
        for (key, value) in into_payload(detail) {
            result.payload.entry(key).or_insert(value);
        }
        result
    }

    /// Build an envelope from an arbitrary JSON value (e.g. a closure tool's
    /// return value). A missing or non-boolean `success` counts as failure.
    pub fn from_value(value: Value) -> Self {
        let success = value
            .get("success")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        Self {
            success,
            payload: into_payload(value),
        }
    }

    /// The `message` field, if the payload has one.
    pub fn message(&self) -> Option<&str> {
        self.payload.get("message").and_then(Value::as_str)
    }

    /// Look up a payload field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    /// The flat JSON form that is fed back to the model.
    pub fn to_value(&self) -> Value {
        let mut map = Map::with_capacity(self.payload.len() + 1);
        map.insert("success".into(), Value::Bool(self.success));
        for (key, value) in &self.payload {
            map.insert(key.clone(), value.clone());
        }
        Value::Object(map)
    }
}

/// Normalize a payload into a map, dropping any `success` key so the
/// envelope's discriminator is the only one.
fn into_payload(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(mut map) => {
            map.remove("success");
            map
        }
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("result".into(), other);
            map
        }
    }
}

// ─── Tool Capability ────────────────────────────────────────────────────────

/// A locally registered capability the model can invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Describe the tool. Called once when the tool is registered.
    fn describe(&self) -> ToolDescriptor;

    /// Execute with arguments that already passed schema validation.
    async fn execute(&self, args: Value) -> Result<ToolResult, ToolError>;
}

/// Adapter turning an async closure into a [`Tool`].
///
/// This is how an app collaborator registers opaque executors without
/// writing a struct per tool.
pub struct FnTool<F> {
    descriptor: ToolDescriptor,
    handler: F,
}

impl<F, Fut> FnTool<F>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ToolResult, ToolError>> + Send + 'static,
{
    pub fn new(descriptor: ToolDescriptor, handler: F) -> Self {
        Self {
            descriptor,
            handler,
        }
    }
}

#[async_trait]
impl<F, Fut> Tool for FnTool<F>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ToolResult, ToolError>> + Send + 'static,
{
    fn describe(&self) -> ToolDescriptor {
        self.descriptor.clone()
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, ToolError> {
        (self.handler)(args).await
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
