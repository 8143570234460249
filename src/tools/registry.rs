//! Tool registry — the active set of tools the model may call.
//!
//! Provides:
//! - Atomic whole-set registration (a batch either fully replaces the active
//!   set or is rejected and the old set stays)
//! - Lookup by name and listing in registration order
//! - Validation that call arguments match the tool's input schema
//! - Similar-name suggestions for unknown tool names

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::Value;

use super::errors::{RegistryError, ToolError};
use super::types::{Tool, ToolDescriptor, ToolResult};

// ─── Constants ──────────────────────────────────────────────────────────────

/// Longest tool name accepted (provider function-name limit).
const MAX_TOOL_NAME_LEN: usize = 64;

/// Minimum similarity for a registered name to be offered as a suggestion.
const SUGGESTION_FLOOR: f64 = 0.4;

// ─── RegisteredTool ─────────────────────────────────────────────────────────

/// A tool in the active set: its descriptor plus a handle to the executor.
///
/// Cheap to clone; the descriptor and executor are shared.
#[derive(Clone)]
pub struct RegisteredTool {
    descriptor: Arc<ToolDescriptor>,
    executor: Arc<dyn Tool>,
}

impl RegisteredTool {
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn description(&self) -> &str {
        &self.descriptor.description
    }

    pub fn input_schema(&self) -> &Value {
        &self.descriptor.input_schema
    }

    /// Run the executor. Arguments are expected to be validated already.
    pub async fn execute(&self, args: Value) -> Result<ToolResult, ToolError> {
        self.executor.execute(args).await
    }
}

impl std::fmt::Debug for RegisteredTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredTool")
            .field("name", &self.descriptor.name)
            .finish_non_exhaustive()
    }
}

/// An immutable generation of the registry.
#[derive(Default)]
struct ToolSet {
    /// Tools in registration order.
    tools: Vec<RegisteredTool>,
    /// `name → index into tools`.
    index: HashMap<String, usize>,
}

// ─── ToolRegistry ───────────────────────────────────────────────────────────

/// Registry of the currently active tools.
///
/// Writers build a complete new generation and swap it in under a short
/// write lock; readers clone the current `Arc` and never observe a
/// half-registered batch.
#[derive(Default)]
pub struct ToolRegistry {
    active: RwLock<Arc<ToolSet>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the entire active set with `tools`.
    ///
    /// Returns the number of tools now registered. On error (duplicate or
    /// invalid name, non-object schema) nothing changes.
    pub fn register(&self, tools: Vec<Arc<dyn Tool>>) -> Result<usize, RegistryError> {
        let mut next = ToolSet::default();

        for executor in tools {
            let descriptor = executor.describe();
            validate_name(&descriptor.name)?;
            if !descriptor.input_schema.is_object() {
                return Err(RegistryError::InvalidSchema {
                    name: descriptor.name,
                    reason: "input schema must be a JSON object".into(),
                });
            }
            if next.index.contains_key(&descriptor.name) {
                return Err(RegistryError::DuplicateName {
                    name: descriptor.name,
                });
            }

            next.index.insert(descriptor.name.clone(), next.tools.len());
            next.tools.push(RegisteredTool {
                descriptor: Arc::new(descriptor),
                executor,
            });
        }

        let count = next.tools.len();
        let names: Vec<&str> = next.tools.iter().map(|t| t.name()).collect();
        tracing::info!(count, tools = ?names, "registered tool set");

        let mut guard = self.active.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(next);
        Ok(count)
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<RegisteredTool> {
        let set = self.current();
        set.index.get(name).map(|&i| set.tools[i].clone())
    }

    /// All active tools in registration order.
    pub fn list(&self) -> Vec<RegisteredTool> {
        self.current().tools.clone()
    }

    /// All active tool names in registration order.
    pub fn tool_names(&self) -> Vec<String> {
        self.current()
            .tools
            .iter()
            .map(|t| t.name().to_string())
            .collect()
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.current().tools.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.current().tools.is_empty()
    }

    /// Validate a call: the tool exists and `arguments` match its schema.
    pub fn validate_arguments(&self, name: &str, arguments: &Value) -> Result<(), RegistryError> {
        let tool = self.get(name).ok_or_else(|| RegistryError::UnknownTool {
            name: name.to_string(),
        })?;
        validate_against_schema(name, tool.input_schema(), arguments)
    }

    /// Up to `max_results` registered names similar to `name`, best first.
    pub fn suggest(&self, name: &str, max_results: usize) -> Vec<String> {
        let query = name.to_ascii_lowercase();
        let mut scored: Vec<(String, f64)> = self
            .current()
            .tools
            .iter()
            .map(|t| {
                let score = similarity(&query, &t.name().to_ascii_lowercase());
                (t.name().to_string(), score)
            })
            .filter(|(_, score)| *score >= SUGGESTION_FLOOR)
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(max_results);
        scored.into_iter().map(|(name, _)| name).collect()
    }

    fn current(&self) -> Arc<ToolSet> {
        self.active
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

// ─── Validation ─────────────────────────────────────────────────────────────

/// Tool names must be usable as provider function names.
fn validate_name(name: &str) -> Result<(), RegistryError> {
    let invalid = |reason: &str| RegistryError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("name is empty"));
    }
    if name.len() > MAX_TOOL_NAME_LEN {
        return Err(invalid("name exceeds 64 characters"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(invalid("only ASCII letters, digits, '_' and '-' are allowed"));
    }
    Ok(())
}

/// Structural check of `arguments` against a JSON-Schema-like object.
///
/// Covers what tool schemas in practice use: an object at the top level,
/// `required` fields, top-level `properties.*.type`, and `enum` membership.
/// Nested schemas are not descended into.
fn validate_against_schema(
    tool: &str,
    schema: &Value,
    arguments: &Value,
) -> Result<(), RegistryError> {
    let invalid = |reason: String| RegistryError::InvalidArguments {
        tool: tool.to_string(),
        reason,
    };

    let args = arguments
        .as_object()
        .ok_or_else(|| invalid("arguments must be a JSON object".into()))?;

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for field in required.iter().filter_map(Value::as_str) {
            if !args.contains_key(field) {
                return Err(invalid(format!("missing required field: '{field}'")));
            }
        }
    }

    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Ok(());
    };

    for (field, value) in args {
        let Some(prop) = properties.get(field) else {
            continue;
        };

        if let Some(expected) = prop.get("type") {
            if !matches_type(expected, value) {
                return Err(invalid(format!(
                    "field '{field}' should be of type {expected}, got {}",
                    json_type_name(value)
                )));
            }
        }

        if let Some(allowed) = prop.get("enum").and_then(Value::as_array) {
            if !allowed.contains(value) {
                return Err(invalid(format!(
                    "field '{field}' must be one of {}",
                    Value::Array(allowed.clone())
                )));
            }
        }
    }

    Ok(())
}

/// `type` may be a single name or a list of names.
fn matches_type(expected: &Value, value: &Value) -> bool {
    match expected {
        Value::String(name) => matches_type_name(name, value),
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .any(|name| matches_type_name(name, value)),
        _ => true,
    }
}

fn matches_type_name(name: &str, value: &Value) -> bool {
    match name {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ─── Edit Distance ──────────────────────────────────────────────────────────

/// Compute the Levenshtein edit distance between two strings (by char).
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let n = b.len();

    let mut prev: Vec<usize> = (0..=n).collect();
    let mut curr = vec![0usize; n + 1];

    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=n {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[n]
}

/// Normalized similarity between two strings (0.0 = completely different, 1.0 = identical).
pub(crate) fn similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    let dist = levenshtein(a, b);
    1.0 - (dist as f64 / max_len as f64)
}

// ─── Tests ──────────────────────────────────────────────────────────────────
