//! Tool registry error types.

use thiserror::Error;

/// Errors raised by the tool registry.
///
/// Registration errors are reported to the registering collaborator; the
/// previously active tool set stays in place when one occurs.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// Two tools in the same registration batch share a name.
    #[error("duplicate tool name in registration batch: '{name}'")]
    DuplicateName { name: String },

    /// A tool name is empty, too long, or uses characters providers reject.
    #[error("invalid tool name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    /// A tool's input schema is not a JSON object.
    #[error("invalid input schema for '{name}': {reason}")]
    InvalidSchema { name: String, reason: String },

    /// Lookup of a name that is not in the active set.
    #[error("unknown tool: '{name}'")]
    UnknownTool { name: String },

    /// Call arguments failed validation against the tool's input schema.
    #[error("invalid arguments for '{tool}': {reason}")]
    InvalidArguments { tool: String, reason: String },
}

/// Errors a tool executor may return instead of a `ToolResult`.
///
/// The orchestrator never lets these escape: they are converted into a
/// `{success: false}` result at the call boundary.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The executor could not interpret its (already schema-valid) input.
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    /// The executor failed while doing its work.
    #[error("execution failed: {reason}")]
    ExecutionFailed { reason: String },
}
