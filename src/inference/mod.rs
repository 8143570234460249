//! Model Gateway — provider-independent access to the language model.
//!
//! This module handles all communication with the model provider:
//! - Request building (system instruction + history + tool declarations)
//! - One synchronous request/response cycle per consultation
//! - Reply parsing into a single normalized `Decision`
//! - Configuration loading from `finchat.yaml`
//!
//! The orchestrator only sees the `ModelGateway` trait, so switching wire
//! formats is a matter of adding an adapter, not changing the engine.

pub mod client;
pub mod config;
pub mod errors;
pub mod response;
pub mod types;

// Re-exports for convenience
pub use client::{build_gateway, MockGateway, ModelGateway, OpenAiGateway};
pub use config::{GatewayConfig, Provider};
pub use errors::InferenceError;
pub use types::{ChatMessage, Decision, ErrorKind, Role, ToolCallRequest, ToolDefinition};
