//! Tool Registry — the capabilities the model may invoke.
//!
//! - `types`: the `Tool` capability trait, descriptors, and the `ToolResult` envelope
//! - `registry`: the active tool set (atomic replace, lookup, argument validation)
//! - `errors`: registry and executor error types

pub mod errors;
pub mod registry;
pub mod types;

// Re-exports for convenience
pub use errors::{RegistryError, ToolError};
pub use registry::{RegisteredTool, ToolRegistry};
pub use types::{FnTool, Tool, ToolDescriptor, ToolResult};
