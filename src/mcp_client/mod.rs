//! MCP Client: JSON-RPC over stdio transport for MCP server management.
//!
//! This module handles:
//! - Spawning MCP server child processes and discovering their tools
//! - JSON-RPC 2.0 communication over process stdio
//! - The catalog snapshot (`Server` / `Tool`) the engine reads each turn
//! - Routing `tools/call` through the `ToolInvoker` boundary

pub mod catalog;
pub mod client;
pub mod errors;
pub mod lifecycle;
pub mod transport;
pub mod types;

// Re-exports for convenience
pub use catalog::{Server, Tool, ToolParameter};
pub use client::{McpClient, ToolInvoker};
pub use errors::McpError;
pub use types::{McpToolDefinition, ServerConfig};
