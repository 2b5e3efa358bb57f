//! Agent Core error types.

use thiserror::Error;

use crate::mcp_client::McpError;

/// Why a structured tool-call block was rejected.
///
/// These never leave the extractor: the block is logged and skipped.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("invalid JSON in tool_call block: {reason}")]
    InvalidJson { reason: String },

    #[error("tool_call block is not a JSON object")]
    NotAnObject,

    #[error("missing protocol version (expected jsonrpc or protocolVersion \"2.0\")")]
    MissingVersion,

    #[error("unsupported protocol version '{version}'")]
    WrongVersion { version: String },

    #[error("unsupported method '{method}' (expected execute_tool)")]
    WrongMethod { method: String },

    #[error("params.name is missing or empty")]
    MissingName,

    #[error("params.parameters must be an object, got {found}")]
    InvalidParameters { found: String },
}

/// Failures while dispatching one tool call.
///
/// Contained per call: the dispatcher turns them into a system message and an
/// error payload for the follow-up.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no server provides tool '{tool}'")]
    ServerNotFound { tool: String },

    #[error(transparent)]
    Invocation(#[from] McpError),
}
