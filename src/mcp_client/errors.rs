//! MCP Client error types.

use thiserror::Error;

/// Errors that can occur while talking to MCP servers.
#[derive(Debug, Error)]
pub enum McpError {
    /// A server process failed to start.
    #[error("failed to spawn server '{name}': {reason}")]
    SpawnFailed {
        name: String,
        reason: String,
    },

    /// The initialization handshake or tool discovery failed.
    #[error("server '{name}' initialization failed: {reason}")]
    InitFailed {
        name: String,
        reason: String,
    },

    /// JSON-RPC communication error (malformed message, I/O error).
    #[error("transport error for server '{server}': {reason}")]
    TransportError {
        server: String,
        reason: String,
    },

    /// Server returned a JSON-RPC error response.
    #[error("server error [{code}]: {message}")]
    ServerError {
        code: i32,
        message: String,
        data: Option<serde_json::Value>,
    },

    /// The tool ran but reported failure (`isError: true`).
    #[error("tool '{tool}' reported an error: {message}")]
    ToolFailed {
        tool: String,
        message: String,
    },

    /// No running server with this id.
    #[error("server '{name}' is not running")]
    ServerNotRunning {
        name: String,
    },

    /// A remote call exceeded its time budget.
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout {
        operation: String,
        timeout_ms: u64,
    },
}

impl McpError {
    /// Whether the failure was a timeout (discovery or tool call).
    pub fn is_timeout(&self) -> bool {
        matches!(self, McpError::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_display() {
        let err = McpError::Timeout {
            operation: "tools/call 'get_weather'".into(),
            timeout_ms: 1500,
        };
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "tools/call 'get_weather' timed out after 1500ms");
    }

    #[test]
    fn test_tool_failed_is_not_timeout() {
        let err = McpError::ToolFailed {
            tool: "calculate".into(),
            message: "division by zero".into(),
        };
        assert!(!err.is_timeout());
        assert!(err.to_string().contains("division by zero"));
    }
}
