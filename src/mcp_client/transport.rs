//! JSON-RPC over stdio transport.
//!
//! Line-delimited JSON: one request per line on the child's stdin, responses
//! read from stdout until the matching `id` arrives.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, ChildStdout};
use tokio::sync::Mutex;

use super::errors::McpError;
use super::types::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

// ─── Transport ───────────────────────────────────────────────────────────────

/// Bi-directional JSON-RPC transport over a child process's stdio.
pub struct StdioTransport {
    server_name: String,
    next_id: AtomicU64,
    /// `None` once closed.
    writer: Mutex<Option<ChildStdin>>,
    reader: Mutex<BufReader<ChildStdout>>,
}

impl StdioTransport {
    pub fn new(server_name: &str, stdin: ChildStdin, stdout: ChildStdout) -> Self {
        Self {
            server_name: server_name.to_string(),
            next_id: AtomicU64::new(1),
            writer: Mutex::new(Some(stdin)),
            reader: Mutex::new(BufReader::new(stdout)),
        }
    }

    /// Send a request and wait for the response carrying the same id.
    ///
    /// Non-JSON lines and responses for other ids are skipped; servers may
    /// interleave log output and notifications on stdout.
    pub async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.write_line(&JsonRpcRequest::new(id, method, params)).await?;

        let mut line_buf = String::new();
        let mut reader = self.reader.lock().await;

        loop {
            line_buf.clear();
            let bytes_read = reader
                .read_line(&mut line_buf)
                .await
                .map_err(|e| self.transport_error(format!("failed to read from stdout: {e}")))?;

            if bytes_read == 0 {
                return Err(self.transport_error("server stdout closed (process may have exited)"));
            }

            let trimmed = line_buf.trim();
            if trimmed.is_empty() {
                continue;
            }

            match serde_json::from_str::<JsonRpcResponse>(trimmed) {
                Ok(resp) if resp.id == id => return Ok(resp),
                Ok(resp) => {
                    tracing::debug!(server = %self.server_name, id = resp.id, "skipping stale response");
                }
                Err(_) => {
                    tracing::trace!(server = %self.server_name, line = trimmed, "skipping non-response line");
                }
            }
        }
    }

    /// Send a notification (no response expected).
    pub async fn notify(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), McpError> {
        self.write_line(&JsonRpcNotification::new(method, params)).await
    }

    async fn write_line<T: Serialize>(&self, message: &T) -> Result<(), McpError> {
        let mut json = serde_json::to_string(message)
            .map_err(|e| self.transport_error(format!("failed to serialize message: {e}")))?;
        json.push('\n');

        let mut guard = self.writer.lock().await;
        let writer = guard
            .as_mut()
            .ok_or_else(|| self.transport_error("stdin already closed"))?;
        writer
            .write_all(json.as_bytes())
            .await
            .map_err(|e| self.transport_error(format!("failed to write to stdin: {e}")))?;
        writer
            .flush()
            .await
            .map_err(|e| self.transport_error(format!("failed to flush stdin: {e}")))
    }

    /// Close the child's stdin. Well-behaved servers exit on EOF.
    pub async fn close(&self) {
        self.writer.lock().await.take();
    }

    fn transport_error(&self, reason: impl Into<String>) -> McpError {
        McpError::TransportError {
            server: self.server_name.clone(),
            reason: reason.into(),
        }
    }
}

// ─── Response Helpers ────────────────────────────────────────────────────────

/// Extract the result from a JSON-RPC response, converting errors to `McpError`.
pub fn extract_result(response: JsonRpcResponse) -> Result<serde_json::Value, McpError> {
    if let Some(err) = response.error {
        return Err(McpError::ServerError {
            code: err.code,
            message: err.message,
            data: err.data,
        });
    }

    response.result.ok_or(McpError::ServerError {
        code: -32603,
        message: "response missing both result and error".into(),
        data: None,
    })
}

/// Flatten an MCP `tools/call` result into the value handed to the engine.
///
/// `{content: [{type: "text", text}], isError}` becomes the joined text as a
/// JSON string; `isError: true` becomes `McpError::ToolFailed`. Anything that
/// is not in that shape (structured results, non-text parts only) is returned
/// unchanged.
pub fn flatten_tool_result(
    tool_name: &str,
    result: serde_json::Value,
) -> Result<serde_json::Value, McpError> {
    let is_error = result
        .get("isError")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let texts: Option<Vec<String>> = result
        .get("content")
        .and_then(|c| c.as_array())
        .map(|parts| {
            parts
                .iter()
                .filter(|p| p.get("type").and_then(|t| t.as_str()) == Some("text"))
                .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                .map(str::to_string)
                .collect()
        });

    match texts {
        Some(texts) if is_error => Err(McpError::ToolFailed {
            tool: tool_name.to_string(),
            message: if texts.is_empty() {
                "tool returned isError without a message".to_string()
            } else {
                texts.join("\n")
            },
        }),
        Some(texts) if !texts.is_empty() => Ok(serde_json::Value::String(texts.join("\n"))),
        _ if is_error => Err(McpError::ToolFailed {
            tool: tool_name.to_string(),
            message: result.to_string(),
        }),
        _ => Ok(result),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp_client::types::JsonRpcError;

    #[test]
    fn test_extract_result_success() {
        let resp = JsonRpcResponse {
            id: 1,
            result: Some(serde_json::json!({"tools": []})),
            error: None,
        };
        assert!(extract_result(resp).unwrap()["tools"].is_array());
    }

    #[test]
    fn test_extract_result_error() {
        let resp = JsonRpcResponse {
            id: 1,
            result: None,
            error: Some(JsonRpcError {
                code: -32601,
                message: "Method not found".into(),
                data: None,
            }),
        };
        match extract_result(resp).unwrap_err() {
            McpError::ServerError { code, message, .. } => {
                assert_eq!(code, -32601);
                assert_eq!(message, "Method not found");
            }
            other => panic!("expected ServerError, got {other:?}"),
        }
    }

    #[test]
    fn test_extract_result_missing_both() {
        let resp = JsonRpcResponse {
            id: 1,
            result: None,
            error: None,
        };
        assert!(matches!(extract_result(resp), Err(McpError::ServerError { .. })));
    }

    #[test]
    fn test_flatten_text_content() {
        let raw = serde_json::json!({
            "content": [
                {"type": "text", "text": "Forecast for 47.6, -122.3:"},
                {"type": "text", "text": "Tonight: Rain"}
            ],
            "isError": false
        });
        let flat = flatten_tool_result("get_forecast", raw).unwrap();
        assert_eq!(flat, "Forecast for 47.6, -122.3:\nTonight: Rain");
    }

    #[test]
    fn test_flatten_is_error() {
        let raw = serde_json::json!({
            "content": [{"type": "text", "text": "Failed to retrieve alerts data"}],
            "isError": true
        });
        match flatten_tool_result("get_alerts", raw).unwrap_err() {
            McpError::ToolFailed { tool, message } => {
                assert_eq!(tool, "get_alerts");
                assert_eq!(message, "Failed to retrieve alerts data");
            }
            other => panic!("expected ToolFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_flatten_structured_passthrough() {
        let raw = serde_json::json!({"temperature": 12, "unit": "C"});
        let flat = flatten_tool_result("get_weather", raw.clone()).unwrap();
        assert_eq!(flat, raw);
    }
}
