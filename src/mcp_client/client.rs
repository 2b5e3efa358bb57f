//! MCP Client: high-level interface for tool execution.
//!
//! Owns the running server processes, exposes the catalog snapshot the
//! engine reads each turn, and routes `tools/call` requests.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::catalog::{Server, Tool};
use super::errors::McpError;
use super::lifecycle;
use super::transport::{extract_result, flatten_tool_result};
use super::types::ServerConfig;

// ─── Constants ───────────────────────────────────────────────────────────────

/// Default timeout for tool call execution (ms).
pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 30_000;

/// Default timeout for initialize + tools/list (ms).
pub const DEFAULT_DISCOVERY_TIMEOUT_MS: u64 = 10_000;

// ─── ToolInvoker ─────────────────────────────────────────────────────────────

/// The remote tool invocation boundary.
///
/// `Ok` carries the tool's result value; every failure (unreachable server,
/// JSON-RPC error, `isError`, timeout) is an `Err`.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    async fn invoke(
        &self,
        server_id: &str,
        tool_name: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, McpError>;
}

// ─── McpClient ───────────────────────────────────────────────────────────────

/// MCP client that manages multiple stdio servers and routes tool calls.
pub struct McpClient {
    servers: HashMap<String, lifecycle::ManagedServer>,
    configs: HashMap<String, ServerConfig>,
    call_timeout: Duration,
    discovery_timeout: Duration,
}

impl McpClient {
    pub fn new(configs: HashMap<String, ServerConfig>) -> Self {
        Self {
            servers: HashMap::new(),
            configs,
            call_timeout: Duration::from_millis(DEFAULT_CALL_TIMEOUT_MS),
            discovery_timeout: Duration::from_millis(DEFAULT_DISCOVERY_TIMEOUT_MS),
        }
    }

    pub fn with_timeouts(mut self, call_timeout_ms: u64, discovery_timeout_ms: u64) -> Self {
        self.call_timeout = Duration::from_millis(call_timeout_ms);
        self.discovery_timeout = Duration::from_millis(discovery_timeout_ms);
        self
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────

    /// Start all configured servers.
    ///
    /// Returns the servers that failed to start (partial startup is OK).
    pub async fn start_all(&mut self) -> Vec<(String, McpError)> {
        let (servers, errors) =
            lifecycle::spawn_all_servers(&self.configs, self.discovery_timeout).await;
        self.servers = servers;
        errors
    }

    /// Shut down all servers.
    pub async fn shutdown_all(&mut self) {
        lifecycle::shutdown_all_servers(&mut self.servers).await;
    }

    // ─── Catalog ─────────────────────────────────────────────────────────

    /// Snapshot of every running server and its tools, sorted by server id.
    pub fn catalog(&self) -> Vec<Server> {
        let mut catalog: Vec<Server> = self
            .servers
            .values()
            .map(|managed| Server {
                id: managed.name.clone(),
                name: managed
                    .display_name
                    .clone()
                    .unwrap_or_else(|| managed.name.clone()),
                description: managed.description.clone().unwrap_or_default(),
                tools: managed.tools.iter().map(Tool::from_definition).collect(),
            })
            .collect();
        catalog.sort_by(|a, b| a.id.cmp(&b.id));
        catalog
    }

    // ─── Status ──────────────────────────────────────────────────────────

    pub fn running_server_count(&self) -> usize {
        self.servers.len()
    }

    pub fn is_server_running(&self, name: &str) -> bool {
        self.servers.contains_key(name)
    }

    /// Names of all configured servers (including those that failed to start).
    pub fn configured_servers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.configs.keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl ToolInvoker for McpClient {
    async fn invoke(
        &self,
        server_id: &str,
        tool_name: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, McpError> {
        let start = Instant::now();

        let server = self
            .servers
            .get(server_id)
            .ok_or_else(|| McpError::ServerNotRunning {
                name: server_id.to_string(),
            })?;

        let params = serde_json::json!({
            "name": tool_name,
            "arguments": args,
        });

        let response = tokio::time::timeout(
            self.call_timeout,
            server.transport.request("tools/call", Some(params)),
        )
        .await
        .map_err(|_| McpError::Timeout {
            operation: format!("tools/call '{tool_name}'"),
            timeout_ms: self.call_timeout.as_millis() as u64,
        })??;

        let result = flatten_tool_result(tool_name, extract_result(response)?);

        tracing::info!(
            server = server_id,
            tool = tool_name,
            ok = result.is_ok(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "tools/call finished"
        );

        result
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
