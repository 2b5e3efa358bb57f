//! Server process lifecycle management.
//!
//! Spawns MCP servers as child processes, runs the initialize handshake and
//! tool discovery under a fixed timeout, and shuts them down.

use std::collections::HashMap;
use std::time::Duration;

use tokio::process::{Child, Command};

use super::errors::McpError;
use super::transport::{extract_result, StdioTransport};
use super::types::{
    InitializeResult, ListToolsResult, McpToolDefinition, ServerConfig, PROTOCOL_VERSION,
};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Timeout for graceful shutdown before force-killing.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// How long to wait for stderr after a failed start.
const STDERR_GRACE: Duration = Duration::from_millis(500);

/// Cap on captured stderr in error messages.
const STDERR_MAX_CHARS: usize = 2000;

// ─── ManagedServer ───────────────────────────────────────────────────────────

/// A running MCP server process with its transport and discovered tools.
pub struct ManagedServer {
    /// Config key (e.g., "weather"); used as the catalog server id.
    pub name: String,
    /// Name the server reported in `serverInfo`, if any.
    pub display_name: Option<String>,
    pub description: Option<String>,
    process: Child,
    pub transport: StdioTransport,
    pub tools: Vec<McpToolDefinition>,
}

impl ManagedServer {
    /// Check if the server process is still running.
    pub fn is_alive(&mut self) -> bool {
        matches!(self.process.try_wait(), Ok(None))
    }

    /// Close stdin, then kill if the process lingers past the grace period.
    pub async fn shutdown(&mut self) -> Result<(), McpError> {
        if !self.is_alive() {
            tracing::debug!(server = %self.name, "mcp server already exited");
            return Ok(());
        }
        self.transport.close().await;

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.process.wait()).await {
            Ok(Ok(_)) => Ok(()),
            _ => {
                tracing::warn!(server = %self.name, "server did not exit on EOF; killing");
                self.process.kill().await.map_err(|e| McpError::TransportError {
                    server: self.name.clone(),
                    reason: format!("failed to kill process: {e}"),
                })
            }
        }
    }
}

// ─── Spawning ────────────────────────────────────────────────────────────────

/// Spawn one MCP server and discover its tools.
///
/// The whole handshake (`initialize`, `notifications/initialized`,
/// `tools/list`) shares a single `discovery_timeout`; on expiry the child is
/// killed and the start fails.
pub async fn spawn_server(
    name: &str,
    config: &ServerConfig,
    discovery_timeout: Duration,
) -> Result<ManagedServer, McpError> {
    let mut cmd = Command::new(&config.command);
    cmd.args(&config.args);
    cmd.envs(&config.env);
    if let Some(dir) = config.cwd.as_deref() {
        cmd.current_dir(dir);
    }
    cmd.stdin(std::process::Stdio::piped());
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::piped());
    cmd.kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|e| McpError::SpawnFailed {
        name: name.to_string(),
        reason: e.to_string(),
    })?;

    let stdin = child.stdin.take().ok_or(McpError::SpawnFailed {
        name: name.to_string(),
        reason: "failed to capture stdin".into(),
    })?;
    let stdout = child.stdout.take().ok_or(McpError::SpawnFailed {
        name: name.to_string(),
        reason: "failed to capture stdout".into(),
    })?;
    let stderr_handle = child.stderr.take();

    let transport = StdioTransport::new(name, stdin, stdout);

    let discovered = tokio::time::timeout(discovery_timeout, discover(&transport, name)).await;
    let (init, tools) = match discovered {
        Ok(Ok(found)) => found,
        Ok(Err(e)) => {
            let stderr_ctx = read_stderr_on_failure(stderr_handle).await;
            let _ = child.kill().await;
            return Err(McpError::InitFailed {
                name: name.to_string(),
                reason: format!("{e}{}", format_stderr_suffix(&stderr_ctx)),
            });
        }
        Err(_) => {
            let stderr_ctx = read_stderr_on_failure(stderr_handle).await;
            let _ = child.kill().await;
            return Err(McpError::Timeout {
                operation: format!(
                    "discovery for server '{name}'{}",
                    format_stderr_suffix(&stderr_ctx)
                ),
                timeout_ms: discovery_timeout.as_millis() as u64,
            });
        }
    };

    tracing::info!(
        server = name,
        tools = tools.len(),
        protocol = init.protocol_version.as_deref().unwrap_or("unknown"),
        "mcp server ready"
    );

    if let Some(stderr) = stderr_handle {
        tokio::spawn(forward_stderr(name.to_string(), stderr));
    }

    let description = config.description.clone().or(init.instructions);
    let display_name = init.server_info.and_then(|info| info.name);

    Ok(ManagedServer {
        name: name.to_string(),
        display_name,
        description,
        process: child,
        transport,
        tools,
    })
}

/// Initialize handshake followed by `tools/list`.
async fn discover(
    transport: &StdioTransport,
    server_name: &str,
) -> Result<(InitializeResult, Vec<McpToolDefinition>), McpError> {
    let params = serde_json::json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        },
    });

    let init_value = extract_result(transport.request("initialize", Some(params)).await?)?;
    let init: InitializeResult =
        serde_json::from_value(init_value).map_err(|e| McpError::InitFailed {
            name: server_name.to_string(),
            reason: format!("failed to parse initialize response: {e}"),
        })?;

    transport.notify("notifications/initialized", None).await?;

    let listed = extract_result(transport.request("tools/list", None).await?)?;
    let listed: ListToolsResult =
        serde_json::from_value(listed).map_err(|e| McpError::InitFailed {
            name: server_name.to_string(),
            reason: format!("failed to parse tools/list response: {e}"),
        })?;

    Ok((init, listed.tools))
}

/// Drain a running server's stderr into the log until the pipe closes.
async fn forward_stderr(server: String, stderr: tokio::process::ChildStderr) {
    use tokio::io::{AsyncBufReadExt, BufReader};

    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!(server = %server, line = %line, "mcp server stderr");
    }
}

/// Read whatever stderr a failed server produced, truncated for log output.
async fn read_stderr_on_failure(stderr_handle: Option<tokio::process::ChildStderr>) -> String {
    use tokio::io::AsyncReadExt;

    let Some(mut stderr) = stderr_handle else {
        return String::new();
    };

    let mut buf = String::new();
    match tokio::time::timeout(STDERR_GRACE, stderr.read_to_string(&mut buf)).await {
        Ok(Ok(_)) => truncate_chars(&buf, STDERR_MAX_CHARS),
        _ => String::new(),
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...(truncated)", &text[..idx]),
        None => text.to_string(),
    }
}

fn format_stderr_suffix(stderr: &str) -> String {
    if stderr.trim().is_empty() {
        String::new()
    } else {
        format!(" | stderr: {}", stderr.trim())
    }
}

// ─── Batch Operations ────────────────────────────────────────────────────────

/// Spawn all configured servers concurrently.
///
/// Servers that fail are returned alongside the ones that started; partial
/// startup is acceptable.
pub async fn spawn_all_servers(
    configs: &HashMap<String, ServerConfig>,
    discovery_timeout: Duration,
) -> (HashMap<String, ManagedServer>, Vec<(String, McpError)>) {
    let mut servers = HashMap::new();
    let mut errors = Vec::new();

    let mut handles = Vec::new();
    for (name, config) in configs {
        let name = name.clone();
        let config = config.clone();
        handles.push((
            name.clone(),
            tokio::spawn(async move { spawn_server(&name, &config, discovery_timeout).await }),
        ));
    }

    for (name, handle) in handles {
        match handle.await {
            Ok(Ok(server)) => {
                servers.insert(name, server);
            }
            Ok(Err(e)) => {
                tracing::warn!(server = %name, error = %e, "mcp server failed to start");
                errors.push((name, e));
            }
            Err(e) => {
                errors.push((
                    name.clone(),
                    McpError::SpawnFailed {
                        name,
                        reason: format!("join error: {e}"),
                    },
                ));
            }
        }
    }

    (servers, errors)
}

/// Shut down all managed servers.
pub async fn shutdown_all_servers(servers: &mut HashMap<String, ManagedServer>) {
    for server in servers.values_mut() {
        if let Err(e) = server.shutdown().await {
            tracing::warn!(server = %server.name, error = %e, "mcp server shutdown failed");
        }
    }
    servers.clear();
}

// ─── Tests ───────────────────────────────────────────────────────────────────
