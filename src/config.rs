//! Engine configuration loading.
//!
//! Reads `toolrelay.yaml` and resolves environment variables. The file has
//! three sections: `model` (the chat endpoint), `engine` (timeouts and the
//! fixed texts used on recovery paths) and `servers` (MCP servers to spawn).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::mcp_client::client::{DEFAULT_CALL_TIMEOUT_MS, DEFAULT_DISCOVERY_TIMEOUT_MS};
use crate::mcp_client::ServerConfig;

/// File name searched for when `TOOLRELAY_CONFIG` is unset.
pub const CONFIG_FILE_NAME: &str = "toolrelay.yaml";

/// Env var pointing at an explicit config file.
pub const CONFIG_ENV_VAR: &str = "TOOLRELAY_CONFIG";

// ─── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not find toolrelay.yaml (set TOOLRELAY_CONFIG or run from a project directory)")]
    NotFound,

    #[error("failed to read {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("failed to parse config: {reason}")]
    Parse { reason: String },
}

// ─── Public Types ────────────────────────────────────────────────────────────

/// How the follow-up prompt is laid out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowUpStyle {
    /// One rolled-up user message carrying rules, call and result.
    #[default]
    SingleInstruction,
    /// A system message with the rules, then a user message with the payload.
    SystemUserPair,
}

/// The OpenAI-compatible chat endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model_name")]
    pub model_name: String,
    /// Sent as a bearer token when non-empty.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub follow_up_style: FollowUpStyle,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model_name: default_model_name(),
            api_key: None,
            temperature: default_temperature(),
            max_tokens: None,
            request_timeout_secs: default_request_timeout_secs(),
            follow_up_style: FollowUpStyle::default(),
        }
    }
}

/// Tuning for the detection and dispatch engine.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSettings {
    #[serde(default = "default_tool_call_timeout_ms")]
    pub tool_call_timeout_ms: u64,
    #[serde(default = "default_discovery_timeout_ms")]
    pub discovery_timeout_ms: u64,
    /// Shown when the follow-up round trip fails or comes back empty.
    #[serde(default = "default_follow_up_fallback")]
    pub follow_up_fallback: String,
    /// Shown when the model's turn has no visible content.
    #[serde(default = "default_empty_response_placeholder")]
    pub empty_response_placeholder: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            tool_call_timeout_ms: default_tool_call_timeout_ms(),
            discovery_timeout_ms: default_discovery_timeout_ms(),
            follow_up_fallback: default_follow_up_fallback(),
            empty_response_placeholder: default_empty_response_placeholder(),
        }
    }
}

/// Top-level configuration (mirrors `toolrelay.yaml`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub model: ModelSettings,
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub servers: HashMap<String, ServerConfig>,
}

fn default_base_url() -> String {
    "http://localhost:11434/v1".to_string()
}
fn default_model_name() -> String {
    "llama3.1".to_string()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_request_timeout_secs() -> u64 {
    60
}
fn default_tool_call_timeout_ms() -> u64 {
    DEFAULT_CALL_TIMEOUT_MS
}
fn default_discovery_timeout_ms() -> u64 {
    DEFAULT_DISCOVERY_TIMEOUT_MS
}
fn default_follow_up_fallback() -> String {
    "I've received the tool results. Let me know if you need anything else.".to_string()
}
fn default_empty_response_placeholder() -> String {
    "I'm processing your request...".to_string()
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Locate the config file.
///
/// `TOOLRELAY_CONFIG` wins when it points at an existing file; otherwise
/// searches upward from `start` for `toolrelay.yaml`.
pub fn find_config_path(start: &Path) -> Result<PathBuf, ConfigError> {
    if let Ok(explicit) = std::env::var(CONFIG_ENV_VAR) {
        let candidate = PathBuf::from(expand_tilde(&explicit));
        if candidate.is_file() {
            return Ok(candidate);
        }
        tracing::warn!(path = %candidate.display(), "TOOLRELAY_CONFIG does not point at a file");
    }

    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            return Ok(candidate);
        }
        if !dir.pop() {
            break;
        }
    }

    Err(ConfigError::NotFound)
}

/// Load and parse the configuration file.
///
/// Performs environment-variable interpolation on `${VAR_NAME}` and
/// `${VAR_NAME:-default}` before parsing, and `~` expansion on server
/// commands and working directories.
pub fn load_config(path: &Path) -> Result<EngineConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    parse_config(&raw)
}

/// Parse configuration text (already read from disk).
pub fn parse_config(raw: &str) -> Result<EngineConfig, ConfigError> {
    let interpolated = interpolate_env_vars(raw);

    let mut config: EngineConfig =
        serde_yaml::from_str(&interpolated).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;

    for server in config.servers.values_mut() {
        server.command = expand_tilde(&server.command);
        server.cwd = server.cwd.as_deref().map(expand_tilde);
    }
    config.model.api_key = config.model.api_key.filter(|key| !key.trim().is_empty());

    Ok(config)
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Replace `${VAR}` and `${VAR:-default}` in a string.
fn interpolate_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_expr = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_expr.push(c);
            }
            result.push_str(&resolve_var_expr(&var_expr));
        } else {
            result.push(ch);
        }
    }

    result
}

/// Resolve a variable expression like `VAR` or `VAR:-default`.
fn resolve_var_expr(expr: &str) -> String {
    match expr.split_once(":-") {
        Some((var_name, default)) => std::env::var(var_name).unwrap_or_else(|_| default.to_string()),
        None => std::env::var(expr).unwrap_or_default(),
    }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.display());
        }
    }
    path.to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
