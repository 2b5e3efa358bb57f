//! toolrelay REPL: chat with a model that can call MCP tools.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use toolrelay::agent_core::{ConversationMessage, EngineEvent, EventSink, Orchestrator};
use toolrelay::config::{self, ConfigError, EngineConfig};
use toolrelay::inference::{OpenAiCompatClient, Role};
use toolrelay::mcp_client::McpClient;

#[derive(Debug, Parser)]
#[command(name = "toolrelay", version, about = "Chat with a local model that can call MCP tools")]
struct Cli {
    /// Config file (defaults to $TOOLRELAY_CONFIG or toolrelay.yaml found upward from here)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log to stderr instead of the data-directory log file
    #[arg(long)]
    log_stderr: bool,

    /// With --log-stderr, emit JSON log lines
    #[arg(long, requires = "log_stderr")]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.log_stderr {
        toolrelay::init_stderr_tracing(cli.json_logs);
    } else {
        let log_path = toolrelay::init_tracing().context("failed to open log file")?;
        eprintln!("logging to {}", log_path.display());
    }

    let config = resolve_config(cli.config.as_deref())?;

    let mut mcp = McpClient::new(config.servers.clone()).with_timeouts(
        config.engine.tool_call_timeout_ms,
        config.engine.discovery_timeout_ms,
    );
    for (name, err) in mcp.start_all().await {
        eprintln!("server '{name}' failed to start: {err}");
    }
    let configured = mcp.configured_servers();
    let down: Vec<&str> = configured
        .iter()
        .map(String::as_str)
        .filter(|name| !mcp.is_server_running(name))
        .collect();
    let catalog = mcp.catalog();
    eprintln!(
        "{}/{} server(s) running, {} tool(s) available",
        mcp.running_server_count(),
        configured.len(),
        toolrelay::mcp_client::catalog::tool_count(&catalog)
    );
    if !down.is_empty() {
        eprintln!("not running: {}", down.join(", "));
    }

    let model = OpenAiCompatClient::from_settings(config.model.clone())
        .context("failed to build model client")?;
    eprintln!("model: {}", model.model_name());

    let (events, mut rx) = EventSink::channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            print_event(&event);
        }
    });

    let mut orchestrator = Orchestrator::new(model, mcp, &config, events);
    let mut history: Vec<ConversationMessage> = Vec::new();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    eprintln!("type a message, /clear to reset, /quit to exit");
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        let input = line.trim();
        match input {
            "" => continue,
            "/quit" | "/exit" => break,
            "/clear" => {
                history.clear();
                orchestrator.clear_cache();
                eprintln!("history and cache cleared");
                continue;
            }
            _ => {}
        }

        let report = orchestrator.run_turn(&history, input, &catalog).await;
        history.extend(report.messages);
    }

    orchestrator.invoker_mut().shutdown_all().await;
    drop(orchestrator);
    let _ = printer.await;
    Ok(())
}

/// Explicit path, then discovery; no config file at all means defaults.
fn resolve_config(explicit: Option<&std::path::Path>) -> Result<EngineConfig> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let cwd = std::env::current_dir().context("failed to read current directory")?;
            match config::find_config_path(&cwd) {
                Ok(path) => path,
                Err(ConfigError::NotFound) => {
                    tracing::warn!("no config file found; using defaults");
                    eprintln!("no toolrelay.yaml found; using defaults (no servers)");
                    return Ok(EngineConfig::default());
                }
                Err(e) => return Err(e.into()),
            }
        }
    };

    let config = config::load_config(&path)
        .with_context(|| format!("failed to load {}", path.display()))?;
    tracing::info!(path = %path.display(), servers = config.servers.len(), "config loaded");
    Ok(config)
}

fn print_event(event: &EngineEvent) {
    match event {
        EngineEvent::StatusChanged(call) => {
            eprintln!("  [{}] {:?}", call.tool, call.status);
        }
        EngineEvent::MessageAppended(message) => match message.role {
            Role::User => {}
            Role::Assistant => println!("assistant> {}", message.content),
            Role::Tool => println!("tool> {}", message.content),
            Role::System => eprintln!("! {}", message.content),
        },
        EngineEvent::ProcessingChanged { .. } => {}
    }
}
