//! Dispatcher: executes one accepted tool call against its owning server.
//!
//! Drives the call through `Pending → InProgress → Success | Error` (or
//! `Pending → Success` on a cache hit), reports every transition and message
//! as an `EngineEvent`, and returns the payload the follow-up should see.
//! Failures never escape: they become a system message, an `Error` status
//! and an `{"error": reason}` payload.

use std::time::Instant;

use serde_json::Value;

use super::cache::ResultCache;
use super::errors::DispatchError;
use super::events::{EngineEvent, EventSink};
use super::request_key::RequestKey;
use super::types::{render_result, CallStatus, ConversationMessage, ToolCall};
use crate::mcp_client::catalog::{server_for_tool, Server};
use crate::mcp_client::ToolInvoker;

/// What a dispatch produced.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    /// The call in its terminal state.
    pub call: ToolCall,
    /// The result, or `{"error": reason}`.
    pub follow_up_payload: Value,
    /// Messages appended (already emitted): one tool or system message.
    pub messages: Vec<ConversationMessage>,
}

impl DispatchOutcome {
    pub fn succeeded(&self) -> bool {
        self.call.status == CallStatus::Success
    }
}

#[derive(Debug, Default)]
pub struct Dispatcher;

impl Dispatcher {
    pub fn new() -> Self {
        Self
    }

    pub async fn process(
        &self,
        mut call: ToolCall,
        catalog: &[Server],
        invoker: &dyn ToolInvoker,
        cache: &mut ResultCache,
        events: &EventSink,
    ) -> DispatchOutcome {
        let key = call
            .request_key
            .get_or_insert_with(|| RequestKey::new(&call.tool, &call.args))
            .clone();
        events.emit(EngineEvent::StatusChanged(call.clone()));

        let cached = cache.get(&key).cloned();
        let result = match cached {
            Some(cached) => {
                tracing::info!(
                    tool = %call.tool,
                    request_key = %key.digest(),
                    "tool result served from cache"
                );
                Ok(cached)
            }
            None => {
                events.emit(EngineEvent::ProcessingChanged { active: true });
                set_status(&mut call, CallStatus::InProgress, events);

                let start = Instant::now();
                let outcome = execute(&call, catalog, invoker).await;
                tracing::info!(
                    tool = %call.tool,
                    request_key = %key.digest(),
                    ok = outcome.is_ok(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "tool dispatched"
                );

                if let Ok(value) = &outcome {
                    cache.insert(key.clone(), value.clone());
                }
                outcome
            }
        };

        let (message, payload) = match result {
            Ok(value) => {
                call.result = Some(value.clone());
                set_status(&mut call, CallStatus::Success, events);
                let message = ConversationMessage::tool(&call.id, render_result(&value));
                (message, value)
            }
            Err(e) => {
                let reason = e.to_string();
                tracing::warn!(tool = %call.tool, error = %reason, "tool call failed");
                call.error = Some(reason.clone());
                set_status(&mut call, CallStatus::Error, events);
                let message = ConversationMessage::system(format!(
                    "Error executing tool '{}': {reason}",
                    call.tool
                ));
                (message, serde_json::json!({ "error": reason }))
            }
        };

        events.emit(EngineEvent::MessageAppended(message.clone()));
        events.emit(EngineEvent::ProcessingChanged { active: false });

        DispatchOutcome {
            call,
            follow_up_payload: payload,
            messages: vec![message],
        }
    }
}

fn set_status(call: &mut ToolCall, status: CallStatus, events: &EventSink) {
    call.status = status;
    events.emit(EngineEvent::StatusChanged(call.clone()));
}

async fn execute(
    call: &ToolCall,
    catalog: &[Server],
    invoker: &dyn ToolInvoker,
) -> Result<Value, DispatchError> {
    let server = server_for_tool(catalog, &call.tool).ok_or_else(|| DispatchError::ServerNotFound {
        tool: call.tool.clone(),
    })?;

    let value = invoker
        .invoke(&server.id, &call.tool, Value::Object(call.args.clone()))
        .await?;
    Ok(value)
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod testing {
    //! Recording `ToolInvoker` double shared by the engine tests.

    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::Value;

    use crate::mcp_client::{McpError, ToolInvoker};

    /// Answers every call with `reply` (or fails with `ToolFailed`) and
    /// records `(server_id, tool, args)`.
    pub struct RecordingInvoker {
        reply: Result<Value, String>,
        pub calls: Mutex<Vec<(String, String, Value)>>,
    }

    impl RecordingInvoker {
        pub fn ok(reply: Value) -> Self {
            Self {
                reply: Ok(reply),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn failing(message: &str) -> Self {
            Self {
                reply: Err(message.to_string()),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ToolInvoker for RecordingInvoker {
        async fn invoke(
            &self,
            server_id: &str,
            tool_name: &str,
            args: Value,
        ) -> Result<Value, McpError> {
            self.calls
                .lock()
                .unwrap()
                .push((server_id.to_string(), tool_name.to_string(), args));
            self.reply.clone().map_err(|message| McpError::ToolFailed {
                tool: tool_name.to_string(),
                message,
            })
        }
    }
}
