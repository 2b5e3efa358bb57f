//! Shared types for the agent core.
//!
//! Candidates produced by the extractor, the `ToolCall` state machine driven
//! by the dispatcher, and the conversation messages reported to the host.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::request_key::RequestKey;
use crate::inference::types::{ChatMessage, Role};

// ─── Candidates ─────────────────────────────────────────────────────────────

/// Which surface syntax a candidate was recognized from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceGrammar {
    /// Fenced or tagged JSON-RPC `execute_tool` envelope.
    Structured,
    /// `tool("value")` / `tool(key="value")`.
    PseudoCall,
    /// `Using tool: tool(k=v, ...)`.
    NaturalLanguage,
    /// Inferred from a weather question; no explicit call in the text.
    DomainFallback,
}

/// A tool invocation recognized in model text, already resolved against the
/// catalog (`tool_name` is the catalog's spelling).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallCandidate {
    pub tool_name: String,
    pub args: Map<String, Value>,
    pub source_grammar: SourceGrammar,
}

impl ToolCallCandidate {
    pub fn new(tool_name: &str, args: Map<String, Value>, source_grammar: SourceGrammar) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            args,
            source_grammar,
        }
    }

    pub fn request_key(&self) -> RequestKey {
        RequestKey::new(&self.tool_name, &self.args)
    }
}

// ─── Tool Calls ─────────────────────────────────────────────────────────────

/// Lifecycle of a dispatched call. `Success` and `Error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Pending,
    InProgress,
    Success,
    Error,
}

impl CallStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, CallStatus::Success | CallStatus::Error)
    }
}

/// A candidate accepted for dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// `call_<uuid v4>`.
    pub id: String,
    pub tool: String,
    pub args: Map<String, Value>,
    pub status: CallStatus,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub request_key: Option<RequestKey>,
}

impl ToolCall {
    pub fn from_candidate(candidate: &ToolCallCandidate) -> Self {
        Self {
            id: format!("call_{}", uuid::Uuid::new_v4()),
            tool: candidate.tool_name.clone(),
            args: candidate.args.clone(),
            status: CallStatus::Pending,
            result: None,
            error: None,
            request_key: Some(candidate.request_key()),
        }
    }
}

// ─── Conversation Messages ──────────────────────────────────────────────────

/// A message appended to the conversation during a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    /// RFC 3339 timestamp.
    pub timestamp: String,
    /// Calls detected in an assistant message, attached for transparency.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallCandidate>,
    /// For `tool` role: the call this result belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ConversationMessage {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>, tool_calls: Vec<ToolCallCandidate>) -> Self {
        Self {
            tool_calls,
            ..Self::with_role(Role::Assistant, content)
        }
    }

    pub fn tool(call_id: &str, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(call_id.to_string()),
            ..Self::with_role(Role::Tool, content)
        }
    }

    /// The form this message takes in a model request.
    ///
    /// System messages in the history are notices for the user (errors) and
    /// are not replayed. Tool results go back as user-visible context since
    /// the calls were never native tool calls.
    pub fn to_chat_message(&self) -> Option<ChatMessage> {
        match self.role {
            Role::System => None,
            Role::Tool => Some(ChatMessage::user(format!("Tool result:\n{}", self.content))),
            role => Some(ChatMessage {
                role,
                content: self.content.clone(),
            }),
        }
    }
}

/// Render a tool result as readable text: strings as-is, anything else as
/// pretty JSON.
pub fn render_result(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_call_from_candidate() {
        let mut args = Map::new();
        args.insert("location".into(), json!("Seattle"));
        let candidate = ToolCallCandidate::new("get_weather", args, SourceGrammar::Structured);

        let call = ToolCall::from_candidate(&candidate);
        assert!(call.id.starts_with("call_"));
        assert_eq!(call.status, CallStatus::Pending);
        assert!(!call.status.is_terminal());
        assert_eq!(call.request_key, Some(candidate.request_key()));
    }

    #[test]
    fn test_render_result() {
        assert_eq!(render_result(&json!("Sunny, 18C")), "Sunny, 18C");
        assert_eq!(render_result(&json!({"t": 18})), "{\n  \"t\": 18\n}");
    }

    #[test]
    fn test_to_chat_message_mapping() {
        assert!(ConversationMessage::system("Error executing tool").to_chat_message().is_none());

        let tool = ConversationMessage::tool("call_1", "Sunny").to_chat_message().unwrap();
        assert_eq!(tool.role, Role::User);
        assert_eq!(tool.content, "Tool result:\nSunny");

        let assistant = ConversationMessage::assistant("Hi", Vec::new())
            .to_chat_message()
            .unwrap();
        assert_eq!(assistant.role, Role::Assistant);
    }

    #[test]
    fn test_message_serialization_skips_empty_fields() {
        let json = serde_json::to_string(&ConversationMessage::user("hello")).unwrap();
        assert!(json.contains("\"role\":\"user\""));
        assert!(!json.contains("tool_calls"));
        assert!(!json.contains("tool_call_id"));
    }

    #[test]
    fn test_source_grammar_snake_case() {
        let json = serde_json::to_string(&SourceGrammar::DomainFallback).unwrap();
        assert_eq!(json, "\"domain_fallback\"");
    }
}
