//! Follow-up composer.
//!
//! After a dispatch the model gets exactly one more round trip: it is shown
//! the call and its result (or failure) and told to answer in prose with no
//! further tool calls. If that round trip fails or comes back empty, a fixed
//! acknowledgement stands in for the model's answer.

use serde_json::Value;

use super::types::{render_result, ToolCall};
use crate::config::FollowUpStyle;
use crate::inference::{ChatMessage, ModelClient};

/// Tool output longer than this is cut before it goes back to the model.
const MAX_RESULT_CHARS: usize = 8_000;

const NO_MORE_TOOLS: &str = "Do not call any tools. Do not output tool_call blocks, \
function-call syntax or \"Using tool:\" lines.";

/// Messages for the follow-up round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowUpPrompt {
    pub messages: Vec<ChatMessage>,
}

/// What the follow-up produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowUpReply {
    pub text: String,
    /// The fixed acknowledgement was used instead of a model answer.
    pub fell_back: bool,
    /// The model-call failure, if that is why we fell back.
    pub error: Option<String>,
}

pub struct FollowUpComposer {
    style: FollowUpStyle,
    fallback_text: String,
}

impl FollowUpComposer {
    pub fn new(style: FollowUpStyle, fallback_text: impl Into<String>) -> Self {
        Self {
            style,
            fallback_text: fallback_text.into(),
        }
    }

    /// Build the prompt for `call` given the dispatcher's payload.
    pub fn compose(&self, call: &ToolCall, payload: &Value) -> FollowUpPrompt {
        let arguments = serde_json::to_string(&call.args).unwrap_or_else(|_| "{}".to_string());
        let (task, body) = match error_reason(payload) {
            Some(reason) => (
                "The tool call failed. Briefly tell the user it could not be completed \
                 and, if it helps, what they could try instead.",
                format!(
                    "Tool: {}\nArguments: {arguments}\nError: {reason}",
                    call.tool
                ),
            ),
            None => (
                "Answer the user's request in natural language using this result. \
                 Summarize; do not dump raw data.",
                format!(
                    "Tool: {}\nArguments: {arguments}\nResult:\n{}",
                    call.tool,
                    truncate_utf8(&render_result(payload), MAX_RESULT_CHARS)
                ),
            ),
        };

        let messages = match self.style {
            FollowUpStyle::SingleInstruction => vec![ChatMessage::user(format!(
                "{body}\n\n{task} {NO_MORE_TOOLS}"
            ))],
            FollowUpStyle::SystemUserPair => vec![
                ChatMessage::system(format!(
                    "You are presenting the result of a tool call to the user. {task} {NO_MORE_TOOLS}"
                )),
                ChatMessage::user(body),
            ],
        };

        FollowUpPrompt { messages }
    }

    /// One round trip. Never fails: errors and empty replies fall back.
    pub async fn run(
        &self,
        model: &dyn ModelClient,
        call: &ToolCall,
        payload: &Value,
    ) -> FollowUpReply {
        let prompt = self.compose(call, payload);

        match model.call_model(&prompt.messages).await {
            Ok(text) if !text.trim().is_empty() => FollowUpReply {
                text,
                fell_back: false,
                error: None,
            },
            Ok(_) => {
                tracing::warn!(tool = %call.tool, "follow-up reply was empty; using fallback");
                self.fallback(None)
            }
            Err(e) => {
                tracing::warn!(tool = %call.tool, error = %e, "follow-up model call failed");
                self.fallback(Some(e.to_string()))
            }
        }
    }

    fn fallback(&self, error: Option<String>) -> FollowUpReply {
        FollowUpReply {
            text: self.fallback_text.clone(),
            fell_back: true,
            error,
        }
    }
}

/// `Some(reason)` for the dispatcher's `{"error": reason}` payload.
fn error_reason(payload: &Value) -> Option<&str> {
    let object = payload.as_object()?;
    if object.len() != 1 {
        return None;
    }
    object.get("error").and_then(Value::as_str)
}

/// Truncate to at most `max` chars on a char boundary.
fn truncate_utf8(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}\n[truncated]", &text[..idx]),
        None => text.to_string(),
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted `ModelClient` double shared by the engine tests.

    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::inference::{ChatMessage, ModelClient, ModelError};

    /// Replies from a queue; records every request. An exhausted queue
    /// answers with a connection error.
    pub struct ScriptedModel {
        replies: Mutex<VecDeque<Result<String, String>>>,
        pub requests: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedModel {
        pub fn new(replies: Vec<Result<&str, &str>>) -> Self {
            Self {
                replies: Mutex::new(
                    replies
                        .into_iter()
                        .map(|r| r.map(str::to_string).map_err(str::to_string))
                        .collect(),
                ),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ModelClient for ScriptedModel {
        async fn call_model(&self, messages: &[ChatMessage]) -> Result<String, ModelError> {
            self.requests.lock().unwrap().push(messages.to_vec());
            match self.replies.lock().unwrap().pop_front() {
                Some(Ok(text)) => Ok(text),
                Some(Err(reason)) => Err(ModelError::ConnectionFailed {
                    endpoint: "scripted".to_string(),
                    reason,
                }),
                None => Err(ModelError::ConnectionFailed {
                    endpoint: "scripted".to_string(),
                    reason: "script exhausted".to_string(),
                }),
            }
        }
    }
}
