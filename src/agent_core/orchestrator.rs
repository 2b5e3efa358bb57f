//! Turn orchestrator: model call, extraction, single dispatch, follow-up.
//!
//! One turn:
//! 1. **Ask**: system prompt (from the catalog) + replayed history + the user
//!    message go to the model.
//! 2. **Detect**: the reply is run through the extractor. An empty reply gets
//!    a placeholder and only the weather fallback, run against the user's own
//!    message.
//! 3. **Dispatch**: the first candidate, and only the first, is executed.
//! 4. **Follow up**: one more round trip turns the result into prose. Calls in
//!    that reply are recorded on the message but never executed.
//!
//! Failures are folded into the turn's messages; `run_turn` never errors.

use super::cache::ResultCache;
use super::dispatcher::Dispatcher;
use super::events::{EngineEvent, EventSink};
use super::extractor::Extractor;
use super::follow_up::{FollowUpComposer, FollowUpReply};
use super::prompt::build_system_prompt;
use super::types::{ConversationMessage, SourceGrammar, ToolCall, ToolCallCandidate};
use crate::config::EngineConfig;
use crate::inference::{ChatMessage, ModelClient};
use crate::mcp_client::catalog::Server;
use crate::mcp_client::ToolInvoker;

// ─── Types ──────────────────────────────────────────────────────────────────

/// Everything one turn produced.
#[derive(Debug, Clone, Default)]
pub struct TurnReport {
    /// Candidates detected in the assistant reply (or by the empty-reply fallback).
    pub candidates: Vec<ToolCallCandidate>,
    /// The call that was executed, in its terminal state.
    pub dispatched: Option<ToolCall>,
    pub follow_up: Option<FollowUpReply>,
    /// Messages appended this turn, in order. Callers extend their history with these.
    pub messages: Vec<ConversationMessage>,
}

pub struct Orchestrator<M, I> {
    model: M,
    invoker: I,
    extractor: Extractor,
    dispatcher: Dispatcher,
    composer: FollowUpComposer,
    cache: ResultCache,
    events: EventSink,
    empty_placeholder: String,
}

impl<M: ModelClient, I: ToolInvoker> Orchestrator<M, I> {
    pub fn new(model: M, invoker: I, config: &EngineConfig, events: EventSink) -> Self {
        Self {
            model,
            invoker,
            extractor: Extractor::default(),
            dispatcher: Dispatcher::new(),
            composer: FollowUpComposer::new(
                config.model.follow_up_style,
                config.engine.follow_up_fallback.clone(),
            ),
            cache: ResultCache::new(),
            events,
            empty_placeholder: config.engine.empty_response_placeholder.clone(),
        }
    }

    /// Replace the default grammar set.
    pub fn with_extractor(mut self, extractor: Extractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    pub fn invoker(&self) -> &I {
        &self.invoker
    }

    pub fn invoker_mut(&mut self) -> &mut I {
        &mut self.invoker
    }

    /// Run a full turn for `user_message`.
    ///
    /// The user message itself is the first entry of `TurnReport::messages`.
    pub async fn run_turn(
        &mut self,
        history: &[ConversationMessage],
        user_message: &str,
        catalog: &[Server],
    ) -> TurnReport {
        let mut report = TurnReport::default();
        self.append(&mut report, ConversationMessage::user(user_message));

        let mut request = Vec::with_capacity(history.len() + 2);
        request.push(ChatMessage::system(build_system_prompt(catalog)));
        request.extend(history.iter().filter_map(ConversationMessage::to_chat_message));
        request.push(ChatMessage::user(user_message));

        tracing::info!(
            history = history.len(),
            servers = catalog.len(),
            "turn started"
        );

        let text = match self.model.call_model(&request).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "model call failed");
                self.append(
                    &mut report,
                    ConversationMessage::system(format!("Model call failed: {e}")),
                );
                return report;
            }
        };

        let rest = self.handle_assistant_text(&text, user_message, catalog).await;
        report.candidates = rest.candidates;
        report.dispatched = rest.dispatched;
        report.follow_up = rest.follow_up;
        report.messages.extend(rest.messages);
        report
    }

    /// Process one assistant reply: detect, dispatch the first call, follow up.
    pub async fn handle_assistant_text(
        &mut self,
        text: &str,
        user_message: &str,
        catalog: &[Server],
    ) -> TurnReport {
        let mut report = TurnReport::default();

        let (content, candidates) = if text.trim().is_empty() {
            tracing::info!("empty model reply; trying the domain fallback on the user message");
            let candidates =
                self.extractor
                    .detect_grammar(user_message, catalog, SourceGrammar::DomainFallback);
            (self.empty_placeholder.clone(), candidates)
        } else {
            (text.to_string(), self.extractor.detect(text, catalog))
        };

        // The assistant message lands before any dispatch so observers see
        // the call request ahead of its result.
        report.candidates = candidates.clone();
        self.append(&mut report, ConversationMessage::assistant(content, candidates));

        let Some(first) = report.candidates.first() else {
            return report;
        };
        if report.candidates.len() > 1 {
            tracing::info!(
                detected = report.candidates.len(),
                tool = %first.tool_name,
                "several calls detected; dispatching only the first"
            );
        }

        let call = ToolCall::from_candidate(first);
        let outcome = self
            .dispatcher
            .process(call, catalog, &self.invoker, &mut self.cache, &self.events)
            .await;
        tracing::debug!(
            tool = %outcome.call.tool,
            succeeded = outcome.succeeded(),
            "dispatch finished; requesting follow-up"
        );
        report.messages.extend(outcome.messages);

        let reply = self
            .composer
            .run(&self.model, &outcome.call, &outcome.follow_up_payload)
            .await;
        if let Some(error) = &reply.error {
            self.append(
                &mut report,
                ConversationMessage::system(format!("Follow-up model call failed: {error}")),
            );
        }

        let ignored = self.extractor.detect(&reply.text, catalog);
        if !ignored.is_empty() {
            tracing::warn!(
                count = ignored.len(),
                "follow-up reply contains tool calls; recorded but not executed"
            );
        }
        self.append(
            &mut report,
            ConversationMessage::assistant(reply.text.clone(), ignored),
        );

        report.dispatched = Some(outcome.call);
        report.follow_up = Some(reply);
        report
    }

    fn append(&self, report: &mut TurnReport, message: ConversationMessage) {
        self.events.emit(EngineEvent::MessageAppended(message.clone()));
        report.messages.push(message);
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
