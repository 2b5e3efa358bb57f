//! Engine events and the sink they are reported through.

use serde::Serialize;
use tokio::sync::mpsc;

use super::types::{ConversationMessage, ToolCall};

/// Everything observable the engine does during a turn.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A tool call moved to a new status (snapshot after the transition).
    StatusChanged(ToolCall),
    MessageAppended(ConversationMessage),
    /// A remote call started (`true`) or the dispatch finished (`false`).
    ProcessingChanged { active: bool },
}

/// Fire-and-forget sender for `EngineEvent`s.
///
/// A dropped receiver is ignored; the engine never blocks on its observers.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<EngineEvent>>,
}

impl EventSink {
    pub fn new(tx: mpsc::UnboundedSender<EngineEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A sink with no receiver.
    pub fn discard() -> Self {
        Self { tx: None }
    }

    /// A sink plus the receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn emit(&self, event: EngineEvent) {
        if let Some(tx) = &self.tx {
            if tx.send(event).is_err() {
                tracing::trace!("engine event dropped: receiver closed");
            }
        }
    }
}

#[cfg(test)]
pub(crate) fn drain(rx: &mut mpsc::UnboundedReceiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
