//! Agent Core: tool-call detection and orchestration.
//!
//! Submodules:
//! - `extractor`: Ordered call grammars (envelope, pseudo-call, directive)
//! - `weather_fallback`: Location-based weather call when no explicit call exists
//! - `request_key`: Canonical identity of a call (tool + sorted args)
//! - `cache`: Session result cache keyed by `RequestKey`
//! - `dispatcher`: Executes one call, drives its status, reports events
//! - `follow_up`: The single post-dispatch round trip and its fallback
//! - `prompt`: System prompt built from the catalog
//! - `orchestrator`: One user turn end to end
//! - `events`: Observable engine events and their sink
//! - `types`: Shared types across the agent core
//! - `errors`: Agent-level error types

pub mod cache;
pub mod dispatcher;
pub mod errors;
pub mod events;
pub mod extractor;
pub mod follow_up;
pub mod orchestrator;
pub mod prompt;
pub mod request_key;
pub mod types;
pub mod weather_fallback;

// Re-exports for convenience
pub use cache::ResultCache;
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use errors::{DispatchError, ExtractError};
pub use events::{EngineEvent, EventSink};
pub use extractor::{CallMatcher, Extractor};
pub use follow_up::{FollowUpComposer, FollowUpReply};
pub use orchestrator::{Orchestrator, TurnReport};
pub use request_key::RequestKey;
pub use types::{CallStatus, ConversationMessage, SourceGrammar, ToolCall, ToolCallCandidate};
