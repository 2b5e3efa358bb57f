//! Inference Client: the model-call boundary.
//!
//! The engine talks to the model only through `ModelClient`. The bundled
//! implementation speaks the OpenAI Chat Completions API (non-streaming), so
//! any local runtime exposing `/v1/chat/completions` works; switching models
//! is a config change, not a code change.

pub mod client;
pub mod errors;
pub mod types;

// Re-exports for convenience
pub use client::{ModelClient, OpenAiCompatClient};
pub use errors::ModelError;
pub use types::{ChatMessage, Role};
