//! Inference: talks to the local OpenAI-compatible endpoint.
//!
//! - Request/response wire types
//! - Incremental event-stream decoding
//! - Timing statistics
//! - The prompt client tying them together

pub mod client;
pub mod errors;
pub mod stats;
pub mod streaming;
pub mod types;

// Re-exports for convenience
pub use client::{PromptClient, PromptReply, PromptRequest};
pub use errors::{ErrorKind, PromptError};
pub use stats::{Stats, StatsCollector};
pub use streaming::{ContentFragment, DecoderState, StreamDecoder};
pub use types::{ChatMessage, MaxTokens, RequestPayload, Role};
