//! Wire types for the OpenAI-compatible chat completions endpoint.
//!
//! Only what a single-prompt exchange needs: the request body, the streaming
//! chunk shape and the non-streaming response shape.

use serde::{Deserialize, Serialize, Serializer};

/// Sampling temperature sent with every prompt.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

// ─── Request Types ───────────────────────────────────────────────────────────

/// Message role. A single prompt only ever sends a user turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
}

/// A single message in the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Generation length bound.
///
/// The server's "no limit" value is `-1` on the wire; keeping it as its own
/// variant means it can never be mistaken for a real bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MaxTokens {
    #[default]
    Unlimited,
    Limit(u32),
}

impl From<Option<u32>> for MaxTokens {
    fn from(value: Option<u32>) -> Self {
        value.map_or(MaxTokens::Unlimited, MaxTokens::Limit)
    }
}

impl Serialize for MaxTokens {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MaxTokens::Unlimited => serializer.serialize_i64(-1),
            MaxTokens::Limit(n) => serializer.serialize_u32(*n),
        }
    }
}

/// Request body for `POST /v1/chat/completions`.
///
/// Built fresh for every call and never modified afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct RequestPayload {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: MaxTokens,
    pub stream: bool,
}

impl RequestPayload {
    /// A single user turn, always requested as an event stream.
    pub fn user_prompt(
        model: impl Into<String>,
        prompt: impl Into<String>,
        temperature: f32,
        max_tokens: MaxTokens,
    ) -> Self {
        Self {
            model: model.into(),
            messages: vec![ChatMessage::user(prompt)],
            temperature,
            max_tokens,
            stream: true,
        }
    }
}

// ─── Response Types ──────────────────────────────────────────────────────────

/// Raw SSE chunk from the API.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

/// A single choice within a streaming chunk.
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub delta: ChunkDelta,
}

/// The incremental update within a chunk choice.
///
/// Reasoning models also stream a `reasoning` field; it is not part of the
/// answer and is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChunkDelta {
    #[serde(default)]
    pub content: Option<String>,
}

/// Non-streaming response body, for servers that ignore `stream: true`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<ResponseChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseChoice {
    pub message: ResponseMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
}

// ─── Tests ───────────────────────────────────────────────────────────────────
