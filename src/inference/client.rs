//! Prompt client for one prompt exchange against the local server.
//!
//! Resolves the model, sends the chat completion request, decodes the event
//! stream and optionally echoes fragments and collects timing statistics.
//! The request is always sent with `stream: true`; live echo versus silent
//! accumulation is purely a presentation choice.

use std::io::Write;
use std::time::{Duration, Instant};

use futures::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client as HttpClient;

use crate::config::ClientConfig;
use crate::guard::{
    safe_json_from_str, sanitize_terminal_output, validate_prompt, validate_request_model,
    ValidationError,
};
use crate::process_manager::ModelRegistry;

use super::errors::PromptError;
use super::stats::{Stats, StatsCollector};
use super::streaming::{ContentFragment, DecoderState, StreamDecoder};
use super::types::{ChatCompletionResponse, MaxTokens, RequestPayload};

// ─── Constants ───────────────────────────────────────────────────────────────

/// TCP connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Total timeout for the whole exchange, including reading the stream.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Request content type; explicit charset so multi-byte prompts survive.
const JSON_UTF8: &str = "application/json; charset=utf-8";

/// Largest non-streaming response body accepted (16 MiB).
const MAX_RESPONSE_BYTES: usize = 16 * 1024 * 1024;

/// Longest error body kept in [`PromptError::HttpStatus`].
const MAX_ERROR_BODY_CHARS: usize = 2000;

// ─── Request / Reply ─────────────────────────────────────────────────────────

/// What to send and how to present it.
#[derive(Debug, Clone, Default)]
pub struct PromptRequest {
    pub prompt: String,
    /// Model identifier; the first loaded model when `None`.
    pub model: Option<String>,
    /// Write each fragment to the echo sink as soon as it is decoded.
    pub live_echo: bool,
    pub collect_stats: bool,
}

impl PromptRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }
}

/// Result of a successful exchange.
#[derive(Debug, Clone)]
pub struct PromptReply {
    /// Assembled reply with trailing whitespace removed. Not sanitized.
    pub text: String,
    /// The model that answered.
    pub model: String,
    pub stats: Option<Stats>,
}

// ─── PromptClient ────────────────────────────────────────────────────────────

/// Client for the chat completions endpoint of a local server.
pub struct PromptClient {
    http: HttpClient,
    base_url: String,
    temperature: f32,
    max_tokens: MaxTokens,
    registry: ModelRegistry,
}

impl PromptClient {
    /// Create a client for the server described by `config`.
    ///
    /// Does NOT check connectivity; that happens on the first request.
    pub fn new(config: &ClientConfig, registry: ModelRegistry) -> Result<Self, PromptError> {
        let base_url = config.base_url();
        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PromptError::ServerUnreachable {
                endpoint: base_url.clone(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            base_url,
            temperature: config.temperature,
            max_tokens: config.max_tokens(),
            registry,
        })
    }

    /// Chat completions URL.
    pub fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    /// The requested model, or the first loaded one.
    ///
    /// The name only travels in the JSON body, so display names with spaces
    /// are accepted here.
    pub async fn resolve_model(&self, requested: Option<&str>) -> Result<String, PromptError> {
        if let Some(model) = requested {
            return Ok(validate_request_model(model)?.to_string());
        }

        let model = self
            .registry
            .list_loaded()
            .await
            .into_iter()
            .next()
            .map(|m| m.identifier)
            .ok_or(PromptError::NoModelLoaded)?;

        tracing::info!(model = %model, "using default model");
        Ok(validate_request_model(&model)?.to_string())
    }

    /// Send one prompt and assemble the reply.
    ///
    /// With `live_echo`, sanitized fragments are written and flushed to
    /// `echo` as they arrive; nothing is written to it otherwise.
    pub async fn send<W: Write>(
        &self,
        request: &PromptRequest,
        echo: &mut W,
    ) -> Result<PromptReply, PromptError> {
        validate_prompt(&request.prompt)?;
        let model = self.resolve_model(request.model.as_deref()).await?;

        let payload = RequestPayload::user_prompt(
            model.as_str(),
            request.prompt.as_str(),
            self.temperature,
            self.max_tokens,
        );
        let mut stats = request.collect_stats.then(StatsCollector::start);
        let response = self.post(&payload).await?;

        let mut sink = EchoSink::new(echo, request.live_echo);
        let text = if is_json_response(&response) {
            self.read_json(response, &mut sink, stats.as_mut()).await?
        } else {
            self.read_stream(response, &mut sink, stats.as_mut(), request.collect_stats)
                .await?
        };

        let stats = stats.map(|collector| collector.finish(Instant::now()));
        if let Some(ref s) = stats {
            tracing::info!(
                tokens = s.token_count,
                total_ms = s.total_latency.as_millis() as u64,
                "prompt complete"
            );
        }

        Ok(PromptReply { text, model, stats })
    }

    async fn post(&self, payload: &RequestPayload) -> Result<reqwest::Response, PromptError> {
        let url = self.endpoint();

        // Log the request metadata (not the prompt, it can be huge)
        tracing::info!(
            url = %url,
            model = %payload.model,
            prompt_bytes = payload.messages.iter().map(|m| m.content.len()).sum::<usize>(),
            stream = payload.stream,
            "sending prompt"
        );

        let body = serde_json::to_vec(payload).map_err(|e| PromptError::MalformedResponse {
            reason: format!("failed to encode request: {e}"),
        })?;

        let response = self
            .http
            .post(&url)
            .header(CONTENT_TYPE, JSON_UTF8)
            .header(ACCEPT, "text/event-stream")
            .body(body)
            .send()
            .await
            .map_err(|e| map_request_error(e, &url))?;

        let status = response.status();
        tracing::debug!(status = status.as_u16(), "response status");
        if !status.is_success() {
            let body = read_bounded(response, MAX_RESPONSE_BYTES)
                .await
                .unwrap_or_default();
            return Err(PromptError::HttpStatus {
                status: status.as_u16(),
                body: truncate_chars(body.trim(), MAX_ERROR_BODY_CHARS),
            });
        }

        Ok(response)
    }

    /// Drive the decoder over the response body.
    async fn read_stream<W: Write>(
        &self,
        response: reqwest::Response,
        sink: &mut EchoSink<'_, W>,
        mut stats: Option<&mut StatsCollector>,
        timestamps: bool,
    ) -> Result<String, PromptError> {
        let mut decoder = StreamDecoder::new().with_timestamps(timestamps);
        let mut body = response.bytes_stream();

        while let Some(chunk) = body.next().await {
            let bytes = chunk.map_err(|e| map_stream_error(e, decoder.fragment_count()))?;
            for fragment in decoder.feed_bytes(&bytes) {
                if let Some(collector) = stats.as_deref_mut() {
                    collector.record(&fragment);
                }
                sink.write(&fragment.text);
            }
            if decoder.state() == DecoderState::Complete {
                break;
            }
        }

        decoder.finish()
    }

    /// Handle a server that answered with a single JSON body.
    async fn read_json<W: Write>(
        &self,
        response: reqwest::Response,
        sink: &mut EchoSink<'_, W>,
        stats: Option<&mut StatsCollector>,
    ) -> Result<String, PromptError> {
        tracing::debug!("server sent a non-streaming response");
        let body = read_bounded(response, MAX_RESPONSE_BYTES).await?;
        let text = parse_completion_body(&body)?.trim_end().to_string();

        if let Some(collector) = stats {
            collector.record(&ContentFragment {
                text: text.clone(),
                timestamp: Some(Instant::now()),
            });
        }
        sink.write(&text);

        Ok(text)
    }
}

// ─── Echo ────────────────────────────────────────────────────────────────────

/// Writes sanitized fragments to the terminal when live echo is on.
///
/// A write failure (closed pipe) disables further echo but does not abort
/// the exchange.
struct EchoSink<'a, W: Write> {
    out: &'a mut W,
    enabled: bool,
}

impl<'a, W: Write> EchoSink<'a, W> {
    fn new(out: &'a mut W, enabled: bool) -> Self {
        Self { out, enabled }
    }

    fn write(&mut self, text: &str) {
        if !self.enabled || text.is_empty() {
            return;
        }
        let clean = sanitize_terminal_output(text);
        if let Err(e) = self
            .out
            .write_all(clean.as_bytes())
            .and_then(|()| self.out.flush())
        {
            tracing::warn!(error = %e, "live echo failed, continuing silently");
            self.enabled = false;
        }
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn is_json_response(response: &reqwest::Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.trim_start().starts_with("application/json"))
}

/// Extract `choices[0].message.content` from a non-streaming body.
pub fn parse_completion_body(body: &str) -> Result<String, PromptError> {
    let response: ChatCompletionResponse = safe_json_from_str(body, MAX_RESPONSE_BYTES)?;
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| PromptError::MalformedResponse {
            reason: "empty choices array".into(),
        })?;
    Ok(choice.message.content.unwrap_or_default())
}

/// Read a response body, refusing to buffer more than `max` bytes.
async fn read_bounded(response: reqwest::Response, max: usize) -> Result<String, PromptError> {
    let mut buf = Vec::new();
    let mut body = response.bytes_stream();

    while let Some(chunk) = body.next().await {
        let bytes = chunk.map_err(|e| map_stream_error(e, 0))?;
        if buf.len() + bytes.len() > max {
            return Err(ValidationError::PayloadTooLarge {
                len: buf.len() + bytes.len(),
                max,
            }
            .into());
        }
        buf.extend_from_slice(&bytes);
    }

    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn map_request_error(e: reqwest::Error, url: &str) -> PromptError {
    if e.is_timeout() {
        PromptError::RequestTimeout {
            duration_secs: REQUEST_TIMEOUT.as_secs(),
        }
    } else {
        PromptError::ServerUnreachable {
            endpoint: url.to_string(),
            reason: e.to_string(),
        }
    }
}

fn map_stream_error(e: reqwest::Error, received_fragments: usize) -> PromptError {
    if e.is_timeout() {
        PromptError::RequestTimeout {
            duration_secs: REQUEST_TIMEOUT.as_secs(),
        }
    } else {
        tracing::debug!(error = %e, "stream read error");
        PromptError::StreamTruncated { received_fragments }
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...(truncated)", &text[..idx]),
        None => text.to_string(),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
