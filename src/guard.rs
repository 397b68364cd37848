//! Input guard: validation and sanitization at trust boundaries.
//!
//! Everything that crosses into a subprocess argument list (model names) or
//! onto the user's terminal (model output) passes through here first. All
//! functions are pure: no I/O, no shell, deterministic for a given input.

use serde::de::DeserializeOwned;
use thiserror::Error;

// ─── Limits ──────────────────────────────────────────────────────────────────

/// Longest model name accepted as a process-manager argument.
pub const MAX_MODEL_NAME_LEN: usize = 256;

/// Largest prompt accepted, in bytes (1 MiB).
pub const MAX_PROMPT_BYTES: usize = 1024 * 1024;

/// Characters allowed in a model name besides ASCII alphanumerics.
///
/// `/` is allowed because LM Studio model keys are `publisher/model`.
const MODEL_NAME_EXTRA_CHARS: &[char] = &['.', '_', '-', ':', '/', '@', '+'];

const ESC: char = '\u{1b}';
const BEL: char = '\u{07}';

// ─── Errors ──────────────────────────────────────────────────────────────────

/// A value was rejected before it reached a subprocess, the network or the terminal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("model name is empty")]
    EmptyModelName,

    #[error("model name is {len} bytes, the limit is {max}")]
    ModelNameTooLong { len: usize, max: usize },

    #[error("model name contains disallowed character {ch:?}")]
    InvalidModelNameChar { ch: char },

    #[error("model name must not start with {ch:?}")]
    ModelNameLeadingChar { ch: char },

    #[error("model name must not contain '..' path segments")]
    ModelNamePathTraversal,

    #[error("port {port} is outside 1-65535")]
    PortOutOfRange { port: i64 },

    #[error("prompt is empty")]
    EmptyPrompt,

    #[error("prompt is {len} bytes, the limit is {max}")]
    PromptTooLarge { len: usize, max: usize },

    #[error("payload is {len} bytes, the limit is {max}")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("invalid JSON: {reason}")]
    InvalidJson { reason: String },
}

// ─── Validators ──────────────────────────────────────────────────────────────

/// Check that `name` is safe to pass as a bare argument to the process manager.
///
/// Returns the name unchanged on success.
pub fn validate_model_name(name: &str) -> Result<&str, ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::EmptyModelName);
    }
    if name.len() > MAX_MODEL_NAME_LEN {
        return Err(ValidationError::ModelNameTooLong {
            len: name.len(),
            max: MAX_MODEL_NAME_LEN,
        });
    }

    // A leading '-' would be parsed as an option by the tool.
    if let Some(ch) = name.chars().next().filter(|c| matches!(c, '-' | '/')) {
        return Err(ValidationError::ModelNameLeadingChar { ch });
    }

    if let Some(ch) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || MODEL_NAME_EXTRA_CHARS.contains(c)))
    {
        return Err(ValidationError::InvalidModelNameChar { ch });
    }

    if name.split('/').any(|segment| segment == "..") {
        return Err(ValidationError::ModelNamePathTraversal);
    }

    Ok(name)
}

/// Check a model name that only travels in the request body.
///
/// Display names such as `Llama 3.2 1B` are legitimate here, so only
/// emptiness, length and control characters are rejected.
pub fn validate_request_model(name: &str) -> Result<&str, ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyModelName);
    }
    if name.len() > MAX_MODEL_NAME_LEN {
        return Err(ValidationError::ModelNameTooLong {
            len: name.len(),
            max: MAX_MODEL_NAME_LEN,
        });
    }
    if let Some(ch) = name.chars().find(|c| c.is_control()) {
        return Err(ValidationError::InvalidModelNameChar { ch });
    }
    Ok(name)
}

/// Check that `port` is a usable TCP port.
pub fn validate_port(port: i64) -> Result<u16, ValidationError> {
    u16::try_from(port)
        .ok()
        .filter(|p| *p != 0)
        .ok_or(ValidationError::PortOutOfRange { port })
}

/// Check that a prompt is non-empty and within [`MAX_PROMPT_BYTES`].
///
/// The content itself is never altered.
pub fn validate_prompt(text: &str) -> Result<&str, ValidationError> {
    if text.trim().is_empty() {
        return Err(ValidationError::EmptyPrompt);
    }
    if text.len() > MAX_PROMPT_BYTES {
        return Err(ValidationError::PromptTooLarge {
            len: text.len(),
            max: MAX_PROMPT_BYTES,
        });
    }
    Ok(text)
}

// ─── Terminal sanitization ───────────────────────────────────────────────────

/// Strip terminal escape sequences and control characters from model output.
///
/// Removes:
/// - CSI sequences (`ESC [ … final`), which move the cursor, clear the screen
///   or change colours
/// - OSC, DCS, SOS, PM and APC strings (`ESC ] … BEL|ST` etc.), which can set
///   the window title, write to the clipboard or carry hyperlinks
/// - any other two-character `ESC x` sequence
/// - C0 controls except `\n` and `\t`, DEL, and C1 controls (U+0080–U+009F)
///
/// `\r\n` is normalized to `\n`; a lone `\r` is dropped so output cannot
/// overwrite an earlier part of the line. Printable Unicode passes through
/// untouched, and the function is idempotent.
pub fn sanitize_terminal_output(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    // Set once a control string runs to the end of `text` without a terminator.
    let mut unterminated = false;

    while let Some(ch) = chars.next() {
        match ch {
            ESC => match chars.next() {
                Some('[') => skip_csi(&mut chars),
                Some(']' | 'P' | 'X' | '^' | '_') => {
                    skip_control_string(&mut chars, &mut unterminated)
                }
                // Two-character sequence (or a dangling ESC): drop both.
                Some(_) | None => {}
            },
            // 8-bit CSI / string introducers.
            '\u{9b}' => skip_csi(&mut chars),
            '\u{90}' | '\u{98}' | '\u{9d}' | '\u{9e}' | '\u{9f}' => {
                skip_control_string(&mut chars, &mut unterminated)
            }
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                    out.push('\n');
                }
            }
            '\n' | '\t' => out.push(ch),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }

    out
}

/// Skip the remainder of a CSI sequence: parameter and intermediate bytes
/// up to and including the final byte (0x40–0x7E).
///
/// A character outside the CSI byte range aborts the sequence without being
/// consumed, so printable text after a malformed sequence survives.
fn skip_csi(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) {
    while let Some(&c) = chars.peek() {
        if ('\u{40}'..='\u{7e}').contains(&c) {
            chars.next();
            return;
        }
        if !('\u{20}'..='\u{3f}').contains(&c) {
            return;
        }
        chars.next();
    }
}

/// Skip a control string up to and including its terminator: BEL, ST
/// (`ESC \`) or 8-bit ST.
///
/// Without a terminator nothing is consumed; only the introducer is dropped
/// and the text after it is kept. `unterminated` records a failed scan so
/// later introducers in the same text do not rescan it.
fn skip_control_string(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    unterminated: &mut bool,
) {
    if *unterminated {
        return;
    }
    let mut ahead = chars.clone();
    while let Some(c) = ahead.next() {
        let terminated = match c {
            BEL | '\u{9c}' => true,
            ESC => ahead.next_if_eq(&'\\').is_some(),
            _ => false,
        };
        if terminated {
            *chars = ahead;
            return;
        }
    }
    *unterminated = true;
}

// ─── Bounded JSON ────────────────────────────────────────────────────────────

/// Decode JSON, refusing inputs larger than `max_size` bytes.
pub fn safe_json_loads(text: &str, max_size: usize) -> Result<serde_json::Value, ValidationError> {
    safe_json_from_str(text, max_size)
}

/// Typed variant of [`safe_json_loads`].
pub fn safe_json_from_str<T: DeserializeOwned>(
    text: &str,
    max_size: usize,
) -> Result<T, ValidationError> {
    if text.len() > max_size {
        return Err(ValidationError::PayloadTooLarge {
            len: text.len(),
            max: max_size,
        });
    }
    serde_json::from_str(text).map_err(|e| ValidationError::InvalidJson {
        reason: e.to_string(),
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────
