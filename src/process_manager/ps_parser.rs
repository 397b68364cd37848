//! Best-effort parser for the plain-text output of `lms ps`.
//!
//! Only used when `lms ps --json` is unavailable. The layout it assumes
//! (a header line, then one row per model with the identifier in the first
//! column) is not a stable interface, so the result is a single inferred
//! record at most.

use super::types::ModelRecord;

/// Lines that mean "nothing loaded" rather than a table row.
const EMPTY_MARKERS: &[&str] = &["no models", "no model is loaded"];

/// Infer the first loaded model from `lms ps` table output.
///
/// The first line is treated as a header when the output has more than one
/// line; the identifier is the first whitespace-delimited token of the first
/// non-blank row after it.
pub fn parse_plain_ps(stdout: &str) -> Option<ModelRecord> {
    let lines: Vec<&str> = stdout.trim().lines().collect();
    if lines.len() < 2 {
        return None;
    }

    let row = lines[1..].iter().map(|l| l.trim()).find(|l| !l.is_empty())?;

    let lowered = row.to_lowercase();
    if EMPTY_MARKERS.iter().any(|m| lowered.starts_with(m)) {
        return None;
    }

    row.split_whitespace().next().map(ModelRecord::new)
}
