//! Start/end delimiters for payloads sent over a noisy console.

use std::io::{self, Write};
use thiserror::Error;

/// Line written before a streamed payload
pub const START_MARKER: &str = "---MPY_COV_START---";

/// Line written after a streamed payload
pub const END_MARKER: &str = "---MPY_COV_END---";

/// Framing errors for streamed payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The capture has no start marker
    #[error("Transport error: start marker `---MPY_COV_START---` not found in captured output")]
    MissingStartMarker,

    /// The capture has a start marker but no end marker after it
    #[error("Transport error: end marker `---MPY_COV_END---` not found after start marker")]
    MissingEndMarker,
}

/// Wrap a payload between the markers, one per line
#[must_use]
pub fn frame(payload: &str) -> String {
    format!("{START_MARKER}\n{payload}\n{END_MARKER}\n")
}

/// Write a framed payload and flush
///
/// # Errors
///
/// Returns any error of the underlying writer.
pub fn write_framed<W: Write>(writer: &mut W, payload: &str) -> io::Result<()> {
    writeln!(writer, "{START_MARKER}")?;
    writeln!(writer, "{payload}")?;
    writeln!(writer, "{END_MARKER}")?;
    writer.flush()
}

/// Whether the text carries either marker
#[must_use]
pub fn looks_framed(text: &str) -> bool {
    text.contains(START_MARKER) || text.contains(END_MARKER)
}

/// Extract the first framed payload from captured output, trimmed
///
/// # Errors
///
/// Returns the marker that could not be found.
pub fn extract_payload(capture: &str) -> Result<&str, TransportError> {
    let start = capture
        .find(START_MARKER)
        .ok_or(TransportError::MissingStartMarker)?;
    let body = &capture[start + START_MARKER.len()..];
    let end = body.find(END_MARKER).ok_or(TransportError::MissingEndMarker)?;
    Ok(body[..end].trim())
}
