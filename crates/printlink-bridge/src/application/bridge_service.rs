//! Frame decoding and encoding.
//!
//! Pure functions between text lines and [`InboundFrame`] /
//! [`OutboundFrame`].  No I/O and no async, so every edge case of the wire
//! format is unit tested here rather than through a running server.
//!
//! # Undecodable lines
//!
//! A line that fails to decode still gets an answer when possible: if it is
//! a JSON object with a numeric `id`, the caller is waiting on that id, so it
//! receives an `INVALID_ARGUMENT` response.  Anything else becomes a
//! `protocolError` frame.

use printlink_core::{ErrorCode, MethodResult};
use serde_json::Value;
use thiserror::Error;

use crate::domain::messages::{InboundFrame, OutboundFrame};

/// Errors raised while translating frames.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The line was empty or whitespace only.
    #[error("empty frame")]
    Empty,

    /// The line was not a valid frame.
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Decodes one stdin line.
pub fn decode_frame(line: &str) -> Result<InboundFrame, BridgeError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(BridgeError::Empty);
    }
    Ok(serde_json::from_str(line)?)
}

/// Encodes a frame as a single line without the trailing newline.
pub fn encode_frame(frame: &OutboundFrame) -> Result<String, BridgeError> {
    Ok(serde_json::to_string(frame)?)
}

/// Builds the reply for a line that [`decode_frame`] rejected.
pub fn reject_frame(line: &str, error: &BridgeError) -> OutboundFrame {
    let id = serde_json::from_str::<Value>(line.trim())
        .ok()
        .and_then(|v| v.get("id").and_then(Value::as_u64));
    match id {
        Some(id) => OutboundFrame::Response {
            id,
            result: MethodResult::error(ErrorCode::InvalidArgument, error.to_string()),
        },
        None => OutboundFrame::ProtocolError {
            message: error.to_string(),
        },
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
