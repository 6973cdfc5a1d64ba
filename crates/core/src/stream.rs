//! The caller-facing stream protocol.
//!
//! Internally the pipeline produces [`StreamEvent`]s. Only at the transport
//! boundary are they flattened into the wire form: one `data: <json>\n\n`
//! frame per event, where the JSON has a single `content` string holding
//! either display text or a sentinel-prefixed control message.

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

pub const BLOCKED_PREFIX: &str = "[BLOCKED]";
pub const ERROR_PREFIX: &str = "[ERROR]";
pub const STATS_PREFIX: &str = "[STATS]";

/// One event of a chat response stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A text increment to display
    Content(String),
    /// Token usage, sent once after the last `Content`
    Stats { input_tokens: u32, output_tokens: u32 },
    /// The input was refused; terminal
    Blocked(String),
    /// Every attempt failed; terminal
    Error(String),
}

#[derive(Serialize, Deserialize)]
struct Frame {
    content: String,
}

impl StreamEvent {
    /// `Blocked` and `Error` end a stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Blocked(_) | StreamEvent::Error(_))
    }

    /// The `content` string carried on the wire.
    pub fn to_payload(&self) -> String {
        match self {
            StreamEvent::Content(text) => text.clone(),
            StreamEvent::Stats {
                input_tokens,
                output_tokens,
            } => format!("{STATS_PREFIX}{input_tokens}|{output_tokens}"),
            StreamEvent::Blocked(reason) => format!("{BLOCKED_PREFIX}{reason}"),
            StreamEvent::Error(message) => format!("{ERROR_PREFIX}{message}"),
        }
    }

    /// Interpret a `content` string. Sentinels are checked before text.
    pub fn from_payload(payload: &str) -> Result<Self, ProtocolError> {
        if let Some(reason) = payload.strip_prefix(BLOCKED_PREFIX) {
            return Ok(StreamEvent::Blocked(reason.to_string()));
        }
        if let Some(message) = payload.strip_prefix(ERROR_PREFIX) {
            return Ok(StreamEvent::Error(message.to_string()));
        }
        if let Some(stats) = payload.strip_prefix(STATS_PREFIX) {
            let malformed = || ProtocolError::MalformedStats(stats.to_string());
            let (input, output) = stats.split_once('|').ok_or_else(malformed)?;
            return Ok(StreamEvent::Stats {
                input_tokens: input.trim().parse().map_err(|_| malformed())?,
                output_tokens: output.trim().parse().map_err(|_| malformed())?,
            });
        }
        Ok(StreamEvent::Content(payload.to_string()))
    }

    /// The JSON object sent as the SSE `data` field.
    pub fn to_json(&self) -> String {
        serde_json::json!({ "content": self.to_payload() }).to_string()
    }

    /// One complete wire frame, `data: <json>\n\n`.
    pub fn encode(&self) -> String {
        format!("data: {}\n\n", self.to_json())
    }

    /// Decode the JSON body of a frame.
    pub fn from_json(data: &str) -> Result<Self, ProtocolError> {
        let frame: Frame =
            serde_json::from_str(data).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;
        Self::from_payload(&frame.content)
    }

    /// Decode a single `data: ...` line.
    pub fn decode_line(line: &str) -> Result<Self, ProtocolError> {
        let line = line.trim_end_matches(['\r', '\n']);
        let data = line
            .strip_prefix("data:")
            .ok_or_else(|| ProtocolError::MissingDataPrefix(line.to_string()))?;
        Self::from_json(data.strip_prefix(' ').unwrap_or(data))
    }
}

/// Incremental decoder for a byte stream of wire frames.
///
/// Bytes may arrive split anywhere, including inside a UTF-8 sequence.
/// Comment lines (`:`) and non-`data` fields are ignored.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data_lines: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes and return every event completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Result<StreamEvent, ProtocolError>> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\r', '\n']);

            if line.is_empty() {
                if let Some(event) = self.dispatch() {
                    events.push(event);
                }
            } else if let Some(data) = line.strip_prefix("data:") {
                self.data_lines
                    .push(data.strip_prefix(' ').unwrap_or(data).to_string());
            }
        }

        events
    }

    /// Flush a trailing frame that was not followed by a blank line.
    pub fn finish(&mut self) -> Option<Result<StreamEvent, ProtocolError>> {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&rest);
            let line = line.trim_end_matches('\r');
            if let Some(data) = line.strip_prefix("data:") {
                self.data_lines
                    .push(data.strip_prefix(' ').unwrap_or(data).to_string());
            }
        }
        self.dispatch()
    }

    fn dispatch(&mut self) -> Option<Result<StreamEvent, ProtocolError>> {
        if self.data_lines.is_empty() {
            return None;
        }
        let data = self.data_lines.join("\n");
        self.data_lines.clear();
        Some(StreamEvent::from_json(&data))
    }
}
